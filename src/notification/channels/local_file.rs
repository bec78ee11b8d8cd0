//! 本地文件渠道 - 将所有通知（包括被暂停的）写入 JSONL 历史文件

use async_trait::async_trait;
use chrono::Utc;
use std::path::PathBuf;
use tracing::debug;

use crate::error::DeliveryError;
use crate::notification::channel::{Delivery, DeliveryChannel, DeliveryOutcome};
use crate::notification::request::NotificationRequest;
use crate::notification::store::{NotificationHistory, NotificationRecord};

/// 本地文件渠道
pub struct LocalFileChannel {
    history: NotificationHistory,
}

impl LocalFileChannel {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            history: NotificationHistory::new(path),
        }
    }

    pub fn history(&self) -> &NotificationHistory {
        &self.history
    }
}

impl Default for LocalFileChannel {
    fn default() -> Self {
        Self::new(NotificationHistory::default_path())
    }
}

#[async_trait]
impl DeliveryChannel for LocalFileChannel {
    fn name(&self) -> &str {
        "local_file"
    }

    fn should_send(&self, _notification: &NotificationRequest) -> bool {
        // 记录所有通知
        true
    }

    fn respects_snooze(&self) -> bool {
        false
    }

    fn deduplicates(&self) -> bool {
        false
    }

    async fn send(&self, delivery: &Delivery) -> Result<DeliveryOutcome, DeliveryError> {
        let n = &delivery.notification;
        let record = NotificationRecord {
            ts: Utc::now(),
            plugin: n.plugin.clone(),
            level: n.level,
            title: n.title.clone(),
            message: truncate_message(&n.message, 300),
            snoozed: delivery.snoozed,
            group: n.group.clone(),
        };

        self.history
            .append(&record)
            .map_err(|e| DeliveryError::Transport(e.to_string()))?;

        debug!(
            channel = "local_file",
            plugin = %n.plugin,
            snoozed = delivery.snoozed,
            "Notification recorded to local file"
        );
        Ok(DeliveryOutcome::delivered())
    }
}

/// 截断消息到指定字符数
fn truncate_message(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
