//! 通知渠道 trait 定义

use async_trait::async_trait;
use serde::Serialize;

use super::level::{level_meets_threshold, Level};
use super::request::NotificationRequest;
use crate::error::DeliveryError;

/// 交给渠道的一次投递
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Delivery {
    pub notification: NotificationRequest,
    /// 被暂停抑制（只有不遵守暂停的渠道会收到）
    pub snoozed: bool,
    /// 所属周期
    pub cycle: u64,
}

impl Delivery {
    pub fn new(notification: NotificationRequest, cycle: u64) -> Self {
        Self {
            notification,
            snoozed: false,
            cycle,
        }
    }

    pub fn snoozed(notification: NotificationRequest, cycle: u64) -> Self {
        Self {
            notification,
            snoozed: true,
            cycle,
        }
    }

    pub fn level(&self) -> Level {
        self.notification.level
    }
}

/// 发送结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum DeliveryOutcome {
    /// 发送成功；需要确认的渠道返回 receipt id
    Delivered { receipt: Option<String> },
    /// 跳过（不符合渠道过滤条件）
    Skipped(String),
}

impl DeliveryOutcome {
    pub fn delivered() -> Self {
        DeliveryOutcome::Delivered { receipt: None }
    }

    pub fn is_delivered(&self) -> bool {
        matches!(self, DeliveryOutcome::Delivered { .. })
    }
}

/// 通知渠道 trait
#[async_trait]
pub trait DeliveryChannel: Send + Sync {
    /// 渠道名称（用于日志和配置）
    fn name(&self) -> &str;

    /// 是否应该发送此通知（根据级别等条件过滤）
    fn should_send(&self, notification: &NotificationRequest) -> bool;

    /// 是否遵守暂停；为 false 时被抑制的通知也会交给它（如本地历史）
    fn respects_snooze(&self) -> bool {
        true
    }

    /// 是否经过去重缓存
    fn deduplicates(&self) -> bool {
        true
    }

    /// 发送
    async fn send(&self, delivery: &Delivery) -> Result<DeliveryOutcome, DeliveryError>;

    /// 查找本渠道发出的回执对应的通知
    fn acknowledge(&self, _receipt: &str) -> Option<NotificationRequest> {
        None
    }
}

/// 按最低级别过滤的通用实现
pub fn passes_min_level(notification: &NotificationRequest, min_level: Level) -> bool {
    level_meets_threshold(notification.level, min_level)
}
