//! Pushover 推送渠道
//!
//! 通过 Pushover HTTP API 发送推送。紧急级别使用 emergency 优先级，
//! 需要接收方确认；Pushover 返回的 receipt 保存到回执表，确认回调到达时查找。

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info};

use crate::error::DeliveryError;
use crate::notification::channel::{passes_min_level, Delivery, DeliveryChannel, DeliveryOutcome};
use crate::notification::level::Level;
use crate::notification::receipts::ReceiptTable;
use crate::notification::request::NotificationRequest;

pub const PUSHOVER_API_URL: &str = "https://api.pushover.net/1/messages.json";
pub const DEFAULT_SOUND: &str = "gamelan";
pub const CALLBACK_PATH: &str = "/api/v1/notifications/pushovercallback";

const PRIORITY_EMERGENCY: i8 = 2;
const PRIORITY_HIGH: i8 = 1;
const PRIORITY_NORMAL: i8 = 0;
const RETRY_URGENT_SECS: u32 = 2 * 60;
// Warn 的重试间隔比 Urgent 长，有意如此
const RETRY_WARN_SECS: u32 = 15 * 60;
const EXPIRE_SECS: u32 = 15 * 60;

/// Pushover 渠道配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushoverConfig {
    /// 用户/分组 key
    #[serde(default)]
    pub user_key: String,
    /// 应用 token
    #[serde(default)]
    pub api_token: String,
    /// 超时时间 (秒)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// API 地址（测试时可替换）
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// 低于该级别的通知不推送
    #[serde(default = "default_min_level")]
    pub min_level: Level,
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_api_url() -> String {
    PUSHOVER_API_URL.to_string()
}

fn default_min_level() -> Level {
    Level::Info
}

impl Default for PushoverConfig {
    fn default() -> Self {
        Self {
            user_key: String::new(),
            api_token: String::new(),
            timeout_secs: default_timeout_secs(),
            api_url: default_api_url(),
            min_level: default_min_level(),
        }
    }
}

impl PushoverConfig {
    pub fn is_complete(&self) -> bool {
        !self.user_key.is_empty() && !self.api_token.is_empty()
    }
}

/// Pushover 请求表单
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PushoverMessage {
    pub token: String,
    pub user: String,
    pub title: String,
    pub message: String,
    pub sound: String,
    /// epoch 秒
    pub timestamp: i64,
    pub priority: i8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expire: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callback: Option<String>,
}

/// Pushover 响应
#[derive(Debug, Deserialize)]
pub struct PushoverResponse {
    pub status: i64,
    #[serde(default)]
    pub request: Option<String>,
    #[serde(default)]
    pub receipt: Option<String>,
    #[serde(default)]
    pub errors: Vec<String>,
}

/// Pushover 渠道
pub struct PushoverChannel {
    client: Client,
    config: PushoverConfig,
    base_url: Option<String>,
    min_level: Level,
    receipts: Mutex<ReceiptTable>,
}

impl PushoverChannel {
    /// 创建渠道，token 和 user key 都必须配置
    pub fn new(config: PushoverConfig, base_url: Option<String>) -> Result<Self, DeliveryError> {
        if config.api_token.is_empty() {
            return Err(DeliveryError::Config("api_token is required".to_string()));
        }
        if config.user_key.is_empty() {
            return Err(DeliveryError::Config("user_key is required".to_string()));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| DeliveryError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            min_level: config.min_level,
            config,
            base_url: base_url.filter(|u| !u.is_empty()),
            receipts: Mutex::new(ReceiptTable::new()),
        })
    }

    fn receipts(&self) -> MutexGuard<'_, ReceiptTable> {
        self.receipts.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// 构建请求表单
    pub fn build_message(&self, notification: &NotificationRequest, timestamp: i64) -> PushoverMessage {
        build_message(&self.config, self.base_url.as_deref(), notification, timestamp)
    }
}

/// 按级别映射优先级、重试和回调
pub fn build_message(
    config: &PushoverConfig,
    base_url: Option<&str>,
    notification: &NotificationRequest,
    timestamp: i64,
) -> PushoverMessage {
    let (priority, retry) = match notification.level {
        Level::Urgent => (PRIORITY_EMERGENCY, Some(RETRY_URGENT_SECS)),
        Level::Warn => (PRIORITY_HIGH, Some(RETRY_WARN_SECS)),
        Level::Info | Level::None => (PRIORITY_NORMAL, None),
    };
    let callback = if notification.level.is_alarm() {
        base_url.map(|url| format!("{}{}", url.trim_end_matches('/'), CALLBACK_PATH))
    } else {
        None
    };

    PushoverMessage {
        token: config.api_token.clone(),
        user: config.user_key.clone(),
        title: notification.title.clone(),
        message: notification.message.clone(),
        sound: notification
            .sound
            .clone()
            .unwrap_or_else(|| DEFAULT_SOUND.to_string()),
        timestamp,
        priority,
        retry,
        expire: retry.map(|_| EXPIRE_SECS),
        callback,
    }
}

#[async_trait]
impl DeliveryChannel for PushoverChannel {
    fn name(&self) -> &str {
        "pushover"
    }

    fn should_send(&self, notification: &NotificationRequest) -> bool {
        passes_min_level(notification, self.min_level)
    }

    async fn send(&self, delivery: &Delivery) -> Result<DeliveryOutcome, DeliveryError> {
        let msg = self.build_message(&delivery.notification, chrono::Utc::now().timestamp());
        debug!(title = %msg.title, priority = msg.priority, "Sending pushover notification");

        let response = self
            .client
            .post(&self.config.api_url)
            .form(&msg)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    DeliveryError::Timeout
                } else {
                    DeliveryError::Transport(format!("HTTP request failed: {}", e))
                }
            })?;

        let body: PushoverResponse = response
            .json()
            .await
            .map_err(|e| DeliveryError::Transport(format!("Failed to parse response: {}", e)))?;

        if body.status != 1 {
            return Err(DeliveryError::Rejected {
                status: body.status,
                message: if body.errors.is_empty() {
                    "Unknown error".to_string()
                } else {
                    body.errors.join("; ")
                },
            });
        }

        info!(
            title = %msg.title,
            request = ?body.request,
            receipt = ?body.receipt,
            "Sent pushover notification"
        );

        if let Some(receipt) = &body.receipt {
            self.receipts()
                .register(receipt.clone(), delivery.notification.clone());
        }

        Ok(DeliveryOutcome::Delivered {
            receipt: body.receipt,
        })
    }

    fn acknowledge(&self, receipt: &str) -> Option<NotificationRequest> {
        self.receipts().lookup(receipt)
    }
}
