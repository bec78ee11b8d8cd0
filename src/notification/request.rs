//! 通知请求与暂停（snooze）请求

use serde::{Deserialize, Serialize};

use super::level::Level;

/// 插件在一个周期内提出的通知请求（不持久化）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationRequest {
    /// 严重程度
    pub level: Level,
    pub title: String,
    pub message: String,
    /// 发起插件名称（用于指纹和分组，不能为空）
    pub plugin: String,
    /// 推送提示音（渠道相关）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sound: Option<String>,
    /// 分组键
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_name: Option<String>,
    /// 调试信息（插件计算结果等）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug: Option<serde_json::Value>,
}

impl NotificationRequest {
    pub fn new(
        plugin: impl Into<String>,
        level: Level,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            level,
            title: title.into(),
            message: message.into(),
            plugin: plugin.into(),
            sound: None,
            group: None,
            event_name: None,
            debug: None,
        }
    }

    /// 设置提示音
    pub fn with_sound(mut self, sound: impl Into<String>) -> Self {
        self.sound = Some(sound.into());
        self
    }

    /// 设置分组
    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn with_event_name(mut self, event_name: impl Into<String>) -> Self {
        self.event_name = Some(event_name.into());
        self
    }

    pub fn with_debug(mut self, debug: serde_json::Value) -> Self {
        self.debug = Some(debug);
        self
    }
}

/// 暂停请求：在 `length_mills` 内抑制级别 ≤ `level` 的通知
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnoozeRequest {
    pub level: Level,
    pub length_mills: i64,
    pub title: String,
    pub message: String,
    /// 发起插件；确认回执触发的暂停没有插件
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugin: Option<String>,
}

impl SnoozeRequest {
    pub fn new(level: Level, length_mills: i64) -> Self {
        Self {
            level,
            length_mills,
            title: String::new(),
            message: String::new(),
            plugin: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn from_plugin(mut self, plugin: impl Into<String>) -> Self {
        self.plugin = Some(plugin.into());
        self
    }
}
