//! 通知系统构建器 - 根据配置组装渠道

use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use super::bus::NotificationBus;
use super::channels::local_file::LocalFileChannel;
use super::channels::pushover::{PushoverChannel, PushoverConfig};
use super::dispatcher::NotificationDispatcher;
use crate::config::Config;

/// 通知系统构建器
pub struct NotificationBuilder {
    bus: Arc<NotificationBus>,
    pushover: Option<PushoverConfig>,
    base_url: Option<String>,
    history_path: Option<PathBuf>,
    dry_run: bool,
}

impl NotificationBuilder {
    pub fn new(bus: Arc<NotificationBus>) -> Self {
        Self {
            bus,
            pushover: None,
            base_url: None,
            history_path: None,
            dry_run: false,
        }
    }

    /// 从配置读取渠道设置
    pub fn from_config(bus: Arc<NotificationBus>, config: &Config) -> Self {
        Self::new(bus)
            .pushover(config.pushover.clone())
            .base_url(config.base_url.clone())
            .history(config.history_path())
            .dry_run(config.dry_run)
    }

    pub fn pushover(mut self, config: Option<PushoverConfig>) -> Self {
        self.pushover = config;
        self
    }

    /// 对外地址，用于紧急推送的回调
    pub fn base_url(mut self, base_url: Option<String>) -> Self {
        self.base_url = base_url;
        self
    }

    pub fn history(mut self, path: Option<PathBuf>) -> Self {
        self.history_path = path;
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// 构建 NotificationDispatcher
    ///
    /// Pushover 配置不完整时跳过该渠道并记录警告，不视为错误。
    pub fn build(self) -> NotificationDispatcher {
        let mut dispatcher = NotificationDispatcher::new(self.bus).with_dry_run(self.dry_run);

        match self.pushover {
            Some(config) if config.is_complete() => {
                match PushoverChannel::new(config, self.base_url) {
                    Ok(channel) => {
                        info!(channel = "pushover", "Enabling Pushover channel");
                        dispatcher.register_channel(Arc::new(channel));
                    }
                    Err(e) => warn!(channel = "pushover", error = %e, "Pushover channel disabled"),
                }
            }
            Some(_) => warn!(
                channel = "pushover",
                "Pushover section needs both user_key and api_token, channel disabled"
            ),
            None => {}
        }

        if let Some(path) = self.history_path {
            info!(channel = "local_file", path = %path.display(), "Enabling history channel");
            dispatcher.register_channel(Arc::new(LocalFileChannel::new(path)));
        }

        dispatcher
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_incomplete_pushover_is_skipped() {
        let dispatcher = NotificationBuilder::new(Arc::new(NotificationBus::new()))
            .pushover(Some(PushoverConfig {
                user_key: "user".to_string(),
                ..Default::default()
            }))
            .build();
        assert_eq!(dispatcher.channel_count(), 0);
    }

    #[test]
    fn test_channels_from_config() {
        let temp = TempDir::new().unwrap();
        let mut config = Config {
            pushover: Some(PushoverConfig {
                user_key: "user".to_string(),
                api_token: "token".to_string(),
                ..Default::default()
            }),
            dry_run: true,
            ..Default::default()
        };
        config.history.path = Some(temp.path().join("history.jsonl"));

        let dispatcher =
            NotificationBuilder::from_config(Arc::new(NotificationBus::new()), &config).build();
        assert!(dispatcher.is_dry_run());
        assert_eq!(dispatcher.channel_names(), vec!["pushover", "local_file"]);
    }

    #[test]
    fn test_history_disabled() {
        let mut config = Config::default();
        config.history.enabled = false;
        let dispatcher =
            NotificationBuilder::from_config(Arc::new(NotificationBus::new()), &config).build();
        assert_eq!(dispatcher.channel_count(), 0);
    }
}
