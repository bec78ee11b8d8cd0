//! 配置加载
//!
//! 查找顺序：
//! 1. `--config <path>` 指定的 JSON 文件
//! 2. `~/.config/bg-alert/config.json`
//! 3. 内置默认值
//!
//! 环境变量 `PUSHOVER_USER_KEY` / `PUSHOVER_API_TOKEN` 覆盖文件中的值。

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::model::Units;
use crate::notification::channels::pushover::PushoverConfig;
use crate::sandbox::{InsulinRounding, PluginSettings, Thresholds};

pub const USER_KEY_ENV: &str = "PUSHOVER_USER_KEY";
pub const API_TOKEN_ENV: &str = "PUSHOVER_API_TOKEN";

/// 通知历史文件配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub enabled: bool,
    /// 缺省为 `~/.config/bg-alert/notifications.jsonl`
    pub path: Option<PathBuf>,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub thresholds: Thresholds,
    pub units: Units,
    pub insulin_rounding: InsulinRounding,
    /// 对外地址，用于 Pushover 回调
    pub base_url: Option<String>,
    pub pushover: Option<PushoverConfig>,
    /// 插件名 → 设置
    pub extended_settings: HashMap<String, PluginSettings>,
    /// 启用的插件；缺省全部启用
    pub enable: Option<Vec<String>>,
    pub history: HistoryConfig,
    pub dry_run: bool,
    /// 覆盖 profile 中的时区偏移（分钟）
    pub utc_offset_minutes: Option<i32>,
}

impl Config {
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".config/bg-alert/config.json"))
    }

    /// 加载配置并应用环境变量覆盖
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path().filter(|p| p.exists()) {
                Some(path) => Self::from_file(&path)?,
                None => {
                    debug!("No config file found, using defaults");
                    Self::default()
                }
            },
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: Config = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        debug!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    /// 环境变量优先于文件
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let user_key = lookup(USER_KEY_ENV).filter(|v| !v.is_empty());
        let api_token = lookup(API_TOKEN_ENV).filter(|v| !v.is_empty());
        if user_key.is_none() && api_token.is_none() {
            return;
        }

        let pushover = self.pushover.get_or_insert_with(PushoverConfig::default);
        if let Some(key) = user_key {
            debug!("Using Pushover user key from {}", USER_KEY_ENV);
            pushover.user_key = key;
        }
        if let Some(token) = api_token {
            debug!("Using Pushover API token from {}", API_TOKEN_ENV);
            pushover.api_token = token;
        }
    }

    /// 历史文件路径（未启用时为 None）
    pub fn history_path(&self) -> Option<PathBuf> {
        if !self.history.enabled {
            return None;
        }
        Some(
            self.history
                .path
                .clone()
                .unwrap_or_else(crate::notification::store::NotificationHistory::default_path),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.thresholds.bg_high, 260.0);
        assert_eq!(config.units, Units::MgDl);
        assert!(config.pushover.is_none());
        assert!(config.enable.is_none());
        assert!(config.history.enabled);
    }

    #[test]
    fn test_from_file_partial() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "units": "mmol",
                "thresholds": {{ "bg_low": 60 }},
                "base_url": "https://cgm.example.com",
                "enable": ["cage", "simplealarms"],
                "extended_settings": {{ "cage": {{ "warn": 36 }} }},
                "pushover": {{ "user_key": "u", "api_token": "t" }}
            }}"#
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.units, Units::Mmol);
        assert_eq!(config.thresholds.bg_low, 60.0);
        assert_eq!(config.thresholds.bg_high, 260.0);
        assert_eq!(config.enable.as_deref().map(|e| e.len()), Some(2));
        assert_eq!(config.extended_settings["cage"]["warn"], 36);
        let pushover = config.pushover.unwrap();
        assert!(pushover.is_complete());
        assert_eq!(pushover.timeout_secs, 30);
    }

    #[test]
    fn test_invalid_file_is_error() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert!(Config::from_file(file.path()).is_err());
    }

    #[test]
    fn test_env_overrides_file() {
        let mut config = Config {
            pushover: Some(PushoverConfig {
                user_key: "file-user".to_string(),
                api_token: "file-token".to_string(),
                ..Default::default()
            }),
            ..Default::default()
        };
        config.apply_env(|key| (key == USER_KEY_ENV).then(|| "env-user".to_string()));

        let pushover = config.pushover.unwrap();
        assert_eq!(pushover.user_key, "env-user");
        assert_eq!(pushover.api_token, "file-token");
    }

    #[test]
    fn test_env_creates_pushover_section() {
        let mut config = Config::default();
        config.apply_env(|_| None);
        assert!(config.pushover.is_none());

        config.apply_env(|key| Some(format!("{}-value", key)));
        assert!(config.pushover.unwrap().is_complete());
    }

    #[test]
    fn test_history_path() {
        let mut config = Config::default();
        config.history.path = Some(PathBuf::from("/tmp/history.jsonl"));
        assert_eq!(config.history_path(), Some(PathBuf::from("/tmp/history.jsonl")));
        config.history.enabled = false;
        assert_eq!(config.history_path(), None);
    }
}
