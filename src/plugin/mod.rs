//! 插件契约
//!
//! 插件通过显式的能力集合声明自己实现了哪些阶段：
//! - `PROPERTY_PROVIDER`：`set_properties`，写入声明过的派生属性
//! - `NOTIFICATION_CHECKER`：`check_notifications`，提出通知/暂停请求
//! - `VISUALISATION_UPDATER`：`update_visualisation`，返回显示用的 pill
//!
//! 依赖通过 `provides` / `requires` 属性名声明，注册表据此拓扑排序。

pub mod registry;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::ops::BitOr;

use crate::error::PluginError;
use crate::notification::{Level, NotificationRequest, SnoozeRequest};
use crate::sandbox::Sandbox;

pub use registry::{Evaluation, PluginFailure, PluginPill, PluginRegistry, RegistryBuilder};

/// 插件展示类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PluginType {
    Forecast,
    PillMajor,
    PillMinor,
    Notification,
}

/// 插件能力集合
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities(u8);

impl Capabilities {
    pub const NONE: Capabilities = Capabilities(0);
    pub const PROPERTY_PROVIDER: Capabilities = Capabilities(1);
    pub const NOTIFICATION_CHECKER: Capabilities = Capabilities(1 << 1);
    pub const VISUALISATION_UPDATER: Capabilities = Capabilities(1 << 2);

    pub fn contains(&self, other: Capabilities) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

impl BitOr for Capabilities {
    type Output = Capabilities;

    fn bitor(self, rhs: Capabilities) -> Capabilities {
        Capabilities(self.0 | rhs.0)
    }
}

/// 显示用的 pill
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Pill {
    pub label: String,
    pub value: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub info: Vec<PillInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,
}

impl Pill {
    pub fn new(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            value: value.into(),
            info: Vec::new(),
            class: None,
        }
    }

    pub fn with_info(mut self, label: impl Into<String>, value: impl Into<String>) -> Self {
        self.info.push(PillInfo {
            label: label.into(),
            value: value.into(),
        });
        self
    }

    pub fn with_class(mut self, class: Option<&str>) -> Self {
        self.class = class.map(str::to_string);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PillInfo {
    pub label: String,
    pub value: String,
}

/// 插件 trait
pub trait Plugin: Send + Sync {
    /// 唯一名称，也是扩展设置和属性的命名空间
    fn name(&self) -> &'static str;

    fn label(&self) -> &'static str;

    fn plugin_type(&self) -> PluginType;

    fn capabilities(&self) -> Capabilities;

    /// 本插件写入的属性
    fn provides(&self) -> &'static [&'static str] {
        &[]
    }

    /// 本插件读取的、由其他插件写入的属性
    fn requires(&self) -> &'static [&'static str] {
        &[]
    }

    fn set_properties(&self, _scope: &mut PropertyScope<'_>) -> Result<(), PluginError> {
        Ok(())
    }

    fn check_notifications(&self, _sbx: &Sandbox, _notifier: &mut Notifier) -> Result<(), PluginError> {
        Ok(())
    }

    fn update_visualisation(&self, _sbx: &Sandbox) -> Result<Option<Pill>, PluginError> {
        Ok(None)
    }
}

/// 属性写入范围：只能写声明过的属性，插件成功返回后才提交
pub struct PropertyScope<'a> {
    plugin: &'static str,
    declared: &'static [&'static str],
    sandbox: &'a Sandbox,
    staged: BTreeMap<String, Value>,
}

impl<'a> PropertyScope<'a> {
    pub fn new(plugin: &'static str, declared: &'static [&'static str], sandbox: &'a Sandbox) -> Self {
        Self {
            plugin,
            declared,
            sandbox,
            staged: BTreeMap::new(),
        }
    }

    pub fn sandbox(&self) -> &'a Sandbox {
        self.sandbox
    }

    fn check_declared(&self, name: &str) -> Result<(), PluginError> {
        if self.declared.iter().any(|d| *d == name) {
            Ok(())
        } else {
            Err(PluginError::UndeclaredProperty {
                plugin: self.plugin.to_string(),
                property: name.to_string(),
            })
        }
    }

    /// 属性不存在时才计算；计算结果为 None 表示本周期不提供
    pub fn offer_property<T, F>(&mut self, name: &str, compute: F) -> Result<(), PluginError>
    where
        T: Serialize,
        F: FnOnce(&Sandbox) -> Result<Option<T>, PluginError>,
    {
        self.check_declared(name)?;
        if self.sandbox.has_property(name) || self.staged.contains_key(name) {
            return Ok(());
        }
        if let Some(value) = compute(self.sandbox)? {
            self.staged.insert(name.to_string(), serde_json::to_value(value)?);
        }
        Ok(())
    }

    /// 直接写入（同一周期内后写覆盖先写）
    pub fn set_property<T: Serialize>(&mut self, name: &str, value: T) -> Result<(), PluginError> {
        self.check_declared(name)?;
        self.staged.insert(name.to_string(), serde_json::to_value(value)?);
        Ok(())
    }

    pub fn into_staged(self) -> BTreeMap<String, Value> {
        self.staged
    }
}

/// 插件的通知收集器，插件名称自动填入
pub struct Notifier {
    plugin: &'static str,
    requests: Vec<NotificationRequest>,
    snoozes: Vec<SnoozeRequest>,
}

impl Notifier {
    pub fn new(plugin: &'static str) -> Self {
        Self {
            plugin,
            requests: Vec::new(),
            snoozes: Vec::new(),
        }
    }

    /// 以本插件身份创建通知
    pub fn notification(
        &self,
        level: Level,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> NotificationRequest {
        NotificationRequest::new(self.plugin, level, title, message)
    }

    pub fn request_notify(&mut self, mut req: NotificationRequest) {
        req.plugin = self.plugin.to_string();
        self.requests.push(req);
    }

    pub fn request_snooze(&mut self, snooze: SnoozeRequest) {
        self.snoozes.push(snooze.from_plugin(self.plugin));
    }

    pub fn into_parts(self) -> (Vec<NotificationRequest>, Vec<SnoozeRequest>) {
        (self.requests, self.snoozes)
    }
}
