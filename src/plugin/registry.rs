//! 插件注册表 - 注册检查、拓扑排序、按阶段执行

use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, info, warn};

use super::{Capabilities, Notifier, Pill, Plugin, PluginType, PropertyScope};
use crate::error::{ConfigError, PluginError};
use crate::notification::{NotificationRequest, SnoozeRequest};
use crate::sandbox::Sandbox;

/// 执行阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    SetProperties,
    CheckNotifications,
    UpdateVisualisation,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Phase::SetProperties => "set_properties",
            Phase::CheckNotifications => "check_notifications",
            Phase::UpdateVisualisation => "update_visualisation",
        };
        f.write_str(s)
    }
}

/// 单个插件在某个阶段的失败
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PluginFailure {
    pub plugin: String,
    pub phase: Phase,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PluginPill {
    pub plugin: String,
    pub plugin_type: PluginType,
    pub pill: Pill,
}

/// 一个周期的评估结果
#[derive(Debug, Clone, Serialize)]
pub struct Evaluation {
    /// 写入了派生属性的快照
    pub sandbox: Sandbox,
    pub requests: Vec<NotificationRequest>,
    pub snoozes: Vec<SnoozeRequest>,
    pub pills: Vec<PluginPill>,
    pub failures: Vec<PluginFailure>,
}

/// 注册表构建器
#[derive(Default)]
pub struct RegistryBuilder {
    plugins: Vec<Box<dyn Plugin>>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册插件并检查能力声明
    pub fn register(&mut self, plugin: Box<dyn Plugin>) -> Result<(), ConfigError> {
        let name = plugin.name();
        if self.plugins.iter().any(|p| p.name() == name) {
            return Err(ConfigError::DuplicatePlugin(name.to_string()));
        }
        let caps = plugin.capabilities();
        if caps.is_empty() {
            return Err(ConfigError::NoCapabilities(name.to_string()));
        }
        if !plugin.provides().is_empty() && !caps.contains(Capabilities::PROPERTY_PROVIDER) {
            return Err(ConfigError::ProvidesWithoutCapability {
                plugin: name.to_string(),
            });
        }
        debug!(plugin = name, label = plugin.label(), "Registering plugin");
        self.plugins.push(plugin);
        Ok(())
    }

    pub fn with(mut self, plugin: Box<dyn Plugin>) -> Result<Self, ConfigError> {
        self.register(plugin)?;
        Ok(self)
    }

    /// 解析依赖并按拓扑顺序排列（同层保持注册顺序）
    pub fn build(self) -> Result<PluginRegistry, ConfigError> {
        let plugins = self.plugins;

        let mut providers: HashMap<&'static str, usize> = HashMap::new();
        for (idx, plugin) in plugins.iter().enumerate() {
            for &property in plugin.provides() {
                if let Some(first) = providers.insert(property, idx) {
                    return Err(ConfigError::DuplicateProvider {
                        property: property.to_string(),
                        first: plugins[first].name().to_string(),
                        second: plugin.name().to_string(),
                    });
                }
            }
        }

        // dependencies[i] = 必须先于 i 运行的插件
        let mut dependencies: Vec<Vec<usize>> = Vec::with_capacity(plugins.len());
        for plugin in &plugins {
            let mut deps = Vec::new();
            for property in plugin.requires() {
                match providers.get(property) {
                    Some(&idx) => deps.push(idx),
                    None => {
                        return Err(ConfigError::UnresolvedProperty {
                            plugin: plugin.name().to_string(),
                            property: property.to_string(),
                        })
                    }
                }
            }
            dependencies.push(deps);
        }

        let mut placed = vec![false; plugins.len()];
        let mut order = Vec::with_capacity(plugins.len());
        while order.len() < plugins.len() {
            let next = (0..plugins.len())
                .find(|&i| !placed[i] && dependencies[i].iter().all(|&d| placed[d]));
            match next {
                Some(i) => {
                    placed[i] = true;
                    order.push(i);
                }
                None => {
                    let stuck = (0..plugins.len())
                        .filter(|&i| !placed[i])
                        .map(|i| plugins[i].name().to_string())
                        .collect();
                    return Err(ConfigError::DependencyCycle(stuck));
                }
            }
        }

        let mut slots: Vec<Option<Box<dyn Plugin>>> = plugins.into_iter().map(Some).collect();
        let sorted: Vec<Box<dyn Plugin>> = order
            .into_iter()
            .filter_map(|i| slots[i].take())
            .collect();

        info!(
            plugins = ?sorted.iter().map(|p| p.name()).collect::<Vec<_>>(),
            "Plugin registry built"
        );
        Ok(PluginRegistry { plugins: sorted })
    }
}

/// 已排序的插件注册表
pub struct PluginRegistry {
    plugins: Vec<Box<dyn Plugin>>,
}

impl PluginRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// 执行顺序
    pub fn names(&self) -> Vec<&'static str> {
        self.plugins.iter().map(|p| p.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    fn with_capability(&self, cap: Capabilities) -> impl Iterator<Item = &dyn Plugin> {
        self.plugins
            .iter()
            .map(|p| p.as_ref())
            .filter(move |p| p.capabilities().contains(cap))
    }

    /// 对快照执行一个周期：属性、通知、显示三个阶段依次进行
    ///
    /// 不接触通知总线；对同一快照重复执行得到相同的请求。
    pub fn evaluate(&self, mut sandbox: Sandbox) -> Evaluation {
        let mut failures = Vec::new();

        for plugin in self.with_capability(Capabilities::PROPERTY_PROVIDER) {
            let mut scope = PropertyScope::new(plugin.name(), plugin.provides(), &sandbox);
            match plugin.set_properties(&mut scope) {
                Ok(()) => {
                    let staged = scope.into_staged();
                    sandbox.commit_properties(staged);
                }
                Err(e) => failures.push(failure(plugin, Phase::SetProperties, e)),
            }
        }

        let mut requests = Vec::new();
        let mut snoozes = Vec::new();
        for plugin in self.with_capability(Capabilities::NOTIFICATION_CHECKER) {
            let mut notifier = Notifier::new(plugin.name());
            match plugin.check_notifications(&sandbox, &mut notifier) {
                Ok(()) => {
                    let (plugin_requests, plugin_snoozes) = notifier.into_parts();
                    requests.extend(plugin_requests);
                    snoozes.extend(plugin_snoozes);
                }
                Err(e) => failures.push(failure(plugin, Phase::CheckNotifications, e)),
            }
        }

        let mut pills = Vec::new();
        for plugin in self.with_capability(Capabilities::VISUALISATION_UPDATER) {
            match plugin.update_visualisation(&sandbox) {
                Ok(Some(pill)) => pills.push(PluginPill {
                    plugin: plugin.name().to_string(),
                    plugin_type: plugin.plugin_type(),
                    pill,
                }),
                Ok(None) => {}
                Err(e) => failures.push(failure(plugin, Phase::UpdateVisualisation, e)),
            }
        }

        debug!(
            requests = requests.len(),
            snoozes = snoozes.len(),
            failures = failures.len(),
            "Plugins evaluated"
        );

        Evaluation {
            sandbox,
            requests,
            snoozes,
            pills,
            failures,
        }
    }
}

fn failure(plugin: &dyn Plugin, phase: Phase, error: PluginError) -> PluginFailure {
    warn!(plugin = plugin.name(), phase = %phase, error = %error, "Plugin failed, dropping its output for this cycle");
    PluginFailure {
        plugin: plugin.name().to_string(),
        phase,
        error: error.to_string(),
    }
}
