//! 内置插件

pub mod ar2;
pub mod bwp;
pub mod cage;
pub mod iob;
pub mod simple_alarms;
pub mod treatment_notify;

pub use ar2::Ar2Plugin;
pub use bwp::BwpPlugin;
pub use cage::CagePlugin;
pub use iob::IobPlugin;
pub use simple_alarms::SimpleAlarmsPlugin;
pub use treatment_notify::TreatmentNotifyPlugin;

use crate::config::Config;
use crate::error::ConfigError;
use crate::plugin::{Plugin, PluginRegistry};

/// 全部内置插件，按注册顺序
pub fn all_plugins() -> Vec<Box<dyn Plugin>> {
    vec![
        Box::new(IobPlugin),
        Box::new(Ar2Plugin),
        Box::new(BwpPlugin),
        Box::new(CagePlugin),
        Box::new(TreatmentNotifyPlugin),
        Box::new(SimpleAlarmsPlugin),
    ]
}

/// 按配置的启用列表构建注册表
pub fn default_registry(config: &Config) -> Result<PluginRegistry, ConfigError> {
    let available = all_plugins();

    if let Some(enabled) = &config.enable {
        if let Some(unknown) = enabled
            .iter()
            .find(|name| !available.iter().any(|p| p.name() == name.as_str()))
        {
            return Err(ConfigError::UnknownPlugin(unknown.clone()));
        }
    }

    let mut builder = PluginRegistry::builder();
    for plugin in available {
        let wanted = config
            .enable
            .as_ref()
            .map_or(true, |enabled| enabled.iter().any(|n| n == plugin.name()));
        if wanted {
            builder.register(plugin)?;
        }
    }

    builder.build()
}
