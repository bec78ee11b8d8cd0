//! BG Alert - 血糖告警插件、通知仲裁与推送投递

pub mod cli;
pub mod config;
pub mod error;
pub mod model;
pub mod notification;
pub mod pipeline;
pub mod plugin;
pub mod plugins;
pub mod sandbox;

pub use config::Config;
pub use error::{BusError, ConfigError, DeliveryError, PluginError};
pub use model::{Direction, EventType, Profile, Reading, Treatment, Units};
pub use notification::{
    AckOutcome, Arbitration, DeliveryChannel, Level, NotificationBus, NotificationDispatcher,
    NotificationRequest, SnoozeRequest,
};
pub use pipeline::{AlertPipeline, CycleReport, CycleRun};
pub use plugin::{Plugin, PluginRegistry};
pub use sandbox::{Sandbox, SnapshotFile, Thresholds};
