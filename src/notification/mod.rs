//! 通知层 - 仲裁、去重与多渠道投递
//!
//! 插件只产生请求；`NotificationBus` 在每个周期结束时根据当前 snooze 状态仲裁，
//! `NotificationDispatcher` 把结果路由到各渠道，每个渠道有自己的去重缓存。
//!
//! # 使用示例
//! ```ignore
//! use bg_alert::notification::{NotificationBuilder, NotificationBus};
//!
//! let bus = Arc::new(NotificationBus::new());
//! let dispatcher = NotificationBuilder::from_config(bus.clone(), &config).build();
//!
//! bus.request_notify(request)?;
//! let handles = dispatcher.dispatch(&bus.process());
//! ```

pub mod builder;
pub mod bus;
pub mod channel;
pub mod channels;
pub mod dedup;
pub mod dispatcher;
pub mod fingerprint;
pub mod level;
pub mod receipts;
pub mod request;
pub mod store;
pub mod ttl_cache;

pub use builder::NotificationBuilder;
pub use bus::{ActiveSnooze, Arbitration, NotificationBus, Suppressed, ACK_SNOOZE_MS};
pub use channel::{Delivery, DeliveryChannel, DeliveryOutcome};
pub use dedup::DedupCache;
pub use dispatcher::{collect_reports, AckOutcome, DeliveryReport, DeliveryStatus, NotificationDispatcher};
pub use fingerprint::fingerprint;
pub use level::Level;
pub use receipts::ReceiptTable;
pub use request::{NotificationRequest, SnoozeRequest};
pub use store::{NotificationHistory, NotificationRecord};
