//! 通知分发器 - 管理多个渠道，把仲裁结果路由到各渠道
//!
//! 每个（渠道, 通知）对在独立的 tokio 任务中发送，慢渠道不会阻塞其他渠道。
//! 去重检查在 spawn 之前完成，同一周期内同一指纹只会被认领一次。

use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::bus::{Arbitration, NotificationBus, ACK_SNOOZE_MS};
use super::channel::{Delivery, DeliveryChannel, DeliveryOutcome};
use super::dedup::DedupCache;
use super::level::Level;
use super::request::NotificationRequest;
use crate::model::now_millis;

/// 单次投递的最终状态
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DeliveryStatus {
    Delivered { receipt: Option<String> },
    Skipped { reason: String },
    Deduplicated,
    DryRun,
    Failed { error: String },
}

/// 投递报告
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeliveryReport {
    pub channel: String,
    pub notification: NotificationRequest,
    pub snoozed: bool,
    #[serde(flatten)]
    pub status: DeliveryStatus,
}

/// 确认结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum AckOutcome {
    Acknowledged {
        level: Level,
        notification: NotificationRequest,
    },
    NotFound,
}

struct ChannelRoute {
    channel: Arc<dyn DeliveryChannel>,
    dedup: Option<Arc<Mutex<DedupCache>>>,
}

fn lock_dedup(dedup: &Mutex<DedupCache>) -> MutexGuard<'_, DedupCache> {
    dedup.lock().unwrap_or_else(|e| e.into_inner())
}

/// 通知分发器
pub struct NotificationDispatcher {
    routes: Vec<ChannelRoute>,
    bus: Arc<NotificationBus>,
    /// 是否为 dry-run 模式
    dry_run: bool,
}

impl NotificationDispatcher {
    pub fn new(bus: Arc<NotificationBus>) -> Self {
        Self {
            routes: Vec::new(),
            bus,
            dry_run: false,
        }
    }

    /// 设置 dry-run 模式
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// 注册渠道（使用默认去重缓存）
    pub fn register_channel(&mut self, channel: Arc<dyn DeliveryChannel>) {
        let dedup = channel
            .deduplicates()
            .then(|| Arc::new(Mutex::new(DedupCache::new())));
        self.register_route(channel, dedup);
    }

    /// 注册渠道并指定去重缓存
    pub fn register_channel_with_dedup(&mut self, channel: Arc<dyn DeliveryChannel>, dedup: DedupCache) {
        self.register_route(channel, Some(Arc::new(Mutex::new(dedup))));
    }

    fn register_route(&mut self, channel: Arc<dyn DeliveryChannel>, dedup: Option<Arc<Mutex<DedupCache>>>) {
        info!(
            channel = channel.name(),
            dedup = dedup.is_some(),
            respects_snooze = channel.respects_snooze(),
            "Registering notification channel"
        );
        self.routes.push(ChannelRoute { channel, dedup });
    }

    pub fn bus(&self) -> &Arc<NotificationBus> {
        &self.bus
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// 获取已注册的渠道数量
    pub fn channel_count(&self) -> usize {
        self.routes.len()
    }

    /// 获取已注册的渠道名称
    pub fn channel_names(&self) -> Vec<&str> {
        self.routes.iter().map(|r| r.channel.name()).collect()
    }

    /// 分发一个周期的仲裁结果，返回每个投递任务的句柄
    pub fn dispatch(&self, arbitration: &Arbitration) -> Vec<JoinHandle<DeliveryReport>> {
        self.dispatch_at(arbitration, now_millis())
    }

    pub fn dispatch_at(&self, arbitration: &Arbitration, now: i64) -> Vec<JoinHandle<DeliveryReport>> {
        let mut handles = Vec::new();

        for notification in &arbitration.delivered {
            for route in &self.routes {
                let delivery = Delivery::new(notification.clone(), arbitration.cycle);
                handles.push(self.route_delivery(route, delivery, now));
            }
        }

        for suppressed in &arbitration.suppressed {
            for route in self.routes.iter().filter(|r| !r.channel.respects_snooze()) {
                let delivery = Delivery::snoozed(suppressed.notification.clone(), arbitration.cycle);
                handles.push(self.route_delivery(route, delivery, now));
            }
        }

        debug!(cycle = arbitration.cycle, tasks = handles.len(), "Dispatched cycle");
        handles
    }

    fn route_delivery(&self, route: &ChannelRoute, delivery: Delivery, now: i64) -> JoinHandle<DeliveryReport> {
        let channel = route.channel.clone();
        let name = channel.name().to_string();
        let report = |status: DeliveryStatus, delivery: &Delivery| DeliveryReport {
            channel: name.clone(),
            notification: delivery.notification.clone(),
            snoozed: delivery.snoozed,
            status,
        };

        if !channel.should_send(&delivery.notification) {
            let done = report(
                DeliveryStatus::Skipped {
                    reason: format!("below {} threshold", name),
                },
                &delivery,
            );
            return tokio::spawn(async move { done });
        }

        if self.dry_run {
            let already_sent = route
                .dedup
                .as_ref()
                .map(|d| !lock_dedup(d).should_send_at(&delivery.notification, now))
                .unwrap_or(false);
            let status = if already_sent {
                DeliveryStatus::Deduplicated
            } else {
                info!(
                    channel = %name,
                    level = %delivery.level(),
                    title = %delivery.notification.title,
                    "[DRY-RUN] Would send notification"
                );
                DeliveryStatus::DryRun
            };
            let done = report(status, &delivery);
            return tokio::spawn(async move { done });
        }

        let claim = match &route.dedup {
            Some(dedup) => match lock_dedup(dedup).claim_at(&delivery.notification, now) {
                Some(key) => Some((dedup.clone(), key)),
                None => {
                    let done = report(DeliveryStatus::Deduplicated, &delivery);
                    return tokio::spawn(async move { done });
                }
            },
            None => None,
        };

        tokio::spawn(async move {
            let status = match channel.send(&delivery).await {
                Ok(DeliveryOutcome::Delivered { receipt }) => {
                    if let Some((dedup, key)) = &claim {
                        lock_dedup(dedup).confirm_at(key, now);
                    }
                    info!(
                        channel = %name,
                        plugin = %delivery.notification.plugin,
                        level = %delivery.level(),
                        receipt = ?receipt,
                        "Notification delivered"
                    );
                    DeliveryStatus::Delivered { receipt }
                }
                Ok(DeliveryOutcome::Skipped(reason)) => {
                    if let Some((dedup, key)) = &claim {
                        lock_dedup(dedup).release(key);
                    }
                    debug!(channel = %name, reason = %reason, "Channel skipped notification");
                    DeliveryStatus::Skipped { reason }
                }
                Err(e) => {
                    // 临时去重条目保留到过期，下个周期可重试
                    warn!(
                        channel = %name,
                        plugin = %delivery.notification.plugin,
                        error = %e,
                        "Channel send failed"
                    );
                    DeliveryStatus::Failed {
                        error: e.to_string(),
                    }
                }
            };
            DeliveryReport {
                channel: name,
                notification: delivery.notification,
                snoozed: delivery.snoozed,
                status,
            }
        })
    }

    /// 处理外部确认：找到回执对应的通知并按其级别暂停
    pub fn acknowledge(&self, receipt: &str) -> AckOutcome {
        self.acknowledge_at(receipt, now_millis())
    }

    pub fn acknowledge_at(&self, receipt: &str, now: i64) -> AckOutcome {
        let found = self
            .routes
            .iter()
            .find_map(|r| r.channel.acknowledge(receipt).map(|n| (r.channel.name(), n)));

        match found {
            Some((channel, notification)) => {
                let level = notification.level;
                self.bus.ack_at(level, ACK_SNOOZE_MS, true, now);
                info!(
                    channel,
                    receipt,
                    level = %level,
                    title = %notification.title,
                    "Notification acknowledged"
                );
                AckOutcome::Acknowledged { level, notification }
            }
            None => {
                warn!(receipt, "Unknown or expired receipt");
                AckOutcome::NotFound
            }
        }
    }
}

/// 等待所有投递任务完成
pub async fn collect_reports(handles: Vec<JoinHandle<DeliveryReport>>) -> Vec<DeliveryReport> {
    let mut reports = Vec::with_capacity(handles.len());
    for handle in handles {
        match handle.await {
            Ok(report) => reports.push(report),
            Err(e) => warn!(error = %e, "Delivery task failed to complete"),
        }
    }
    reports
}
