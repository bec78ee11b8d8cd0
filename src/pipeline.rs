//! 告警流水线 - 一个周期：插件评估 → 总线仲裁 → 渠道投递

use serde::Serialize;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::Config;
use crate::model::now_millis;
use crate::notification::{
    ActiveSnooze, AckOutcome, DeliveryReport, NotificationBuilder, NotificationBus,
    NotificationDispatcher, NotificationRequest, Suppressed,
};
use crate::plugin::{PluginFailure, PluginPill, PluginRegistry};
use crate::plugins::default_registry;
use crate::sandbox::Sandbox;

/// 一个周期的结果（不含投递结果，投递在后台完成）
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub cycle: u64,
    /// 快照时间（epoch 毫秒）
    pub time: i64,
    pub delivered: Vec<NotificationRequest>,
    pub suppressed: Vec<Suppressed>,
    /// 本周期插件设置的暂停
    pub snoozes: Vec<ActiveSnooze>,
    pub pills: Vec<PluginPill>,
    pub failures: Vec<PluginFailure>,
}

/// `run_cycle` 的返回值
pub struct CycleRun {
    pub report: CycleReport,
    /// 每个（渠道, 通知）的投递任务
    pub deliveries: Vec<JoinHandle<DeliveryReport>>,
}

pub struct AlertPipeline {
    registry: PluginRegistry,
    bus: Arc<NotificationBus>,
    dispatcher: NotificationDispatcher,
    /// 最近一个周期的 (快照时间, 墙钟时间)
    last_cycle: Mutex<Option<(i64, i64)>>,
}

impl AlertPipeline {
    pub fn new(registry: PluginRegistry, dispatcher: NotificationDispatcher) -> Self {
        Self {
            registry,
            bus: dispatcher.bus().clone(),
            dispatcher,
            last_cycle: Mutex::new(None),
        }
    }

    /// 按配置组装插件和渠道
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let registry = default_registry(config)?;
        let bus = Arc::new(NotificationBus::new());
        let dispatcher = NotificationBuilder::from_config(bus, config).build();
        Ok(Self::new(registry, dispatcher))
    }

    pub fn bus(&self) -> &Arc<NotificationBus> {
        &self.bus
    }

    pub fn dispatcher(&self) -> &NotificationDispatcher {
        &self.dispatcher
    }

    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    /// 执行一个周期；必须在 tokio runtime 中调用，投递任务不会被等待
    pub fn run_cycle(&self, sandbox: Sandbox) -> CycleRun {
        let now = sandbox.time;
        *self.last_cycle.lock().unwrap_or_else(|e| e.into_inner()) = Some((now, now_millis()));
        let evaluation = self.registry.evaluate(sandbox);

        let snoozes: Vec<ActiveSnooze> = evaluation
            .snoozes
            .into_iter()
            .map(|s| self.bus.request_snooze_at(s, now))
            .collect();

        for request in evaluation.requests {
            if let Err(e) = self.bus.request_notify(request) {
                warn!(error = %e, "Dropping notification request");
            }
        }

        let arbitration = self.bus.process_at(now);
        let deliveries = self.dispatcher.dispatch_at(&arbitration, now);

        info!(
            cycle = arbitration.cycle,
            delivered = arbitration.delivered.len(),
            suppressed = arbitration.suppressed.len(),
            failures = evaluation.failures.len(),
            "Cycle complete"
        );

        CycleRun {
            report: CycleReport {
                cycle: arbitration.cycle,
                time: now,
                delivered: arbitration.delivered,
                suppressed: arbitration.suppressed,
                snoozes,
                pills: evaluation.pills,
                failures: evaluation.failures,
            },
            deliveries,
        }
    }

    /// 周期时钟：上个周期的快照时间加上之后经过的墙钟时间；还没有周期时就是墙钟
    pub fn cycle_clock(&self) -> i64 {
        let wall = now_millis();
        match *self.last_cycle.lock().unwrap_or_else(|e| e.into_inner()) {
            Some((cycle_time, wall_at)) => cycle_time.saturating_add((wall - wall_at).max(0)),
            None => wall,
        }
    }

    /// 外部确认（例如 Pushover 回调），按周期时钟计算暂停
    pub fn acknowledge(&self, receipt: &str) -> AckOutcome {
        self.dispatcher.acknowledge_at(receipt, self.cycle_clock())
    }

    pub fn acknowledge_at(&self, receipt: &str, now: i64) -> AckOutcome {
        self.dispatcher.acknowledge_at(receipt, now)
    }
}
