//! 通知总线 - 收集插件的通知/暂停请求并仲裁
//!
//! 总线实例拥有进程级状态（当前生效的暂停、周期计数），由调用方通过 `Arc` 共享，
//! 不存在全局单例。所有修改都在一次加锁内完成，确认回调可以与周期并发执行。

use serde::Serialize;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

use super::level::Level;
use super::request::{NotificationRequest, SnoozeRequest};
use crate::error::BusError;
use crate::model::now_millis;

/// 确认紧急告警后默认暂停 30 分钟
pub const ACK_SNOOZE_MS: i64 = 30 * 60 * 1000;

/// 生效中的暂停
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActiveSnooze {
    pub level: Level,
    /// 过期时间（epoch 毫秒）
    pub until: i64,
    pub title: String,
    pub message: String,
    /// 发起插件；None 表示来自确认回执
    pub origin: Option<String>,
    /// 最近一次设置/延长时所在的周期
    pub cycle: u64,
}

/// 被暂停抑制的通知
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Suppressed {
    pub notification: NotificationRequest,
    pub snoozed_by: ActiveSnooze,
}

/// 一个周期的仲裁结果
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Arbitration {
    pub cycle: u64,
    /// 按级别从高到低排序（同级保持提交顺序）
    pub delivered: Vec<NotificationRequest>,
    pub suppressed: Vec<Suppressed>,
}

#[derive(Default)]
struct BusState {
    snoozes: Vec<ActiveSnooze>,
    pending: Vec<NotificationRequest>,
    cycle: u64,
}

impl BusState {
    fn prune(&mut self, now: i64) {
        self.snoozes.retain(|s| s.until > now);
    }

    fn apply_snooze(&mut self, req: SnoozeRequest, now: i64) -> ActiveSnooze {
        self.prune(now);
        let until = now.saturating_add(req.length_mills.max(0));
        let cycle = self.cycle;

        let existing = self
            .snoozes
            .iter_mut()
            .find(|s| s.level == req.level && s.origin == req.plugin);

        let snooze = match existing {
            Some(current) => {
                current.until = current.until.max(until);
                current.title = req.title;
                current.message = req.message;
                current.cycle = cycle;
                current.clone()
            }
            None => {
                let snooze = ActiveSnooze {
                    level: req.level,
                    until,
                    title: req.title,
                    message: req.message,
                    origin: req.plugin,
                    cycle,
                };
                self.snoozes.push(snooze.clone());
                snooze
            }
        };
        snooze
    }

    /// 找到覆盖 `level` 的暂停；同一插件在本周期自己发起的暂停不抑制它自己的通知
    fn snoozed_by(&self, level: Level, plugin: Option<&str>, now: i64) -> Option<&ActiveSnooze> {
        self.snoozes
            .iter()
            .filter(|s| s.until > now && s.level >= level)
            .filter(|s| {
                let own_this_cycle =
                    plugin.is_some() && s.cycle == self.cycle && s.origin.as_deref() == plugin;
                !own_this_cycle
            })
            .max_by_key(|s| (s.level, s.until))
    }
}

/// 通知总线
pub struct NotificationBus {
    state: Mutex<BusState>,
}

impl NotificationBus {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(BusState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, BusState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// 提交通知请求（缓存到本周期，`process` 时仲裁）
    pub fn request_notify(&self, req: NotificationRequest) -> Result<(), BusError> {
        if req.plugin.trim().is_empty() {
            warn!(title = %req.title, "Rejecting notification without plugin identity");
            return Err(BusError::MissingPlugin(req.title));
        }
        debug!(plugin = %req.plugin, level = %req.level, title = %req.title, "Notification requested");
        self.state().pending.push(req);
        Ok(())
    }

    /// 立即设置/延长暂停
    pub fn request_snooze(&self, req: SnoozeRequest) -> ActiveSnooze {
        self.request_snooze_at(req, now_millis())
    }

    pub fn request_snooze_at(&self, req: SnoozeRequest, now: i64) -> ActiveSnooze {
        let snooze = self.state().apply_snooze(req, now);
        info!(
            level = %snooze.level,
            until = snooze.until,
            origin = ?snooze.origin,
            title = %snooze.title,
            "Snoozing alarms"
        );
        snooze
    }

    /// 渠道收到外部确认：等价于手动暂停该级别
    pub fn ack(&self, level: Level, length_mills: i64, success: bool) {
        self.ack_at(level, length_mills, success, now_millis());
    }

    pub fn ack_at(&self, level: Level, length_mills: i64, success: bool, now: i64) {
        if !success {
            warn!(level = %level, "Acknowledgement reported failure, ignoring");
            return;
        }
        let snooze = SnoozeRequest::new(level, length_mills)
            .with_title(format!("{} alarm acknowledged", level))
            .with_message(format!("Snoozed for {} minutes", length_mills / 60_000));
        self.request_snooze_at(snooze, now);
    }

    /// `level` 当前是否被暂停
    pub fn currently_snoozed(&self, level: Level) -> bool {
        self.currently_snoozed_at(level, now_millis())
    }

    pub fn currently_snoozed_at(&self, level: Level, now: i64) -> bool {
        self.state().snoozed_by(level, None, now).is_some()
    }

    pub fn active_snoozes_at(&self, now: i64) -> Vec<ActiveSnooze> {
        let mut state = self.state();
        state.prune(now);
        state.snoozes.clone()
    }

    pub fn cycle(&self) -> u64 {
        self.state().cycle
    }

    pub fn pending_count(&self) -> usize {
        self.state().pending.len()
    }

    /// 仲裁本周期的请求并结束周期
    pub fn process(&self) -> Arbitration {
        self.process_at(now_millis())
    }

    pub fn process_at(&self, now: i64) -> Arbitration {
        let mut state = self.state();
        state.prune(now);

        let pending = std::mem::take(&mut state.pending);
        let cycle = state.cycle;
        let mut delivered = Vec::new();
        let mut suppressed = Vec::new();

        for req in pending {
            match state.snoozed_by(req.level, Some(&req.plugin), now) {
                Some(snooze) => {
                    info!(
                        plugin = %req.plugin,
                        level = %req.level,
                        title = %req.title,
                        snoozed_at = %snooze.level,
                        "Notification snoozed"
                    );
                    suppressed.push(Suppressed {
                        snoozed_by: snooze.clone(),
                        notification: req,
                    });
                }
                None => delivered.push(req),
            }
        }

        delivered.sort_by(|a, b| b.level.cmp(&a.level));
        state.cycle += 1;

        debug!(
            cycle,
            delivered = delivered.len(),
            suppressed = suppressed.len(),
            "Cycle arbitrated"
        );

        Arbitration {
            cycle,
            delivered,
            suppressed,
        }
    }
}

impl Default for NotificationBus {
    fn default() -> Self {
        Self::new()
    }
}
