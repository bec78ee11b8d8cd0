//! 通知去重/限流缓存 - 防止冗余渠道在短时间内重复发送同一告警
//!
//! ## 去重策略
//! 1. 按指纹去重（见 `fingerprint`）
//! 2. 发送前写入临时条目（30 秒），覆盖发送中的窗口
//! 3. 发送成功后延长为完整冷却期（15 分钟）
//! 4. 发送失败时临时条目自然过期，下个周期可重试

use tracing::debug;

use super::fingerprint::fingerprint;
use super::request::NotificationRequest;
use super::ttl_cache::TtlCache;
use crate::model::now_millis;

pub const PROVISIONAL_TTL_MS: i64 = 30 * 1000;
pub const COOLDOWN_MS: i64 = 15 * 60 * 1000;
pub const SWEEP_PERIOD_MS: i64 = 20 * 1000;

/// 单个渠道的去重缓存
pub struct DedupCache {
    /// 最近发送的指纹
    recent: TtlCache<String, ()>,
    provisional_ttl: i64,
    cooldown: i64,
}

impl DedupCache {
    pub fn new() -> Self {
        Self {
            recent: TtlCache::new(COOLDOWN_MS, SWEEP_PERIOD_MS),
            provisional_ttl: PROVISIONAL_TTL_MS,
            cooldown: COOLDOWN_MS,
        }
    }

    /// 设置冷却期
    pub fn with_cooldown(mut self, cooldown_ms: i64) -> Self {
        self.cooldown = cooldown_ms;
        self
    }

    /// 设置临时条目时长
    pub fn with_provisional_ttl(mut self, ttl_ms: i64) -> Self {
        self.provisional_ttl = ttl_ms;
        self
    }

    /// 检查是否应该发送
    ///
    /// 返回 `true` 表示应该发送；此时不记录，记录在发送时进行
    pub fn should_send(&mut self, req: &NotificationRequest) -> bool {
        self.should_send_at(req, now_millis())
    }

    pub fn should_send_at(&mut self, req: &NotificationRequest, now: i64) -> bool {
        let key = fingerprint(req);
        if self.recent.contains_at(key.as_str(), now) {
            debug!(key = %key, plugin = %req.plugin, "Notification has already been sent");
            return false;
        }
        true
    }

    /// 发送前记录临时条目
    pub fn record_provisional_at(&mut self, key: &str, now: i64) {
        self.recent
            .set_at(key.to_string(), (), Some(self.provisional_ttl), now);
    }

    /// 发送成功后延长为完整冷却期
    pub fn confirm_at(&mut self, key: &str, now: i64) -> bool {
        let extended = self.recent.touch_at(key, self.cooldown, now);
        if !extended {
            // 临时条目已过期（发送很慢），重新记录
            self.recent.set_at(key.to_string(), (), Some(self.cooldown), now);
        }
        extended
    }

    /// 渠道跳过发送时释放临时条目
    pub fn release(&mut self, key: &str) {
        self.recent.remove(key);
    }

    /// 检查并占用：可以发送时立即写入临时条目并返回指纹
    pub fn claim_at(&mut self, req: &NotificationRequest, now: i64) -> Option<String> {
        if !self.should_send_at(req, now) {
            return None;
        }
        let key = fingerprint(req);
        self.record_provisional_at(&key, now);
        Some(key)
    }

    pub fn sweep_at(&mut self, now: i64) -> usize {
        self.recent.sweep_at(now)
    }
}

impl Default for DedupCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::level::Level;

    const T0: i64 = 1_700_000_000_000;
    const MINUTE: i64 = 60 * 1000;

    fn alarm(plugin: &str, level: Level, message: &str) -> NotificationRequest {
        NotificationRequest::new(plugin, level, "Alarm", message)
    }

    fn info(title: &str, message: &str) -> NotificationRequest {
        NotificationRequest::new("treatmentnotify", Level::Info, title, message)
    }

    #[test]
    fn test_same_alarm_within_cooldown_is_deduplicated() {
        let mut dedup = DedupCache::new();
        let req = alarm("simplealarms", Level::Urgent, "BG Now: 65");

        let key = dedup.claim_at(&req, T0).unwrap();
        dedup.confirm_at(&key, T0 + 1_000);

        assert!(!dedup.should_send_at(&req, T0 + 2 * MINUTE));
        // 同插件同级别，不同文本也被去重
        let reworded = alarm("simplealarms", Level::Urgent, "BG Now: 61");
        assert!(!dedup.should_send_at(&reworded, T0 + 14 * MINUTE));
        // 冷却期结束后可以重新发送
        assert!(dedup.should_send_at(&req, T0 + 1_000 + COOLDOWN_MS));
    }

    #[test]
    fn test_other_plugin_or_level_not_deduplicated() {
        let mut dedup = DedupCache::new();
        let key = dedup
            .claim_at(&alarm("simplealarms", Level::Urgent, "x"), T0)
            .unwrap();
        dedup.confirm_at(&key, T0);

        assert!(dedup.should_send_at(&alarm("simplealarms", Level::Warn, "x"), T0 + MINUTE));
        assert!(dedup.should_send_at(&alarm("bwp", Level::Urgent, "x"), T0 + MINUTE));
    }

    #[test]
    fn test_distinct_info_messages_all_pass() {
        let mut dedup = DedupCache::new();
        for i in 0..5 {
            let req = info("Calibration", &format!("Meter BG: {}", 100 + i));
            let key = dedup.claim_at(&req, T0 + i).unwrap();
            dedup.confirm_at(&key, T0 + i);
        }
        // 完全相同的 INFO 内容被去重
        assert!(!dedup.should_send_at(&info("Calibration", "Meter BG: 100"), T0 + MINUTE));
    }

    #[test]
    fn test_failed_delivery_expires_quickly() {
        let mut dedup = DedupCache::new();
        let req = alarm("cage", Level::Warn, "Time to change cannula");

        assert!(dedup.claim_at(&req, T0).is_some());
        // 发送中：被挡住
        assert!(dedup.claim_at(&req, T0 + 10_000).is_none());
        // 没有 confirm（发送失败），临时条目过期后可重试
        assert!(dedup.claim_at(&req, T0 + PROVISIONAL_TTL_MS).is_some());
    }

    #[test]
    fn test_should_send_does_not_record() {
        let mut dedup = DedupCache::new();
        let req = alarm("bwp", Level::Warn, "x");
        assert!(dedup.should_send_at(&req, T0));
        assert!(dedup.should_send_at(&req, T0));
    }

    #[test]
    fn test_release_frees_claim() {
        let mut dedup = DedupCache::new();
        let req = alarm("bwp", Level::Warn, "x");
        let key = dedup.claim_at(&req, T0).unwrap();
        dedup.release(&key);
        assert!(dedup.should_send_at(&req, T0 + 1));
    }

    #[test]
    fn test_late_confirm_still_records_cooldown() {
        let mut dedup = DedupCache::new().with_provisional_ttl(1_000);
        let req = alarm("bwp", Level::Urgent, "x");
        let key = dedup.claim_at(&req, T0).unwrap();

        assert!(!dedup.confirm_at(&key, T0 + 5_000));
        assert!(!dedup.should_send_at(&req, T0 + 10 * MINUTE));
    }

    #[test]
    fn test_custom_cooldown() {
        let mut dedup = DedupCache::new().with_cooldown(MINUTE);
        let req = alarm("bwp", Level::Urgent, "x");
        let key = dedup.claim_at(&req, T0).unwrap();
        dedup.confirm_at(&key, T0);
        assert!(!dedup.should_send_at(&req, T0 + MINUTE - 1));
        assert!(dedup.should_send_at(&req, T0 + MINUTE));
    }
}
