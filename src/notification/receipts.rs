//! 投递回执表 - 紧急告警发送成功后保存 receipt -> 通知 映射，供之后确认（ack）时查找

use serde::Serialize;

use super::request::NotificationRequest;
use super::ttl_cache::TtlCache;
use crate::model::now_millis;

/// 回执默认保留 30 分钟
pub const RECEIPT_TTL_MS: i64 = 30 * 60 * 1000;
const SWEEP_PERIOD_MS: i64 = 2 * 60 * 1000;

/// 投递回执
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeliveryReceipt {
    /// 渠道分配的 receipt id
    pub id: String,
    pub notification: NotificationRequest,
    pub expires_at: i64,
}

/// 回执表（过期自动回收，不论是否已确认）
pub struct ReceiptTable {
    receipts: TtlCache<String, NotificationRequest>,
}

impl ReceiptTable {
    pub fn new() -> Self {
        Self::with_ttl(RECEIPT_TTL_MS)
    }

    pub fn with_ttl(ttl_ms: i64) -> Self {
        Self {
            receipts: TtlCache::new(ttl_ms, SWEEP_PERIOD_MS),
        }
    }

    /// 登记回执
    pub fn register_at(
        &mut self,
        id: impl Into<String>,
        notification: NotificationRequest,
        now: i64,
    ) -> DeliveryReceipt {
        let id = id.into();
        let expires_at = now + self.receipts.default_ttl();
        self.receipts.set_at(id.clone(), notification.clone(), None, now);
        DeliveryReceipt {
            id,
            notification,
            expires_at,
        }
    }

    pub fn register(&mut self, id: impl Into<String>, notification: NotificationRequest) -> DeliveryReceipt {
        self.register_at(id, notification, now_millis())
    }

    /// 查找未过期的回执对应的通知
    pub fn lookup_at(&mut self, id: &str, now: i64) -> Option<NotificationRequest> {
        self.receipts.get_at(id, now).cloned()
    }

    pub fn lookup(&mut self, id: &str) -> Option<NotificationRequest> {
        self.lookup_at(id, now_millis())
    }

    pub fn len(&self) -> usize {
        self.receipts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receipts.is_empty()
    }
}

impl Default for ReceiptTable {
    fn default() -> Self {
        Self::new()
    }
}
