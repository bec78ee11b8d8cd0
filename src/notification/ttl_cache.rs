//! 带过期时间的内存缓存
//!
//! 所有时间均为 epoch 毫秒，由调用方传入，便于测试。
//! 过期条目在访问时惰性删除，并在 `check_period` 到期后整体清扫一次。

use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;

#[derive(Debug, Clone)]
struct Entry<V> {
    value: V,
    expires_at: i64,
}

/// TTL 缓存
#[derive(Debug, Clone)]
pub struct TtlCache<K, V> {
    entries: HashMap<K, Entry<V>>,
    /// 默认存活时间（毫秒）
    default_ttl: i64,
    /// 整体清扫间隔（毫秒）
    check_period: i64,
    last_sweep: i64,
}

impl<K: Eq + Hash, V> TtlCache<K, V> {
    pub fn new(default_ttl: i64, check_period: i64) -> Self {
        Self {
            entries: HashMap::new(),
            default_ttl,
            check_period,
            last_sweep: 0,
        }
    }

    pub fn default_ttl(&self) -> i64 {
        self.default_ttl
    }

    /// 读取未过期的值
    pub fn get_at<Q>(&mut self, key: &Q, now: i64) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.maybe_sweep(now);
        let expired = matches!(self.entries.get(key), Some(e) if e.expires_at <= now);
        if expired {
            self.entries.remove(key);
            return None;
        }
        self.entries.get(key).map(|e| &e.value)
    }

    pub fn contains_at<Q>(&mut self, key: &Q, now: i64) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.get_at(key, now).is_some()
    }

    /// 写入（覆盖）条目，`ttl` 为 None 时使用默认存活时间
    pub fn set_at(&mut self, key: K, value: V, ttl: Option<i64>, now: i64) {
        self.maybe_sweep(now);
        let expires_at = now.saturating_add(ttl.unwrap_or(self.default_ttl));
        self.entries.insert(key, Entry { value, expires_at });
    }

    /// 重设未过期条目的存活时间，返回是否找到
    pub fn touch_at<Q>(&mut self, key: &Q, ttl: i64, now: i64) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        match self.entries.get_mut(key) {
            Some(entry) if entry.expires_at > now => {
                entry.expires_at = now.saturating_add(ttl);
                true
            }
            _ => false,
        }
    }

    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.remove(key).map(|e| e.value)
    }

    /// 过期时间（测试与日志用）
    pub fn expires_at<Q>(&self, key: &Q) -> Option<i64>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.get(key).map(|e| e.expires_at)
    }

    /// 删除所有过期条目，返回删除数量
    pub fn sweep_at(&mut self, now: i64) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, e| e.expires_at > now);
        self.last_sweep = now;
        before - self.entries.len()
    }

    /// 包含尚未清扫的过期条目
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn maybe_sweep(&mut self, now: i64) {
        if now - self.last_sweep >= self.check_period {
            self.sweep_at(now);
        }
    }
}
