//! Dedup fingerprints for notifications
//!
//! - WARN and above: `{plugin}_{level}`, so every alarm from the same plugin at the
//!   same level shares one key no matter how its message text changes.
//! - INFO and below: a hash of `(title, message)`, so different informational
//!   content from one plugin still goes out.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use super::level::Level;
use super::request::NotificationRequest;

/// Generate the dedup key for a notification
pub fn fingerprint(req: &NotificationRequest) -> String {
    if req.level >= Level::Warn {
        format!("{}_{}", req.plugin, req.level.value())
    } else {
        content_hash(&req.title, &req.message)
    }
}

/// Deterministic hash of title and message
///
/// `str` hashing writes a terminator byte, so `("ab", "c")` and `("a", "bc")`
/// produce different keys.
pub fn content_hash(title: &str, message: &str) -> String {
    let mut hasher = DefaultHasher::new();
    (title, message).hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}
