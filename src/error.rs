//! Error types for the alerting core

use thiserror::Error;

/// A single plugin failed during one phase of a cycle. Never fatal to the cycle.
#[derive(Debug, Error)]
pub enum PluginError {
    #[error("missing required data: {0}")]
    MissingData(String),

    #[error("plugin {plugin} wrote undeclared property '{property}'")]
    UndeclaredProperty { plugin: String, property: String },

    #[error("property '{0}' has an unexpected shape: {1}")]
    PropertyShape(String, #[source] serde_json::Error),

    #[error("property serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Failed(String),
}

/// Registry or runtime configuration problem, fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("plugin '{0}' is registered twice")]
    DuplicatePlugin(String),

    #[error("plugin '{0}' declares no capabilities")]
    NoCapabilities(String),

    #[error("plugin '{plugin}' provides properties but is not a property provider")]
    ProvidesWithoutCapability { plugin: String },

    #[error("property '{property}' is provided by both '{first}' and '{second}'")]
    DuplicateProvider {
        property: String,
        first: String,
        second: String,
    },

    #[error("plugin '{plugin}' requires property '{property}' which no plugin provides")]
    UnresolvedProperty { plugin: String, property: String },

    #[error("cyclic plugin dependency between: {}", .0.join(", "))]
    DependencyCycle(Vec<String>),

    #[error("unknown plugin '{0}' in enable list")]
    UnknownPlugin(String),
}

/// Out-of-band delivery failure; the provisional dedup entry is left to expire.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("delivery timed out")]
    Timeout,

    #[error("provider rejected message (status {status}): {message}")]
    Rejected { status: i64, message: String },

    #[error("channel misconfigured: {0}")]
    Config(String),
}

/// Rejected bus submission.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BusError {
    #[error("notification '{0}' has no plugin identity")]
    MissingPlugin(String),
}
