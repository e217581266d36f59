use std::time::Duration;

use thiserror::Error;

/// A cache key could not be derived from call arguments.
///
/// Raised synchronously by `call`, before any task is created.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot derive cache key: {message}")]
pub struct KeyError {
    message: String,
}

impl KeyError {
    /// Creates a key error with a custom message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The failure description.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<serde_json::Error> for KeyError {
    fn from(error: serde_json::Error) -> Self {
        Self::new(error.to_string())
    }
}

/// Invalid memoization settings rejected by [`MemoConfigBuilder::build`](super::MemoConfigBuilder::build).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// A time-to-live of zero would expire every entry on insertion.
    #[error("ttl must be greater than zero")]
    ZeroTtl,

    /// A bounded cache must hold at least one entry.
    #[error("max_size must be greater than zero")]
    ZeroMaxSize,

    /// A refresh threshold only makes sense relative to a ttl.
    #[error("refresh_threshold requires a ttl")]
    RefreshWithoutTtl,

    /// Fractional thresholds must lie strictly between 0 and 1.
    #[error("refresh fraction must be in (0, 1), got {0}")]
    RefreshFractionOutOfRange(f64),

    /// Absolute thresholds must be shorter than the ttl.
    #[error("refresh offset {offset:?} must be shorter than ttl {ttl:?}")]
    RefreshOffsetNotBelowTtl {
        /// The configured offset.
        offset: Duration,
        /// The configured ttl.
        ttl: Duration,
    },
}

/// Background work was requested outside of a tokio runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("no tokio runtime is available to run background work")]
pub struct RuntimeUnavailable;
