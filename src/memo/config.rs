//! Memoization settings.
//!
//! ```rust
//! use settle::memo::{MemoConfig, RefreshThreshold};
//! use std::time::Duration;
//!
//! let config = MemoConfig::builder()
//!     .ttl(Duration::from_secs(60))
//!     .max_size(1_000)
//!     .refresh_threshold(RefreshThreshold::Fraction(0.75))
//!     .build()
//!     .unwrap();
//! assert_eq!(config.refresh_after(), Some(Duration::from_secs(45)));
//! ```

use std::num::NonZeroUsize;
use std::time::Duration;

use super::error::ConfigError;

/// When a cached value becomes eligible for background refresh.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RefreshThreshold {
    /// A fraction of the ttl, strictly between 0 and 1.
    Fraction(f64),
    /// A fixed age, shorter than the ttl.
    After(Duration),
}

impl RefreshThreshold {
    fn offset(self, ttl: Duration) -> Duration {
        match self {
            Self::Fraction(fraction) => ttl.mul_f64(fraction),
            Self::After(offset) => offset,
        }
    }
}

/// Validated memoization settings.
///
/// The default has no ttl, no size bound and no refresh.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoConfig {
    ttl: Option<Duration>,
    max_size: Option<NonZeroUsize>,
    refresh_threshold: Option<RefreshThreshold>,
}

impl MemoConfig {
    /// Starts building a configuration.
    pub fn builder() -> MemoConfigBuilder {
        MemoConfigBuilder::default()
    }

    /// Time after which an entry expires, if any.
    pub const fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    /// Maximum number of cached entries, if bounded.
    pub const fn max_size(&self) -> Option<NonZeroUsize> {
        self.max_size
    }

    /// The configured refresh threshold.
    pub const fn refresh_threshold(&self) -> Option<RefreshThreshold> {
        self.refresh_threshold
    }

    /// Entry age beyond which a hit triggers a background refresh.
    pub fn refresh_after(&self) -> Option<Duration> {
        let ttl = self.ttl?;
        self.refresh_threshold.map(|threshold| threshold.offset(ttl))
    }
}

/// Builder for [`MemoConfig`].
#[derive(Debug, Clone, Default)]
pub struct MemoConfigBuilder {
    ttl: Option<Duration>,
    max_size: Option<usize>,
    refresh_threshold: Option<RefreshThreshold>,
}

impl MemoConfigBuilder {
    /// Expire entries older than `ttl`.
    #[must_use]
    pub const fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Keep at most `max_size` entries, evicting the least recently used.
    #[must_use]
    pub const fn max_size(mut self, max_size: usize) -> Self {
        self.max_size = Some(max_size);
        self
    }

    /// Refresh entries in the background once they pass `threshold`.
    #[must_use]
    pub const fn refresh_threshold(mut self, threshold: RefreshThreshold) -> Self {
        self.refresh_threshold = Some(threshold);
        self
    }

    /// Validates the settings.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] describing the first invalid setting.
    pub fn build(self) -> Result<MemoConfig, ConfigError> {
        if self.ttl == Some(Duration::ZERO) {
            return Err(ConfigError::ZeroTtl);
        }

        let max_size = match self.max_size {
            Some(size) => Some(NonZeroUsize::new(size).ok_or(ConfigError::ZeroMaxSize)?),
            None => None,
        };

        if let Some(threshold) = self.refresh_threshold {
            let ttl = self.ttl.ok_or(ConfigError::RefreshWithoutTtl)?;
            match threshold {
                RefreshThreshold::Fraction(fraction) if !(fraction > 0.0 && fraction < 1.0) => {
                    return Err(ConfigError::RefreshFractionOutOfRange(fraction));
                }
                RefreshThreshold::After(offset) if offset >= ttl => {
                    return Err(ConfigError::RefreshOffsetNotBelowTtl { offset, ttl });
                }
                _ => {}
            }
        }

        Ok(MemoConfig {
            ttl: self.ttl,
            max_size,
            refresh_threshold: self.refresh_threshold,
        })
    }
}
