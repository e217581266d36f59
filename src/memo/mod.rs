//! Memoization of asynchronous producers.
//!
//! A memoized producer wraps one asynchronous function `Fn(A) -> Future<Output
//! = Result<V, E>>` with a cache keyed by the call arguments. Four variants
//! add policy in layers:
//!
//! | Type | TTL + LRU | Deduplication | Stale-while-revalidate |
//! |------|-----------|---------------|------------------------|
//! | [`Memoized`] | - | - | - |
//! | [`BoundedMemoized`] | yes | - | - |
//! | [`DedupMemoized`] | yes | yes | - |
//! | [`RefreshingMemoized`] | yes | yes | yes |
//!
//! Every variant shares these rules:
//!
//! - Keys come from a [`KeyResolver`]; [`JsonKey`] is the default.
//! - Key derivation failures surface synchronously from `call` as
//!   [`KeyError`], before any task exists.
//! - `call` returns a [`Task`](crate::task::Task). Hits are pre-settled
//!   tasks; misses invoke the producer when the task is first polled.
//! - A rejection is never cached.
//! - Time comes from an injectable [`Clock`]; [`TokioClock`] by default.
//! - Handles are cheap to clone and clones share one cache.
//!
//! # Building
//!
//! [`MemoBuilder`] configures the key resolver, clock, [`MemoConfig`] and
//! refresh-failure hook, then picks the variant:
//!
//! ```rust
//! use settle::memo::{ManualClock, MemoBuilder, MemoConfig, RefreshThreshold};
//! use std::time::Duration;
//!
//! let clock = ManualClock::new();
//! let config = MemoConfig::builder()
//!     .ttl(Duration::from_secs(60))
//!     .refresh_threshold(RefreshThreshold::Fraction(0.5))
//!     .build()
//!     .unwrap();
//!
//! let profile = MemoBuilder::with_key_resolver(
//!     |user_id: u64| async move { Ok::<_, String>(format!("profile {user_id}")) },
//!     settle::memo::FnKey::new(|user_id: &u64| user_id.to_string()),
//! )
//! .clock(clock.clone())
//! .config(config)
//! .on_refresh_error(|key, reason| eprintln!("refresh of {key} failed: {reason}"))
//! .refreshing();
//! # let _ = profile;
//! ```

/// Shared inspection methods, `Clone` and `Debug` for the memoizer handles.
macro_rules! impl_cache_handle {
    ($name:ident $(, $extra:ident)*) => {
        impl<A, V, E> $name<A, V, E> {
            /// Forgets the cached value and any in-flight call for `args`.
            ///
            /// Returns `true` if anything was dropped. A dropped in-flight
            /// call still settles for the tasks awaiting it, but its result
            /// is not cached.
            ///
            /// # Errors
            ///
            /// Returns [`KeyError`](crate::memo::KeyError) if no cache key can
            /// be derived from `args`.
            pub fn invalidate(&self, args: &A) -> Result<bool, $crate::memo::KeyError> {
                let key = self.core.key(args)?;
                Ok(self.core.invalidate(&key))
            }

            /// Returns `true` if a value, live or expired, is held for `args`.
            ///
            /// # Errors
            ///
            /// Returns [`KeyError`](crate::memo::KeyError) if no cache key can
            /// be derived from `args`.
            pub fn contains(&self, args: &A) -> Result<bool, $crate::memo::KeyError> {
                let key = self.core.key(args)?;
                Ok(self.core.lock().store.contains(&key))
            }

            /// Forgets every cached value and in-flight call.
            pub fn clear(&self) {
                self.core.clear();
            }

            /// Number of cached entries.
            pub fn len(&self) -> usize {
                self.core.lock().store.len()
            }

            /// Returns `true` if nothing is cached.
            pub fn is_empty(&self) -> bool {
                self.len() == 0
            }

            /// Hit, miss and eviction counters.
            pub fn stats(&self) -> $crate::memo::CacheStats {
                self.core.lock().store.stats()
            }
        }

        impl<A, V, E> Clone for $name<A, V, E> {
            fn clone(&self) -> Self {
                Self {
                    core: ::std::sync::Arc::clone(&self.core),
                    $($extra: self.$extra.clone(),)*
                }
            }
        }

        impl<A, V, E> ::std::fmt::Debug for $name<A, V, E> {
            fn fmt(&self, formatter: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                formatter
                    .debug_struct(stringify!($name))
                    .field("len", &self.len())
                    .field("config", self.core.config())
                    .finish_non_exhaustive()
            }
        }
    };
}

mod basic;
mod bounded;
mod clock;
mod config;
mod dedup;
mod error;
mod key;
mod refresh;
mod shared;
mod store;

pub use basic::Memoized;
pub use bounded::BoundedMemoized;
pub use clock::{Clock, ManualClock, TokioClock};
pub use config::{MemoConfig, MemoConfigBuilder, RefreshThreshold};
pub use dedup::DedupMemoized;
pub use error::{ConfigError, KeyError, RuntimeUnavailable};
pub use key::{CacheKey, FnKey, JsonKey, KeyResolver};
pub use refresh::{RefreshErrorHook, RefreshingMemoized};
pub use shared::SweeperHandle;
pub use store::{CacheEntry, CacheStats};

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use serde::Serialize;

use self::shared::{Core, Producer};

// =============================================================================
// MemoBuilder
// =============================================================================

/// Configures and creates a memoized producer.
///
/// Defaults: [`JsonKey`] (for [`MemoBuilder::new`]), [`TokioClock`],
/// [`MemoConfig::default`] and no refresh-failure hook.
pub struct MemoBuilder<A, V, E> {
    producer: Producer<A, V, E>,
    resolver: Arc<dyn KeyResolver<A>>,
    clock: Arc<dyn Clock>,
    config: MemoConfig,
    on_refresh_error: Option<RefreshErrorHook<E>>,
}

impl<A, V, E> MemoBuilder<A, V, E>
where
    A: Send + 'static,
    V: Clone + Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    /// Starts from `producer`, keying calls by their JSON serialization.
    pub fn new<F, Fut>(producer: F) -> Self
    where
        A: Serialize,
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        Self::with_key_resolver(producer, JsonKey)
    }

    /// Starts from `producer`, keying calls with `resolver`.
    pub fn with_key_resolver<F, Fut, R>(producer: F, resolver: R) -> Self
    where
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
        R: KeyResolver<A> + 'static,
    {
        Self {
            producer: Arc::new(move |args| producer(args).boxed()),
            resolver: Arc::new(resolver),
            clock: Arc::new(TokioClock),
            config: MemoConfig::default(),
            on_refresh_error: None,
        }
    }

    /// Replaces the key resolver.
    #[must_use]
    pub fn key_resolver<R>(mut self, resolver: R) -> Self
    where
        R: KeyResolver<A> + 'static,
    {
        self.resolver = Arc::new(resolver);
        self
    }

    /// Keys calls with `function`.
    #[must_use]
    pub fn key_fn<F>(self, function: F) -> Self
    where
        F: Fn(&A) -> CacheKey + Send + Sync + 'static,
    {
        self.key_resolver(FnKey::new(function))
    }

    /// Replaces the clock used for expiry and refresh decisions.
    #[must_use]
    pub fn clock<C>(mut self, clock: C) -> Self
    where
        C: Clock + 'static,
    {
        self.clock = Arc::new(clock);
        self
    }

    /// Sets the ttl, size bound and refresh threshold.
    #[must_use]
    pub fn config(mut self, config: MemoConfig) -> Self {
        self.config = config;
        self
    }

    /// Observes failed background refreshes of [`RefreshingMemoized`].
    #[must_use]
    pub fn on_refresh_error<H>(mut self, hook: H) -> Self
    where
        H: Fn(&str, &E) + Send + Sync + 'static,
    {
        self.on_refresh_error = Some(Arc::new(hook));
        self
    }

    fn into_core(self, config: MemoConfig) -> Arc<Core<A, V, E>> {
        Arc::new(Core::new(self.producer, self.resolver, self.clock, config))
    }

    /// Builds the basic variant. The configuration is ignored: entries never
    /// expire and the cache is unbounded.
    pub fn basic(self) -> Memoized<A, V, E> {
        Memoized::from_core(self.into_core(MemoConfig::default()))
    }

    /// Builds the ttl + LRU variant.
    pub fn bounded(self) -> BoundedMemoized<A, V, E> {
        let config = self.config.clone();
        BoundedMemoized::from_core(self.into_core(config))
    }
}

impl<A, V, E> MemoBuilder<A, V, E>
where
    A: Send + 'static,
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// Builds the deduplicating variant.
    pub fn dedup(self) -> DedupMemoized<A, V, E> {
        let config = self.config.clone();
        DedupMemoized::from_core(self.into_core(config))
    }

    /// Builds the stale-while-revalidate variant.
    pub fn refreshing(mut self) -> RefreshingMemoized<A, V, E> {
        let config = self.config.clone();
        let hook = self.on_refresh_error.take();
        RefreshingMemoized::from_core(self.into_core(config), hook)
    }
}

impl<A, V, E> fmt::Debug for MemoBuilder<A, V, E> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("MemoBuilder")
            .field("clock", &self.clock)
            .field("config", &self.config)
            .field("on_refresh_error", &self.on_refresh_error.is_some())
            .finish_non_exhaustive()
    }
}

static_assertions::assert_impl_all!(Memoized<u64, String, String>: Send, Sync, Clone);
static_assertions::assert_impl_all!(DedupMemoized<u64, String, String>: Send, Sync, Clone);
static_assertions::assert_impl_all!(RefreshingMemoized<u64, String, String>: Send, Sync, Clone);
