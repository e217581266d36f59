use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::runtime::Handle;

use super::MemoBuilder;
use super::config::MemoConfig;
use super::shared::{Core, State, SweeperHandle};
use super::error::{KeyError, RuntimeUnavailable};
use super::key::CacheKey;
use super::store::Lookup;
use crate::task::Task;

/// Callback receiving the key and reason of a failed background refresh.
pub type RefreshErrorHook<E> = Arc<dyn Fn(&str, &E) + Send + Sync>;

/// A deduplicating cache that serves stale values while refreshing them.
///
/// With a ttl `T` and a refresh threshold `R < T`, a call for a key whose
/// entry has age `a`:
///
/// | Age | Result | Producer |
/// |-----|--------|----------|
/// | `a <= R` | cached value | not invoked |
/// | `R < a <= T` | cached value, immediately | one background refresh |
/// | `a > T` | awaits the producer | invoked in the caller's path |
/// | no entry | awaits the producer | invoked in the caller's path |
///
/// At most one producer call per key is in flight at a time, whether it is a
/// background refresh or a caller-path call, so hits during a refresh do not
/// start another one.
///
/// # Failures
///
/// - A failed background refresh keeps the existing value. The failure is
///   logged with `tracing::warn!` and passed to the hook set through
///   [`MemoBuilder::on_refresh_error`]; callers never see it.
/// - A failed caller-path call after expiry returns the value the cache
///   holds for the key when the failure arrives. The caller sees the error
///   if no value is held by then, because the key never had one or it was
///   invalidated, cleared or swept while the call was in flight.
///
/// Expired entries are kept as fallbacks rather than evicted on read. They
/// still count towards `max_size`, and [`sweep`](Self::sweep) discards them.
///
/// Background refreshes are spawned on the current tokio runtime; outside
/// one, eligible hits are served without refreshing.
pub struct RefreshingMemoized<A, V, E> {
    core: Arc<Core<A, V, E>>,
    on_refresh_error: Option<RefreshErrorHook<E>>,
}

impl<A, V, E> RefreshingMemoized<A, V, E>
where
    A: Send + 'static,
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// Memoizes `producer` under `config`, keying calls by their JSON
    /// serialization.
    pub fn new<F, Fut>(producer: F, config: MemoConfig) -> Self
    where
        A: Serialize,
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        MemoBuilder::new(producer).config(config).refreshing()
    }

    pub(crate) const fn from_core(
        core: Arc<Core<A, V, E>>,
        on_refresh_error: Option<RefreshErrorHook<E>>,
    ) -> Self {
        Self {
            core,
            on_refresh_error,
        }
    }

    /// Returns the cached value for `args`, refreshing it in the background
    /// when it is past the refresh threshold, or awaits the producer when
    /// there is no live value.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError`] if no cache key can be derived from `args`.
    pub fn call(&self, args: A) -> Result<Task<V, E>, KeyError> {
        let key = self.core.key(&args)?;
        let now = self.core.now();
        let mut state = self.core.lock();

        match state.store.lookup(&key, now) {
            Lookup::Fresh { value, age } => {
                state.store.record_hit();
                let due = self
                    .core
                    .config()
                    .refresh_after()
                    .is_some_and(|refresh_after| age > refresh_after);
                if due {
                    self.refresh_in_background(&mut state, key, args);
                } else {
                    tracing::trace!(key = %key, "cache hit");
                }
                return Ok(Task::fulfilled(value));
            }
            Lookup::Expired { .. } | Lookup::Missing => {}
        }
        state.store.record_miss();

        let call = self.core.join_or_start(&mut state, key.clone(), args);
        drop(state);

        let core = Arc::downgrade(&self.core);
        Ok(Task::from_future(async move {
            let reason = match call.await {
                Ok(value) => return Ok(value),
                Err(reason) => reason,
            };
            // Whatever the cache holds now, not what it held when the call began.
            let stale = core.upgrade().and_then(|core| {
                let state = core.lock();
                state.store.peek(&key).cloned()
            });
            match stale {
                Some(stale) => {
                    tracing::warn!(key = %key, "producer failed after expiry, serving stale value");
                    Ok(stale)
                }
                None => Err(reason),
            }
        }))
    }

    fn refresh_in_background(&self, state: &mut State<V, E>, key: CacheKey, args: A) {
        if state.is_running(&key) {
            tracing::trace!(key = %key, "refresh already in flight");
            return;
        }
        let Ok(runtime) = Handle::try_current() else {
            tracing::warn!(key = %key, "no tokio runtime, serving stale value without refresh");
            return;
        };

        tracing::debug!(key = %key, "refreshing in background");
        let call = self.core.start(state, key.clone(), args);
        let hook = self.on_refresh_error.clone();
        runtime.spawn(async move {
            if let Err(reason) = call.await {
                tracing::warn!(key = %key, "background refresh failed, keeping stale value");
                if let Some(hook) = hook {
                    hook(&key, &reason);
                }
            }
        });
    }

    /// Number of producer calls currently in flight, background refreshes
    /// included.
    pub fn in_flight(&self) -> usize {
        self.core.lock().running()
    }

    /// Discards every expired entry, including fallback values, and returns
    /// how many were removed.
    pub fn sweep(&self) -> usize {
        self.core.sweep()
    }

    /// Sweeps expired entries every `period` on the current tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeUnavailable`] outside of a tokio runtime.
    pub fn spawn_sweeper(&self, period: Duration) -> Result<SweeperHandle, RuntimeUnavailable> {
        self.core.spawn_sweeper(period)
    }

    /// The configuration in effect.
    pub fn config(&self) -> &MemoConfig {
        self.core.config()
    }
}

impl_cache_handle!(RefreshingMemoized, on_refresh_error);
