use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use super::MemoBuilder;
use super::config::MemoConfig;
use super::shared::{Core, SweeperHandle};
use super::error::{KeyError, RuntimeUnavailable};
use super::store::Lookup;
use crate::task::Task;

/// A cache with per-entry ttl and a least-recently-used size bound.
///
/// - An entry expires once strictly more than the ttl has passed since it
///   was produced. Expired entries count as misses and are evicted when next
///   read, or by [`sweep`](Self::sweep).
/// - When storing a new key would exceed `max_size`, the least recently read
///   or written entry is evicted first.
/// - Failures are never cached.
///
/// Concurrent misses for one key are not collapsed; see
/// [`DedupMemoized`](super::DedupMemoized).
///
/// # Examples
///
/// ```rust
/// use settle::memo::{BoundedMemoized, MemoConfig};
/// use std::time::Duration;
///
/// # futures::executor::block_on(async {
/// let config = MemoConfig::builder()
///     .ttl(Duration::from_secs(30))
///     .max_size(2)
///     .build()
///     .unwrap();
/// let lengths = BoundedMemoized::new(|word: String| async move { Ok::<_, ()>(word.len()) }, config);
///
/// assert_eq!(lengths.call("tide".into()).unwrap().await, Ok(4));
/// assert_eq!(lengths.len(), 1);
/// # });
/// ```
pub struct BoundedMemoized<A, V, E> {
    core: Arc<Core<A, V, E>>,
}

impl<A, V, E> BoundedMemoized<A, V, E>
where
    A: Send + 'static,
    V: Clone + Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    /// Memoizes `producer` under `config`, keying calls by their JSON
    /// serialization.
    pub fn new<F, Fut>(producer: F, config: MemoConfig) -> Self
    where
        A: Serialize,
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        MemoBuilder::new(producer).config(config).bounded()
    }

    pub(crate) const fn from_core(core: Arc<Core<A, V, E>>) -> Self {
        Self { core }
    }

    /// Returns the live cached value for `args`, or runs the producer.
    ///
    /// The producer is invoked when the returned task is first polled.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError`] if no cache key can be derived from `args`.
    pub fn call(&self, args: A) -> Result<Task<V, E>, KeyError> {
        let key = self.core.key(&args)?;
        let now = self.core.now();
        {
            let mut state = self.core.lock();
            match state.store.lookup(&key, now) {
                Lookup::Fresh { value, .. } => {
                    state.store.record_hit();
                    tracing::trace!(key = %key, "cache hit");
                    return Ok(Task::fulfilled(value));
                }
                Lookup::Expired { .. } => state.store.evict(&key),
                Lookup::Missing => {}
            }
            state.store.record_miss();
        }
        tracing::trace!(key = %key, "cache miss");
        Ok(Task::from_future(self.core.produce(key, args)))
    }

    /// Evicts every expired entry and returns how many were removed.
    pub fn sweep(&self) -> usize {
        self.core.sweep()
    }

    /// Sweeps expired entries every `period` on the current tokio runtime.
    ///
    /// The sweeper stops when the returned handle is dropped.
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

impl_cache_handle!(BoundedMemoized);
