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

/// A ttl/LRU cache that also collapses concurrent calls for the same key.
///
/// While a producer call for a key is in flight, further calls for that key
/// await the same shared result instead of invoking the producer again. The
/// in-flight entry is removed as soon as the call settles: a success is
/// cached, a failure is not, and the next call after a failure starts a
/// fresh producer invocation.
///
/// Values and reasons are cloned to every waiting caller, hence the `Clone`
/// bounds.
///
/// # Examples
///
/// ```rust
/// use settle::memo::{DedupMemoized, MemoConfig};
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicUsize, Ordering};
///
/// # futures::executor::block_on(async {
/// let calls = Arc::new(AtomicUsize::new(0));
/// let counter = Arc::clone(&calls);
/// let lookup = DedupMemoized::new(
///     move |id: u32| {
///         counter.fetch_add(1, Ordering::SeqCst);
///         async move { Ok::<_, String>(format!("user-{id}")) }
///     },
///     MemoConfig::default(),
/// );
///
/// let first = lookup.call(1).unwrap();
/// let second = lookup.call(1).unwrap();
/// assert_eq!(lookup.in_flight(), 1);
///
/// let (first, second) = futures::join!(first, second);
/// assert_eq!(first, second);
/// assert_eq!(calls.load(Ordering::SeqCst), 1);
/// # });
/// ```
pub struct DedupMemoized<A, V, E> {
    core: Arc<Core<A, V, E>>,
}

impl<A, V, E> DedupMemoized<A, V, E>
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
        MemoBuilder::new(producer).config(config).dedup()
    }

    pub(crate) const fn from_core(core: Arc<Core<A, V, E>>) -> Self {
        Self { core }
    }

    /// Returns the live cached value for `args`, joins the call already in
    /// flight for the same key, or starts the producer.
    ///
    /// A started producer runs when any of the tasks sharing it is first
    /// polled.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError`] if no cache key can be derived from `args`.
    pub fn call(&self, args: A) -> Result<Task<V, E>, KeyError> {
        let key = self.core.key(&args)?;
        let now = self.core.now();
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

        let call = self.core.join_or_start(&mut state, key, args);
        drop(state);
        Ok(Task::from_future(call))
    }

    /// Number of producer calls currently in flight.
    ///
    /// A call whose tasks were all dropped before it settled is abandoned and
    /// not counted; the next call for its key starts a fresh one.
    pub fn in_flight(&self) -> usize {
        self.core.lock().running()
    }

    /// Evicts every expired entry and returns how many were removed.
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

impl_cache_handle!(DedupMemoized);
