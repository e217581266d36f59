use std::future::Future;
use std::sync::Arc;

use serde::Serialize;

use super::MemoBuilder;
use super::shared::Core;
use super::error::KeyError;
use super::store::Lookup;
use crate::task::Task;

/// An unconditional cache in front of an asynchronous producer.
///
/// The first successful result for a key is kept forever. Failures are not
/// cached, so the next call retries the producer. Concurrent calls with the
/// same key that arrive before the first result lands each invoke the
/// producer; use [`DedupMemoized`](super::DedupMemoized) to collapse them.
///
/// Clones share the same cache.
///
/// # Examples
///
/// ```rust
/// use settle::memo::Memoized;
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicUsize, Ordering};
///
/// # futures::executor::block_on(async {
/// let calls = Arc::new(AtomicUsize::new(0));
/// let counter = Arc::clone(&calls);
/// let square = Memoized::new(move |n: u64| {
///     counter.fetch_add(1, Ordering::SeqCst);
///     async move { Ok::<_, String>(n * n) }
/// });
///
/// assert_eq!(square.call(4).unwrap().await, Ok(16));
/// assert_eq!(square.call(4).unwrap().await, Ok(16));
/// assert_eq!(calls.load(Ordering::SeqCst), 1);
/// # });
/// ```
pub struct Memoized<A, V, E> {
    core: Arc<Core<A, V, E>>,
}

impl<A, V, E> Memoized<A, V, E>
where
    A: Send + 'static,
    V: Clone + Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    /// Memoizes `producer`, keying calls by their JSON serialization.
    pub fn new<F, Fut>(producer: F) -> Self
    where
        A: Serialize,
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        MemoBuilder::new(producer).basic()
    }

    pub(crate) const fn from_core(core: Arc<Core<A, V, E>>) -> Self {
        Self { core }
    }

    /// Returns the cached value for `args`, or runs the producer.
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
            if let Lookup::Fresh { value, .. } = state.store.lookup(&key, now) {
                state.store.record_hit();
                tracing::trace!(key = %key, "cache hit");
                return Ok(Task::fulfilled(value));
            }
            state.store.record_miss();
        }
        tracing::trace!(key = %key, "cache miss");
        Ok(Task::from_future(self.core.produce(key, args)))
    }
}

impl_cache_handle!(Memoized);
