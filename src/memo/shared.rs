//! State shared by every memoized producer variant.
//!
//! The cache and the in-flight map sit behind one `parking_lot` mutex. The
//! lock is only taken for short synchronous sections and never across an
//! `.await`. Checking the cache and registering an in-flight call happen
//! under the same lock acquisition, so two interleaved callers cannot both
//! miss and both start the producer.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared, WeakShared};
use parking_lot::{Mutex, MutexGuard};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::clock::Clock;
use super::config::MemoConfig;
use super::error::{KeyError, RuntimeUnavailable};
use super::key::{CacheKey, KeyResolver};
use super::store::{CacheEntry, CacheStore};

/// The wrapped asynchronous producer.
pub(crate) type Producer<A, V, E> =
    Arc<dyn Fn(A) -> BoxFuture<'static, Result<V, E>> + Send + Sync>;

/// A producer call that several callers can await together.
pub(crate) type SharedCall<V, E> = Shared<BoxFuture<'static, Result<V, E>>>;

/// A running producer call for one key.
///
/// The map holds the call weakly; the tasks awaiting it keep it alive. A call
/// whose tasks were all dropped is abandoned and counts as not running.
pub(crate) struct InFlight<V, E> {
    generation: u64,
    call: WeakShared<BoxFuture<'static, Result<V, E>>>,
}

impl<V, E> InFlight<V, E> {
    fn upgrade(&self) -> Option<SharedCall<V, E>> {
        self.call.upgrade()
    }
}

pub(crate) struct State<V, E> {
    pub(crate) store: CacheStore<V>,
    in_flight: HashMap<CacheKey, InFlight<V, E>>,
    next_generation: u64,
}

impl<V, E> State<V, E> {
    /// Returns `true` if a call for `key` is running and still awaited.
    pub(crate) fn is_running(&self, key: &str) -> bool {
        self.in_flight
            .get(key)
            .is_some_and(|running| running.upgrade().is_some())
    }

    /// Drops abandoned calls and returns how many are still running.
    pub(crate) fn running(&mut self) -> usize {
        self.in_flight.retain(|_, running| running.upgrade().is_some());
        self.in_flight.len()
    }
}

pub(crate) struct Core<A, V, E> {
    producer: Producer<A, V, E>,
    resolver: Arc<dyn KeyResolver<A>>,
    clock: Arc<dyn Clock>,
    config: MemoConfig,
    state: Mutex<State<V, E>>,
}

impl<A, V, E> Core<A, V, E> {
    pub(crate) fn new(
        producer: Producer<A, V, E>,
        resolver: Arc<dyn KeyResolver<A>>,
        clock: Arc<dyn Clock>,
        config: MemoConfig,
    ) -> Self {
        let store = CacheStore::new(config.max_size());
        Self {
            producer,
            resolver,
            clock,
            config,
            state: Mutex::new(State {
                store,
                in_flight: HashMap::new(),
                next_generation: 0,
            }),
        }
    }

    pub(crate) fn key(&self, args: &A) -> Result<CacheKey, KeyError> {
        self.resolver.resolve(args)
    }

    pub(crate) fn now(&self) -> Instant {
        self.clock.now()
    }

    pub(crate) const fn config(&self) -> &MemoConfig {
        &self.config
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, State<V, E>> {
        self.state.lock()
    }

    /// Drops the cached value and any in-flight call for `key`.
    ///
    /// A call that was in flight still settles for its awaiting callers, but
    /// its result is no longer cached. An abandoned call does not count as
    /// dropped.
    pub(crate) fn invalidate(&self, key: &str) -> bool {
        let mut state = self.lock();
        let cached = state.store.remove(key).is_some();
        let running = state
            .in_flight
            .remove(key)
            .is_some_and(|running| running.upgrade().is_some());
        cached || running
    }

    pub(crate) fn clear(&self) {
        let mut state = self.lock();
        state.store.clear();
        state.in_flight.clear();
    }

    pub(crate) fn sweep(&self) -> usize {
        let now = self.now();
        self.lock().store.sweep(now)
    }

    fn store_value(
        state: &mut State<V, E>,
        key: CacheKey,
        value: V,
        now: Instant,
        ttl: Option<Duration>,
    ) {
        state.store.insert(key, CacheEntry::new(value, now, ttl));
    }
}

impl<A, V, E> Core<A, V, E>
where
    A: Send + 'static,
    V: Clone + Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    /// Runs the producer without deduplication, caching a success.
    ///
    /// The producer is invoked when the returned future is first polled.
    pub(crate) fn produce(
        self: &Arc<Self>,
        key: CacheKey,
        args: A,
    ) -> BoxFuture<'static, Result<V, E>> {
        let producer = Arc::clone(&self.producer);
        let core = Arc::downgrade(self);
        async move {
            let value = producer(args).await?;
            if let Some(core) = core.upgrade() {
                let now = core.now();
                let ttl = core.config.ttl();
                Self::store_value(&mut core.lock(), key, value.clone(), now, ttl);
            }
            Ok::<V, E>(value)
        }
        .boxed()
    }

    /// Periodically sweeps expired entries until the handle is dropped or the
    /// memoizer itself is gone.
    pub(crate) fn spawn_sweeper(
        self: &Arc<Self>,
        period: Duration,
    ) -> Result<SweeperHandle, RuntimeUnavailable> {
        let runtime = Handle::try_current().map_err(|_| RuntimeUnavailable)?;
        let core: Weak<Self> = Arc::downgrade(self);
        let period = period.max(Duration::from_millis(1));

        let task = runtime.spawn(async move {
            let mut interval = tokio::time::interval(period);
            // The first tick completes immediately.
            interval.tick().await;
            loop {
                interval.tick().await;
                let Some(core) = core.upgrade() else {
                    break;
                };
                core.sweep();
            }
        });
        Ok(SweeperHandle { task })
    }
}

impl<A, V, E> Core<A, V, E>
where
    A: Send + 'static,
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// Returns the in-flight call for `key`, starting one if none is running.
    ///
    /// Must be called with the state lock held, after the cache check.
    pub(crate) fn join_or_start(
        self: &Arc<Self>,
        state: &mut State<V, E>,
        key: CacheKey,
        args: A,
    ) -> SharedCall<V, E> {
        if let Some(call) = state.in_flight.get(&key).and_then(InFlight::upgrade) {
            tracing::trace!(key = %key, "joined in-flight call");
            return call;
        }
        self.start(state, key, args)
    }

    /// Registers a new in-flight call for `key`, replacing an abandoned one.
    ///
    /// On settlement the entry is removed, and a success is cached, provided
    /// the entry was not invalidated or replaced in the meantime.
    pub(crate) fn start(
        self: &Arc<Self>,
        state: &mut State<V, E>,
        key: CacheKey,
        args: A,
    ) -> SharedCall<V, E> {
        let generation = state.next_generation;
        state.next_generation += 1;

        let producer = Arc::clone(&self.producer);
        let core = Arc::downgrade(self);
        let settle_key = key.clone();
        let call = async move {
            let result = producer(args).await;
            if let Some(core) = core.upgrade() {
                core.settle(settle_key, generation, &result);
            }
            result
        }
        .boxed()
        .shared();

        if let Some(weak) = call.downgrade() {
            state.in_flight.insert(
                key,
                InFlight {
                    generation,
                    call: weak,
                },
            );
        }
        call
    }

    fn settle(&self, key: CacheKey, generation: u64, result: &Result<V, E>) {
        let now = self.now();
        let mut state = self.lock();
        let ours = state
            .in_flight
            .get(&key)
            .is_some_and(|running| running.generation == generation);
        if !ours {
            return;
        }
        state.in_flight.remove(&key);
        match result {
            Ok(value) => {
                Self::store_value(&mut state, key, value.clone(), now, self.config.ttl());
            }
            Err(_) => tracing::debug!(key = %key, "producer failed, nothing cached"),
        }
    }
}

/// Handle to a background sweeper. Dropping it stops the sweeper.
#[derive(Debug)]
pub struct SweeperHandle {
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Returns `true` once the sweeper has stopped.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}
