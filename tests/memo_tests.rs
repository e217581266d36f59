#![cfg(feature = "memo")]
//! Integration tests for the memoized producers.
//!
//! Expiry is driven by a `ManualClock`; producer latency by a paused tokio
//! clock. The two are independent, so a test can hold an entry's age fixed
//! while concurrent callers wait on a slow producer.

use parking_lot::Mutex;
use rstest::{fixture, rstest};
use settle::combinator::all;
use settle::memo::{
    BoundedMemoized, CacheKey, CacheStats, ConfigError, DedupMemoized, KeyError, KeyResolver,
    ManualClock, MemoBuilder, MemoConfig, Memoized, RefreshThreshold, RefreshingMemoized,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

const TTL: Duration = Duration::from_millis(100);

#[fixture]
fn calls() -> Arc<AtomicUsize> {
    Arc::new(AtomicUsize::new(0))
}

#[fixture]
fn clock() -> ManualClock {
    ManualClock::new()
}

fn ttl_config() -> MemoConfig {
    MemoConfig::builder().ttl(TTL).build().unwrap()
}

fn refresh_config() -> MemoConfig {
    MemoConfig::builder()
        .ttl(TTL)
        .refresh_threshold(RefreshThreshold::Fraction(0.5))
        .build()
        .unwrap()
}

/// Returns the number of the invocation, counting from one.
fn counting(
    calls: &Arc<AtomicUsize>,
) -> impl Fn(u64) -> futures::future::Ready<Result<usize, String>> + Send + Sync + 'static {
    let counter = Arc::clone(calls);
    move |_id: u64| futures::future::ready(Ok(counter.fetch_add(1, Ordering::SeqCst) + 1))
}

/// Succeeds on the first invocation and fails on every later one.
fn succeeds_once(
    calls: &Arc<AtomicUsize>,
) -> impl Fn(u64) -> futures::future::Ready<Result<usize, String>> + Send + Sync + 'static {
    let counter = Arc::clone(calls);
    move |_id: u64| {
        let invocation = counter.fetch_add(1, Ordering::SeqCst) + 1;
        let result = if invocation == 1 {
            Ok(invocation)
        } else {
            Err(format!("down {invocation}"))
        };
        futures::future::ready(result)
    }
}

async fn until_idle(memo: &RefreshingMemoized<u64, usize, String>) {
    while memo.in_flight() > 0 {
        tokio::task::yield_now().await;
    }
}

// =============================================================================
// Memoized
// =============================================================================

#[rstest]
#[tokio::test]
async fn test_memoized_invokes_the_producer_once_per_key(calls: Arc<AtomicUsize>) {
    let memo = Memoized::new(counting(&calls));

    assert_eq!(memo.call(1).unwrap().await, Ok(1));
    assert_eq!(memo.call(1).unwrap().await, Ok(1));
    assert_eq!(memo.call(2).unwrap().await, Ok(2));

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(
        memo.stats(),
        CacheStats {
            hits: 1,
            misses: 2,
            evictions: 0,
        }
    );
}

#[rstest]
#[tokio::test]
async fn test_memoized_hit_is_a_settled_task(calls: Arc<AtomicUsize>) {
    let memo = Memoized::new(counting(&calls));
    memo.call(3).unwrap().await.unwrap();

    let hit = memo.call(3).unwrap();

    assert!(hit.is_settled());
}

#[rstest]
#[tokio::test]
async fn test_memoized_does_not_invoke_the_producer_until_polled(calls: Arc<AtomicUsize>) {
    let memo = Memoized::new(counting(&calls));

    let task = memo.call(1).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    assert_eq!(task.await, Ok(1));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[rstest]
#[tokio::test]
async fn test_memoized_never_caches_failures(calls: Arc<AtomicUsize>) {
    let counter = Arc::clone(&calls);
    let memo = Memoized::new(move |id: u64| {
        let invocation = counter.fetch_add(1, Ordering::SeqCst) + 1;
        async move {
            if invocation == 1 {
                Err(format!("cold start for {id}"))
            } else {
                Ok(invocation)
            }
        }
    });

    assert_eq!(memo.call(9).unwrap().await, Err("cold start for 9".to_string()));
    assert!(memo.is_empty());
    assert_eq!(memo.call(9).unwrap().await, Ok(2));
    assert_eq!(memo.call(9).unwrap().await, Ok(2));
}

#[rstest]
#[tokio::test]
async fn test_memoized_ignores_the_clock(calls: Arc<AtomicUsize>, clock: ManualClock) {
    let memo = MemoBuilder::new(counting(&calls))
        .clock(clock.clone())
        .config(ttl_config())
        .basic();

    memo.call(1).unwrap().await.unwrap();
    clock.advance(Duration::from_secs(3_600));

    assert_eq!(memo.call(1).unwrap().await, Ok(1));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[rstest]
#[tokio::test]
async fn test_memoized_clones_share_one_cache(calls: Arc<AtomicUsize>) {
    let memo = Memoized::new(counting(&calls));
    let other = memo.clone();

    memo.call(4).unwrap().await.unwrap();

    assert_eq!(other.call(4).unwrap().await, Ok(1));
    assert_eq!(other.len(), 1);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[rstest]
#[tokio::test]
async fn test_structurally_equal_arguments_share_an_entry() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let memo = Memoized::new(move |(user, page): (String, u32)| {
        counter.fetch_add(1, Ordering::SeqCst);
        async move { Ok::<_, ()>(format!("{user}:{page}")) }
    });

    let first = memo.call(("ada".to_string(), 2)).unwrap().await;
    let second = memo.call(("ada".to_string(), 2)).unwrap().await;

    assert_eq!(first, second);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[rstest]
#[tokio::test]
async fn test_invalidate_forces_a_new_invocation(calls: Arc<AtomicUsize>) {
    let memo = Memoized::new(counting(&calls));
    memo.call(1).unwrap().await.unwrap();

    assert_eq!(memo.invalidate(&1), Ok(true));
    assert_eq!(memo.invalidate(&1), Ok(false));
    assert_eq!(memo.contains(&1), Ok(false));
    assert_eq!(memo.call(1).unwrap().await, Ok(2));
}

#[rstest]
#[tokio::test]
async fn test_clear_forgets_every_entry(calls: Arc<AtomicUsize>) {
    let memo = Memoized::new(counting(&calls));
    for id in 0..3 {
        memo.call(id).unwrap().await.unwrap();
    }

    memo.clear();

    assert!(memo.is_empty());
}

// =============================================================================
// Key Derivation
// =============================================================================

#[rstest]
fn test_unserializable_arguments_fail_synchronously() {
    let memo = Memoized::new(|_: HashMap<Vec<u8>, u8>| async { Ok::<_, ()>(()) });
    let arguments = HashMap::from([(vec![1, 2], 3)]);

    let error = memo.call(arguments).unwrap_err();

    assert!(error.to_string().starts_with("cannot derive cache key"));
}

struct RequireNonZero;

impl KeyResolver<u64> for RequireNonZero {
    fn resolve(&self, args: &u64) -> Result<CacheKey, KeyError> {
        if *args == 0 {
            Err(KeyError::new("zero is not a valid id"))
        } else {
            Ok(format!("id:{args}"))
        }
    }
}

#[rstest]
#[tokio::test]
async fn test_custom_key_resolver_errors_prevent_the_call(calls: Arc<AtomicUsize>) {
    let memo = MemoBuilder::with_key_resolver(counting(&calls), RequireNonZero).bounded();

    let error = memo.call(0).unwrap_err();

    assert_eq!(error.message(), "zero is not a valid id");
    assert_eq!(memo.contains(&0).unwrap_err(), error);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(memo.call(5).unwrap().await, Ok(1));
}

#[rstest]
#[tokio::test]
async fn test_key_fn_buckets_arguments(calls: Arc<AtomicUsize>) {
    let memo = MemoBuilder::new(counting(&calls))
        .key_fn(|id: &u64| (id % 10).to_string())
        .bounded();

    assert_eq!(memo.call(3).unwrap().await, Ok(1));
    assert_eq!(memo.call(13).unwrap().await, Ok(1));
    assert_eq!(memo.call(4).unwrap().await, Ok(2));
}

// =============================================================================
// BoundedMemoized
// =============================================================================

#[rstest]
#[tokio::test]
async fn test_bounded_reinvokes_after_ttl(calls: Arc<AtomicUsize>, clock: ManualClock) {
    let memo = MemoBuilder::new(counting(&calls))
        .clock(clock.clone())
        .config(ttl_config())
        .bounded();

    assert_eq!(memo.call(1).unwrap().await, Ok(1));
    clock.advance(TTL);
    assert_eq!(memo.call(1).unwrap().await, Ok(1));
    clock.advance(Duration::from_millis(1));
    assert_eq!(memo.call(1).unwrap().await, Ok(2));

    let stats = memo.stats();
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 2);
    assert_eq!(stats.evictions, 1);
}

#[rstest]
#[tokio::test]
async fn test_unrepresentable_ttl_keeps_entries_forever(
    calls: Arc<AtomicUsize>,
    clock: ManualClock,
) {
    let config = MemoConfig::builder().ttl(Duration::MAX).build().unwrap();
    let memo = MemoBuilder::new(counting(&calls))
        .clock(clock.clone())
        .config(config)
        .bounded();

    assert_eq!(memo.call(1).unwrap().await, Ok(1));
    clock.advance(Duration::from_secs(1_000_000));

    let hit = memo.call(1).unwrap();
    assert!(hit.is_settled());
    assert_eq!(hit.await, Ok(1));
    assert_eq!(memo.sweep(), 0);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[rstest]
#[tokio::test]
async fn test_bounded_evicts_the_least_recently_used_entry(calls: Arc<AtomicUsize>) {
    let config = MemoConfig::builder().max_size(2).build().unwrap();
    let memo = BoundedMemoized::new(counting(&calls), config);

    memo.call(1).unwrap().await.unwrap();
    memo.call(2).unwrap().await.unwrap();
    memo.call(1).unwrap().await.unwrap();
    memo.call(3).unwrap().await.unwrap();

    assert_eq!(memo.len(), 2);
    assert_eq!(memo.contains(&1), Ok(true));
    assert_eq!(memo.contains(&2), Ok(false));
    assert_eq!(memo.contains(&3), Ok(true));
    assert_eq!(memo.stats().evictions, 1);
}

#[rstest]
#[tokio::test]
async fn test_sweep_discards_only_expired_entries(calls: Arc<AtomicUsize>, clock: ManualClock) {
    let memo = MemoBuilder::new(counting(&calls))
        .clock(clock.clone())
        .config(ttl_config())
        .bounded();

    memo.call(1).unwrap().await.unwrap();
    memo.call(2).unwrap().await.unwrap();
    clock.advance(Duration::from_millis(60));
    memo.call(3).unwrap().await.unwrap();
    clock.advance(Duration::from_millis(60));

    assert_eq!(memo.sweep(), 2);
    assert_eq!(memo.len(), 1);
    assert_eq!(memo.contains(&3), Ok(true));
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn test_spawned_sweeper_runs_periodically(calls: Arc<AtomicUsize>, clock: ManualClock) {
    let memo = MemoBuilder::new(counting(&calls))
        .clock(clock.clone())
        .config(ttl_config())
        .bounded();
    let sweeper = memo.spawn_sweeper(Duration::from_secs(1)).unwrap();

    memo.call(1).unwrap().await.unwrap();
    clock.advance(Duration::from_secs(1));
    tokio::time::sleep(Duration::from_millis(1_500)).await;

    assert!(memo.is_empty());
    assert!(!sweeper.is_finished());
}

#[rstest]
fn test_spawn_sweeper_outside_a_runtime_fails(calls: Arc<AtomicUsize>) {
    let memo = BoundedMemoized::new(counting(&calls), ttl_config());
    assert!(memo.spawn_sweeper(Duration::from_secs(1)).is_err());
}

// =============================================================================
// DedupMemoized
// =============================================================================

#[rstest]
#[tokio::test(start_paused = true)]
async fn test_dedup_collapses_concurrent_calls(calls: Arc<AtomicUsize>) {
    let counter = Arc::clone(&calls);
    let memo = DedupMemoized::new(
        move |id: u32| {
            counter.fetch_add(1, Ordering::SeqCst);
            async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                Ok::<_, String>(id * 10)
            }
        },
        MemoConfig::default(),
    );

    let tasks: Vec<_> = (0..5).map(|_| memo.call(7).unwrap()).collect();
    assert_eq!(memo.in_flight(), 1);

    assert_eq!(all(tasks).await, Ok(vec![70; 5]));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(memo.in_flight(), 0);
    assert!(memo.call(7).unwrap().is_settled());
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn test_dedup_shares_a_failure_and_retries_afterwards(calls: Arc<AtomicUsize>) {
    let counter = Arc::clone(&calls);
    let memo = DedupMemoized::new(
        move |_: u32| {
            let invocation = counter.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                if invocation == 1 {
                    Err("unavailable".to_string())
                } else {
                    Ok(invocation)
                }
            }
        },
        MemoConfig::default(),
    );

    let first = memo.call(1).unwrap();
    let second = memo.call(1).unwrap();
    let (first, second) = futures::join!(first, second);

    assert_eq!(first, Err("unavailable".to_string()));
    assert_eq!(second, first);
    assert!(memo.is_empty());
    assert_eq!(memo.call(1).unwrap().await, Ok(2));
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn test_dedup_distinct_keys_run_independently(calls: Arc<AtomicUsize>) {
    let memo = DedupMemoized::new(counting(&calls), MemoConfig::default());

    let tasks = vec![memo.call(1).unwrap(), memo.call(2).unwrap()];
    assert_eq!(memo.in_flight(), 2);

    let mut values = all(tasks).await.unwrap();
    values.sort_unstable();
    assert_eq!(values, vec![1, 2]);
}

#[rstest]
#[tokio::test]
async fn test_invalidated_in_flight_call_is_not_cached(calls: Arc<AtomicUsize>) {
    let memo = DedupMemoized::new(counting(&calls), MemoConfig::default());

    let task = memo.call(1).unwrap();
    assert_eq!(memo.invalidate(&1), Ok(true));

    assert_eq!(task.await, Ok(1));
    assert!(memo.is_empty());
    assert_eq!(memo.in_flight(), 0);
}

#[rstest]
#[tokio::test]
async fn test_abandoned_call_is_not_counted_in_flight(calls: Arc<AtomicUsize>) {
    let memo = DedupMemoized::new(counting(&calls), MemoConfig::default());

    drop(memo.call(1).unwrap());
    assert_eq!(memo.in_flight(), 0);
    assert_eq!(memo.invalidate(&1), Ok(false));

    let task = memo.call(1).unwrap();
    assert_eq!(memo.in_flight(), 1);
    assert_eq!(task.await, Ok(1));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(memo.in_flight(), 0);
}

#[rstest]
#[tokio::test]
async fn test_dedup_reinvokes_after_ttl(calls: Arc<AtomicUsize>, clock: ManualClock) {
    let memo = MemoBuilder::new(counting(&calls))
        .clock(clock.clone())
        .config(ttl_config())
        .dedup();

    memo.call(1).unwrap().await.unwrap();
    clock.advance(TTL + Duration::from_millis(1));

    assert_eq!(memo.call(1).unwrap().await, Ok(2));
}

// =============================================================================
// RefreshingMemoized
// =============================================================================

#[rstest]
#[tokio::test]
async fn test_refreshing_serves_stale_while_refreshing_once(
    calls: Arc<AtomicUsize>,
    clock: ManualClock,
) {
    let memo = MemoBuilder::new(counting(&calls))
        .clock(clock.clone())
        .config(refresh_config())
        .refreshing();

    assert_eq!(memo.call(1).unwrap().await, Ok(1));
    clock.advance(Duration::from_millis(60));

    assert_eq!(memo.call(1).unwrap().await, Ok(1));
    assert_eq!(memo.in_flight(), 1);
    assert_eq!(memo.call(1).unwrap().await, Ok(1));
    assert_eq!(memo.in_flight(), 1);

    until_idle(&memo).await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(memo.call(1).unwrap().await, Ok(2));
    assert_eq!(memo.in_flight(), 0);
}

#[rstest]
#[tokio::test]
async fn test_refreshing_does_not_refresh_before_the_threshold(
    calls: Arc<AtomicUsize>,
    clock: ManualClock,
) {
    let memo = MemoBuilder::new(counting(&calls))
        .clock(clock.clone())
        .config(refresh_config())
        .refreshing();

    memo.call(1).unwrap().await.unwrap();
    clock.advance(Duration::from_millis(50));

    assert_eq!(memo.call(1).unwrap().await, Ok(1));
    assert_eq!(memo.in_flight(), 0);
}

#[rstest]
#[tokio::test]
async fn test_failed_refresh_keeps_the_value_and_reports_it(
    calls: Arc<AtomicUsize>,
    clock: ManualClock,
) {
    let failures: Arc<Mutex<Vec<(String, String)>>> = Arc::default();
    let sink = Arc::clone(&failures);
    let memo = MemoBuilder::new(succeeds_once(&calls))
        .clock(clock.clone())
        .config(refresh_config())
        .on_refresh_error(move |key, reason: &String| {
            sink.lock().push((key.to_string(), reason.clone()));
        })
        .refreshing();

    assert_eq!(memo.call(1).unwrap().await, Ok(1));
    clock.advance(Duration::from_millis(75));
    assert_eq!(memo.call(1).unwrap().await, Ok(1));
    until_idle(&memo).await;

    assert_eq!(
        failures.lock().as_slice(),
        &[("1".to_string(), "down 2".to_string())]
    );
    assert_eq!(memo.contains(&1), Ok(true));
    assert_eq!(memo.call(1).unwrap().await, Ok(1));
}

#[rstest]
#[tokio::test]
async fn test_failure_after_expiry_falls_back_to_the_stale_value(
    calls: Arc<AtomicUsize>,
    clock: ManualClock,
) {
    let memo = MemoBuilder::new(succeeds_once(&calls))
        .clock(clock.clone())
        .config(refresh_config())
        .refreshing();

    assert_eq!(memo.call(1).unwrap().await, Ok(1));
    clock.advance(Duration::from_millis(150));

    assert_eq!(memo.call(1).unwrap().await, Ok(1));
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    assert_eq!(memo.sweep(), 1);
    assert_eq!(memo.call(1).unwrap().await, Err("down 3".to_string()));
}

#[rstest]
#[tokio::test]
async fn test_fallback_swept_during_flight_is_not_served(
    calls: Arc<AtomicUsize>,
    clock: ManualClock,
) {
    let memo = MemoBuilder::new(succeeds_once(&calls))
        .clock(clock.clone())
        .config(refresh_config())
        .refreshing();

    assert_eq!(memo.call(1).unwrap().await, Ok(1));
    clock.advance(Duration::from_millis(150));

    let task = memo.call(1).unwrap();
    assert_eq!(memo.sweep(), 1);

    assert_eq!(task.await, Err("down 2".to_string()));
    assert!(memo.is_empty());
}

#[rstest]
#[tokio::test]
async fn test_fallback_invalidated_during_flight_is_not_served(
    calls: Arc<AtomicUsize>,
    clock: ManualClock,
) {
    let memo = MemoBuilder::new(succeeds_once(&calls))
        .clock(clock.clone())
        .config(refresh_config())
        .refreshing();

    assert_eq!(memo.call(1).unwrap().await, Ok(1));
    clock.advance(Duration::from_millis(150));

    let task = memo.call(1).unwrap();
    assert_eq!(memo.invalidate(&1), Ok(true));

    assert_eq!(task.await, Err("down 2".to_string()));
    assert_eq!(memo.contains(&1), Ok(false));
}

#[rstest]
#[tokio::test]
async fn test_failure_without_a_prior_value_is_reported(calls: Arc<AtomicUsize>) {
    let failing = succeeds_once(&calls);
    failing(0).await.unwrap();
    let memo = RefreshingMemoized::new(failing, refresh_config());

    assert_eq!(memo.call(1).unwrap().await, Err("down 2".to_string()));
    assert!(memo.is_empty());
}

#[rstest]
#[tokio::test]
async fn test_expired_value_is_replaced_on_success(calls: Arc<AtomicUsize>, clock: ManualClock) {
    let memo = MemoBuilder::new(counting(&calls))
        .clock(clock.clone())
        .config(refresh_config())
        .refreshing();

    memo.call(1).unwrap().await.unwrap();
    clock.advance(Duration::from_millis(250));

    assert_eq!(memo.call(1).unwrap().await, Ok(2));
    assert_eq!(memo.in_flight(), 0);
}

#[rstest]
fn test_refreshing_outside_a_runtime_serves_stale_without_refreshing(
    calls: Arc<AtomicUsize>,
    clock: ManualClock,
) {
    let memo = MemoBuilder::new(counting(&calls))
        .clock(clock.clone())
        .config(refresh_config())
        .refreshing();

    futures::executor::block_on(async {
        memo.call(1).unwrap().await.unwrap();
        clock.advance(Duration::from_millis(60));

        assert_eq!(memo.call(1).unwrap().await, Ok(1));
        assert_eq!(memo.in_flight(), 0);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    });
}

// =============================================================================
// Configuration
// =============================================================================

#[rstest]
#[case::zero_ttl(MemoConfig::builder().ttl(Duration::ZERO), ConfigError::ZeroTtl)]
#[case::zero_size(MemoConfig::builder().max_size(0), ConfigError::ZeroMaxSize)]
#[case::refresh_without_ttl(
    MemoConfig::builder().refresh_threshold(RefreshThreshold::Fraction(0.5)),
    ConfigError::RefreshWithoutTtl
)]
#[case::offset_beyond_ttl(
    MemoConfig::builder().ttl(TTL).refresh_threshold(RefreshThreshold::After(TTL)),
    ConfigError::RefreshOffsetNotBelowTtl { offset: TTL, ttl: TTL }
)]
fn test_invalid_configurations_are_rejected(
    #[case] builder: settle::memo::MemoConfigBuilder,
    #[case] expected: ConfigError,
) {
    assert_eq!(builder.build(), Err(expected));
}

#[rstest]
fn test_debug_output_names_the_variant(calls: Arc<AtomicUsize>) {
    let memo = DedupMemoized::new(counting(&calls), ttl_config());
    let rendered = format!("{memo:?}");

    assert!(rendered.starts_with("DedupMemoized"));
    assert!(rendered.contains("len: 0"));
}
