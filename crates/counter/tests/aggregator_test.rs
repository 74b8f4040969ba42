//! Tests for the parallel count aggregator.
//!
//! # Test Strategy
//!
//! 1. **Aggregation**: Known per-range counts sum to the known total
//! 2. **Failure**: Any failed range fails the count, never a partial sum
//! 3. **Scheduling**: Worker bound, dispatch stop after failure, completion order
//! 4. **End to end**: In-memory tables over the whole ring

use async_trait::async_trait;
use corelib::{ConsistencyLevel, TokenRange};
use counter::{
    CountConfig, CountError, CountStatement, MemoryExecutor, ParallelCountAggregator,
    QueryError, QueryExecutor,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// Scripted Executor
// ============================================================================

#[derive(Clone)]
enum Reply {
    Count(i64),
    Fail(QueryError),
    Panic,
}

/// Executor whose answers are keyed by the start token of the queried range.
#[derive(Default)]
struct ScriptedExecutor {
    partition_key: Vec<String>,
    replies: HashMap<i64, Reply>,
    delays: HashMap<i64, Duration>,
    resolves: AtomicUsize,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    seen: Mutex<Vec<(TokenRange, ConsistencyLevel)>>,
}

impl ScriptedExecutor {
    fn new() -> Self {
        Self {
            partition_key: vec!["id".to_string()],
            ..Self::default()
        }
    }

    fn reply(mut self, start: i64, reply: Reply) -> Self {
        self.replies.insert(start, reply);
        self
    }

    fn delay(mut self, start: i64, delay: Duration) -> Self {
        self.delays.insert(start, delay);
        self
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QueryExecutor for ScriptedExecutor {
    async fn partition_key_columns(
        &self,
        _keyspace: &str,
        _table: &str,
    ) -> Result<Vec<String>, QueryError> {
        self.resolves.fetch_add(1, Ordering::SeqCst);
        Ok(self.partition_key.clone())
    }

    async fn execute_count(
        &self,
        _statement: &CountStatement,
        range: TokenRange,
        consistency: ConsistencyLevel,
    ) -> Result<i64, QueryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.seen.lock().push((range, consistency));

        if let Some(delay) = self.delays.get(&range.start) {
            tokio::time::sleep(*delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match self.replies.get(&range.start).cloned() {
            Some(Reply::Count(count)) => Ok(count),
            Some(Reply::Fail(error)) => Err(error),
            Some(Reply::Panic) => panic!("scripted panic for {range}"),
            None => Ok(0),
        }
    }
}

/// One single-token range per token of `[0, tokens)`.
fn per_token_config(tokens: usize, workers: usize) -> CountConfig {
    CountConfig::new("ks", "t")
        .with_segments(tokens)
        .with_sub_segments(1)
        .with_workers(workers)
}

fn per_token_range(tokens: usize) -> TokenRange {
    TokenRange::new(0, tokens as i64 - 1).unwrap()
}

// ============================================================================
// Aggregation
// ============================================================================

#[tokio::test]
async fn test_sums_segment_counts() {
    let executor = ScriptedExecutor::new()
        .reply(0, Reply::Count(10))
        .reply(1, Reply::Count(0))
        .reply(2, Reply::Count(7));
    let aggregator = ParallelCountAggregator::new(Arc::new(executor), per_token_config(3, 3))
        .await
        .unwrap();

    let total = aggregator.count_range(per_token_range(3)).await.unwrap();
    assert_eq!(total, 17);
}

#[tokio::test]
async fn test_completion_order_does_not_matter() {
    for workers in 1..=4 {
        // Earlier ranges finish last.
        let executor = ScriptedExecutor::new()
            .reply(0, Reply::Count(5))
            .reply(1, Reply::Count(11))
            .reply(2, Reply::Count(3))
            .reply(3, Reply::Count(1))
            .delay(0, Duration::from_millis(40))
            .delay(1, Duration::from_millis(20))
            .delay(2, Duration::from_millis(10));
        let aggregator =
            ParallelCountAggregator::new(Arc::new(executor), per_token_config(4, workers))
                .await
                .unwrap();

        let total = aggregator.count_range(per_token_range(4)).await.unwrap();
        assert_eq!(total, 20, "workers = {workers}");
    }
}

#[tokio::test]
async fn test_consistency_passed_through() {
    let executor = Arc::new(ScriptedExecutor::new());
    let config = per_token_config(5, 2).with_consistency(ConsistencyLevel::All);
    let aggregator = ParallelCountAggregator::new(Arc::clone(&executor), config)
        .await
        .unwrap();
    aggregator.count_range(per_token_range(5)).await.unwrap();

    let seen = executor.seen.lock();
    assert_eq!(seen.len(), 5);
    assert!(seen.iter().all(|(_, level)| *level == ConsistencyLevel::All));
    let mut ranges: Vec<_> = seen.iter().map(|(range, _)| range.start).collect();
    ranges.sort_unstable();
    assert_eq!(ranges, vec![0, 1, 2, 3, 4]);
}

#[tokio::test]
async fn test_partition_key_resolved_once() {
    let executor = Arc::new(ScriptedExecutor::new().reply(0, Reply::Count(2)));
    let aggregator = ParallelCountAggregator::new(Arc::clone(&executor), per_token_config(2, 2))
        .await
        .unwrap();

    assert_eq!(aggregator.count_range(per_token_range(2)).await.unwrap(), 2);
    assert_eq!(aggregator.count_range(per_token_range(2)).await.unwrap(), 2);
    assert_eq!(executor.resolves.load(Ordering::SeqCst), 1);
    assert_eq!(aggregator.partition_key(), ["id"]);
}

// ============================================================================
// Failure
// ============================================================================

#[tokio::test]
async fn test_failed_segment_fails_count() {
    let executor = ScriptedExecutor::new()
        .reply(0, Reply::Count(10))
        .reply(1, Reply::Fail(QueryError::Server("read failure".into())))
        .reply(2, Reply::Count(7));
    let aggregator = ParallelCountAggregator::new(Arc::new(executor), per_token_config(3, 3))
        .await
        .unwrap();

    let result = aggregator.count_range(per_token_range(3)).await;
    match result {
        Err(CountError::Query { range, source }) => {
            assert_eq!(range, TokenRange::new(1, 1).unwrap());
            assert_eq!(source, QueryError::Server("read failure".into()));
        }
        other => panic!("expected a query failure, got {other:?}"),
    }
}

#[tokio::test]
async fn test_failure_stops_dispatch() {
    let executor = Arc::new(
        ScriptedExecutor::new().reply(0, Reply::Fail(QueryError::Connection("reset".into()))),
    );
    let aggregator = ParallelCountAggregator::new(Arc::clone(&executor), per_token_config(10, 1))
        .await
        .unwrap();

    let error = aggregator.count_range(per_token_range(10)).await.unwrap_err();
    assert_eq!(error.failed_range(), Some(TokenRange::new(0, 0).unwrap()));
    // The single worker stops after the failing query.
    assert_eq!(executor.calls(), 1);
}

#[tokio::test]
async fn test_in_flight_queries_drain_after_failure() {
    // Range 0 fails while range 1 is still running; range 1 completes but its
    // count is discarded.
    let executor = Arc::new(
        ScriptedExecutor::new()
            .reply(0, Reply::Fail(QueryError::Server("boom".into())))
            .reply(1, Reply::Count(100))
            .delay(0, Duration::from_millis(10))
            .delay(1, Duration::from_millis(40)),
    );
    let aggregator = ParallelCountAggregator::new(Arc::clone(&executor), per_token_config(2, 2))
        .await
        .unwrap();

    let error = aggregator.count_range(per_token_range(2)).await.unwrap_err();
    assert_eq!(error.failed_range(), Some(TokenRange::new(0, 0).unwrap()));
    assert_eq!(executor.calls(), 2);
    assert_eq!(executor.in_flight.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_timeout_fails_count() {
    let executor = ScriptedExecutor::new()
        .reply(1, Reply::Count(4))
        .delay(1, Duration::from_millis(500));
    let config = per_token_config(2, 2).with_query_timeout(Duration::from_millis(20));
    let aggregator = ParallelCountAggregator::new(Arc::new(executor), config)
        .await
        .unwrap();

    match aggregator.count_range(per_token_range(2)).await {
        Err(CountError::Query { range, source }) => {
            assert_eq!(range.start, 1);
            assert_eq!(source, QueryError::Timeout(Duration::from_millis(20)));
        }
        other => panic!("expected a timeout, got {other:?}"),
    }
}

#[tokio::test]
async fn test_negative_count_is_rejected() {
    let executor = ScriptedExecutor::new().reply(0, Reply::Count(-1));
    let aggregator = ParallelCountAggregator::new(Arc::new(executor), per_token_config(1, 1))
        .await
        .unwrap();

    let error = aggregator.count_range(per_token_range(1)).await.unwrap_err();
    assert!(matches!(
        error,
        CountError::Query {
            source: QueryError::InvalidCount(-1),
            ..
        }
    ));
}

#[tokio::test]
async fn test_worker_panic_fails_count() {
    let executor = ScriptedExecutor::new()
        .reply(0, Reply::Count(3))
        .reply(1, Reply::Panic);
    let aggregator = ParallelCountAggregator::new(Arc::new(executor), per_token_config(2, 2))
        .await
        .unwrap();

    let error = aggregator.count_range(per_token_range(2)).await.unwrap_err();
    assert!(matches!(error, CountError::WorkerPanicked(_)));
}

#[tokio::test]
async fn test_worker_panic_stops_dispatch() {
    // Range 0 panics while range 1 is still running; the surviving worker
    // must not go on to the remaining ranges.
    let mut executor = ScriptedExecutor::new().reply(0, Reply::Panic);
    for start in 0..10 {
        let delay = if start == 0 { 5 } else { 30 };
        executor = executor.delay(start, Duration::from_millis(delay));
    }
    let executor = Arc::new(executor);
    let aggregator = ParallelCountAggregator::new(Arc::clone(&executor), per_token_config(10, 2))
        .await
        .unwrap();

    let error = aggregator.count_range(per_token_range(10)).await.unwrap_err();
    assert!(matches!(error, CountError::WorkerPanicked(_)));
    assert_eq!(executor.calls(), 2);
}

#[tokio::test]
async fn test_total_overflow_fails_count() {
    let executor = Arc::new(
        ScriptedExecutor::new()
            .reply(0, Reply::Count(i64::MAX))
            .reply(1, Reply::Count(i64::MAX))
            .reply(2, Reply::Count(i64::MAX)),
    );
    let aggregator = ParallelCountAggregator::new(Arc::clone(&executor), per_token_config(3, 3))
        .await
        .unwrap();

    let error = aggregator.count_range(per_token_range(3)).await.unwrap_err();
    assert!(matches!(error, CountError::TotalOverflow { .. }));
    assert!(error.failed_range().is_some());
}

#[tokio::test]
async fn test_construction_errors() {
    let invalid = ParallelCountAggregator::new(
        Arc::new(ScriptedExecutor::new()),
        CountConfig::new("ks", "t").with_workers(0),
    )
    .await;
    assert!(matches!(invalid, Err(CountError::InvalidArgument(_))));

    let keyless = ScriptedExecutor {
        partition_key: Vec::new(),
        ..ScriptedExecutor::default()
    };
    let result = ParallelCountAggregator::new(Arc::new(keyless), CountConfig::new("ks", "t")).await;
    assert!(matches!(result, Err(CountError::NoPartitionKey { .. })));

    let result =
        ParallelCountAggregator::new(Arc::new(MemoryExecutor::new()), CountConfig::new("ks", "t"))
            .await;
    assert!(matches!(
        result,
        Err(CountError::Schema {
            source: QueryError::UnknownTable { .. },
            ..
        })
    ));
}

// ============================================================================
// Scheduling
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_in_flight_bounded_by_workers() {
    let mut executor = ScriptedExecutor::new();
    for start in 0..40 {
        executor = executor
            .reply(start, Reply::Count(1))
            .delay(start, Duration::from_millis(5));
    }
    let executor = Arc::new(executor);
    let aggregator = ParallelCountAggregator::new(Arc::clone(&executor), per_token_config(40, 4))
        .await
        .unwrap();

    assert_eq!(aggregator.count_range(per_token_range(40)).await.unwrap(), 40);
    assert_eq!(executor.calls(), 40);
    assert!(executor.max_in_flight.load(Ordering::SeqCst) <= 4);
}

// ============================================================================
// End to End
// ============================================================================

fn memory_table() -> Arc<MemoryExecutor> {
    let executor = Arc::new(MemoryExecutor::new());
    executor.create_table("shop", "orders", &["tenant", "order_id"]);
    executor
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_whole_ring_counts_every_row() {
    let executor = memory_table();
    executor
        .insert_keys("shop", "orders", (0..5_000).map(|i| format!("order-{i}")))
        .unwrap();
    // Ring edges and coarse boundaries are where an off-by-one would show.
    let step = ((1u128 << 64) / 16) as i128;
    let boundaries = (0..16).flat_map(|i| {
        let start = (i64::MIN as i128 + i * step) as i64;
        [start, start.saturating_sub(1)]
    });
    executor
        .insert_tokens("shop", "orders", boundaries.chain([i64::MIN, i64::MAX]))
        .unwrap();
    let expected = executor.row_count("shop", "orders").unwrap() as u64;

    let config = CountConfig::new("shop", "orders")
        .with_segments(16)
        .with_sub_segments(8)
        .with_workers(6);
    let aggregator = ParallelCountAggregator::new(Arc::clone(&executor), config)
        .await
        .unwrap();

    assert_eq!(aggregator.count_rows().await.unwrap(), expected);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_default_config_counts_every_row() {
    let executor = memory_table();
    executor
        .insert_keys("shop", "orders", (0..1_000).map(|i| format!("key-{i}")))
        .unwrap();

    let aggregator = ParallelCountAggregator::new(executor, CountConfig::new("shop", "orders"))
        .await
        .unwrap();

    assert_eq!(aggregator.count_rows().await.unwrap(), 1_000);
    assert!(aggregator.statement().text().contains("token(\"tenant\", \"order_id\")"));
}

#[tokio::test]
async fn test_count_sub_range() {
    let executor = memory_table();
    executor
        .insert_tokens("shop", "orders", [-100, -1, 0, 1, 50, 99, 100, 101])
        .unwrap();

    let config = CountConfig::new("shop", "orders")
        .with_segments(3)
        .with_sub_segments(3)
        .with_workers(2);
    let aggregator = ParallelCountAggregator::new(executor, config).await.unwrap();

    let total = aggregator
        .count_range(TokenRange::new(0, 100).unwrap())
        .await
        .unwrap();
    assert_eq!(total, 5);
}
