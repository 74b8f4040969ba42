//! Parallel row counting over token ranges.
//!
//! # Algorithm
//!
//! 1. Split the token range into coarse ranges, and each coarse range into
//!    fine ranges (one [`CountTask`] per fine range)
//! 2. Push every task onto a shared queue; pushing never waits
//! 3. Start `min(workers, tasks)` workers; each pops a task, runs its count
//!    query and sends the outcome to the coordinator
//! 4. The coordinator sums outcomes in completion order
//! 5. Return once every worker has exited
//!
//! # Failure
//!
//! The worker that sees a failed query, or that panics, raises the stop flag;
//! the coordinator raises it when the total would overflow. Workers check the
//! flag before popping a task, so at most `workers - 1` tasks can still start
//! after a failure. Queries already in flight finish and are discarded. The
//! first failure is returned with its range; no partial total is ever returned.
//!
//! # Concurrency
//!
//! At most `workers` queries are in flight. The running total lives only in
//! the coordinator, so workers share nothing mutable but the queue and the
//! stop flag.

use crate::config::CountConfig;
use crate::error::{CountError, QueryError, Result};
use crate::executor::QueryExecutor;
use crate::statement::CountStatement;
use crate::task::{plan, CountTask};
use corelib::{ConsistencyLevel, Murmur3Partitioner, Partitioner, TokenRange};
use crossbeam::queue::SegQueue;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

/// Result of one task, as reported by a worker.
#[derive(Debug)]
struct TaskOutcome {
    task: CountTask,
    result: std::result::Result<u64, QueryError>,
}

/// Running total of a count.
///
/// Only meaningful once every dispatched task has resolved; after a failure
/// the total is indeterminate and [`AggregateResult::finish`] returns the
/// failure instead.
#[derive(Debug, Default)]
pub struct AggregateResult {
    total: u64,
    completed: usize,
    failure: Option<CountError>,
}

impl AggregateResult {
    /// Sum of the segments counted so far.
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Number of segments that returned a count.
    pub fn completed(&self) -> usize {
        self.completed
    }

    pub fn is_failed(&self) -> bool {
        self.failure.is_some()
    }

    fn record(&mut self, outcome: TaskOutcome) {
        match outcome.result {
            Ok(count) => {
                let Some(total) = self.total.checked_add(count) else {
                    self.record_failure(CountError::TotalOverflow {
                        range: outcome.task.range,
                    });
                    return;
                };
                self.total = total;
                self.completed += 1;
                metrics::counter!("counter.segments.completed").increment(1);
                debug!(task = outcome.task.id, range = %outcome.task.range, count, "segment counted");
            }
            Err(source) => {
                metrics::counter!("counter.segments.failed").increment(1);
                if self.failure.is_some() {
                    debug!(task = outcome.task.id, range = %outcome.task.range, error = %source, "further segment failed");
                    return;
                }
                warn!(task = outcome.task.id, range = %outcome.task.range, error = %source, "segment failed, abandoning count");
                self.failure = Some(CountError::Query {
                    range: outcome.task.range,
                    source,
                });
            }
        }
    }

    fn record_failure(&mut self, error: CountError) {
        if self.failure.is_none() {
            warn!(%error, "count failed");
            self.failure = Some(error);
        }
    }

    /// The total, or the first failure.
    pub fn finish(self) -> Result<u64> {
        match self.failure {
            Some(error) => Err(error),
            None => Ok(self.total),
        }
    }
}

/// Raises the stop flag when dropped while still armed, i.e. when a worker
/// unwinds or is cancelled before finishing its loop.
struct StopOnDrop {
    stop: Arc<AtomicBool>,
    armed: bool,
}

impl Drop for StopOnDrop {
    fn drop(&mut self) {
        if self.armed {
            self.stop.store(true, Ordering::Release);
        }
    }
}

/// Pool member: pops tasks until the queue drains or the stop flag is raised.
struct Worker<E: QueryExecutor> {
    executor: Arc<E>,
    statement: Arc<CountStatement>,
    consistency: ConsistencyLevel,
    timeout: Option<Duration>,
    queue: Arc<SegQueue<CountTask>>,
    stop: Arc<AtomicBool>,
    results: mpsc::UnboundedSender<TaskOutcome>,
}

impl<E: QueryExecutor> Worker<E> {
    async fn run(self) {
        let mut guard = StopOnDrop {
            stop: Arc::clone(&self.stop),
            armed: true,
        };
        while !self.stop.load(Ordering::Acquire) {
            let Some(task) = self.queue.pop() else {
                break;
            };

            let started = Instant::now();
            let result = self.count(task.range).await;
            metrics::histogram!("counter.segment.seconds").record(started.elapsed().as_secs_f64());

            if result.is_err() {
                self.stop.store(true, Ordering::Release);
            }
            if self.results.send(TaskOutcome { task, result }).is_err() {
                break;
            }
        }
        guard.armed = false;
    }

    async fn count(&self, range: TokenRange) -> std::result::Result<u64, QueryError> {
        let query = self
            .executor
            .execute_count(&self.statement, range, self.consistency);
        let count = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, query)
                .await
                .map_err(|_| QueryError::Timeout(limit))??,
            None => query.await?,
        };
        u64::try_from(count).map_err(|_| QueryError::InvalidCount(count))
    }
}

/// Counts the rows of one table by counting its token ranges concurrently.
///
/// # Example
///
/// ```rust
/// use counter::{CountConfig, MemoryExecutor, ParallelCountAggregator};
/// use std::sync::Arc;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let executor = Arc::new(MemoryExecutor::new());
/// executor.create_table("shop", "orders", &["order_id"]);
/// executor.insert_keys("shop", "orders", ["a", "b", "c"]).unwrap();
///
/// let config = CountConfig::new("shop", "orders").with_segments(8).with_sub_segments(4);
/// let aggregator = ParallelCountAggregator::new(executor, config).await.unwrap();
/// assert_eq!(aggregator.count_rows().await.unwrap(), 3);
/// # }
/// ```
pub struct ParallelCountAggregator<E: QueryExecutor> {
    executor: Arc<E>,
    config: CountConfig,
    statement: Arc<CountStatement>,
}

impl<E: QueryExecutor> ParallelCountAggregator<E> {
    /// Validate `config` and resolve the table's partition key.
    ///
    /// The key is resolved once here; every later count reuses the statement
    /// built from it.
    #[instrument(skip(executor, config), fields(keyspace = %config.keyspace, table = %config.table))]
    pub async fn new(executor: Arc<E>, config: CountConfig) -> Result<Self> {
        config.validate()?;

        let partition_key = executor
            .partition_key_columns(&config.keyspace, &config.table)
            .await
            .map_err(|source| CountError::Schema {
                keyspace: config.keyspace.clone(),
                table: config.table.clone(),
                source,
            })?;
        if partition_key.is_empty() {
            return Err(CountError::NoPartitionKey {
                keyspace: config.keyspace.clone(),
                table: config.table.clone(),
            });
        }
        debug!(columns = ?partition_key, "resolved partition key");

        let statement = Arc::new(CountStatement::new(
            &config.keyspace,
            &config.table,
            partition_key,
        ));

        Ok(Self {
            executor,
            config,
            statement,
        })
    }

    pub fn config(&self) -> &CountConfig {
        &self.config
    }

    /// Partition key columns resolved at construction.
    pub fn partition_key(&self) -> &[String] {
        self.statement.partition_key()
    }

    pub fn statement(&self) -> &CountStatement {
        &self.statement
    }

    /// Count every row of the table.
    pub async fn count_rows(&self) -> Result<u64> {
        self.count_range(Murmur3Partitioner.full_range()).await
    }

    /// Count the rows whose token lies in `range`.
    #[instrument(skip(self, range), fields(keyspace = %self.config.keyspace, table = %self.config.table, range = %range))]
    pub async fn count_range(&self, range: TokenRange) -> Result<u64> {
        let (coarse, fine) = self.config.splitters()?;

        let queue = Arc::new(SegQueue::new());
        for task in plan(range, coarse, fine) {
            queue.push(task);
        }
        let tasks = queue.len();
        let workers = self.config.workers.min(tasks);
        info!(
            tasks,
            workers,
            consistency = %self.config.consistency,
            "starting count"
        );

        let started = Instant::now();
        let stop = Arc::new(AtomicBool::new(false));
        let (results, mut outcomes) = mpsc::unbounded_channel();
        let mut pool = JoinSet::new();
        for _ in 0..workers {
            let worker = Worker {
                executor: Arc::clone(&self.executor),
                statement: Arc::clone(&self.statement),
                consistency: self.config.consistency,
                timeout: self.config.query_timeout(),
                queue: Arc::clone(&queue),
                stop: Arc::clone(&stop),
                results: results.clone(),
            };
            pool.spawn(worker.run());
        }
        drop(results);

        // The channel closes once every worker has exited.
        let mut aggregate = AggregateResult::default();
        while let Some(outcome) = outcomes.recv().await {
            aggregate.record(outcome);
            if aggregate.is_failed() {
                stop.store(true, Ordering::Release);
            }
        }
        while let Some(joined) = pool.join_next().await {
            if let Err(err) = joined {
                aggregate.record_failure(CountError::WorkerPanicked(err.to_string()));
            }
        }

        if aggregate.is_failed() {
            debug!(
                completed = aggregate.completed(),
                skipped = queue.len(),
                "count abandoned"
            );
        } else {
            info!(
                total = aggregate.total(),
                tasks,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "count finished"
            );
        }
        aggregate.finish()
    }
}
