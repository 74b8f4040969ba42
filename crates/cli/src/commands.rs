//! CLI subcommands.

use anyhow::Context;
use clap::{Args, Subcommand};
use corelib::{split_two_level, ConsistencyLevel, RangePartitioner, TokenRange};
use counter::config::{DEFAULT_SEGMENTS, DEFAULT_SUB_SEGMENTS, DEFAULT_WORKERS};
use counter::{CountConfig, MemoryExecutor, ParallelCountAggregator};
use serde::Serialize;
use std::io::Write;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

const SIMULATED_KEYSPACE: &str = "simulation";
const SIMULATED_TABLE: &str = "rows";

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print the token ranges a count would query.
    Plan(PlanArgs),
    /// Count synthetic rows held in memory.
    Simulate(SimulateArgs),
}

#[derive(Debug, Args)]
pub struct PlanArgs {
    /// First token of the range.
    #[arg(long, default_value_t = i64::MIN, allow_hyphen_values = true)]
    pub start: i64,
    /// Last token of the range (inclusive).
    #[arg(long, default_value_t = i64::MAX, allow_hyphen_values = true)]
    pub end: i64,
    /// Coarse ranges.
    #[arg(long, default_value_t = DEFAULT_SEGMENTS)]
    pub segments: usize,
    /// Fine ranges per coarse range.
    #[arg(long, default_value_t = 1)]
    pub sub_segments: usize,
}

#[derive(Debug, Args)]
pub struct SimulateArgs {
    /// Rows to load into the in-memory table.
    #[arg(long, default_value_t = 10_000)]
    pub rows: u64,
    /// Concurrent count queries.
    #[arg(long, default_value_t = DEFAULT_WORKERS)]
    pub workers: usize,
    /// Coarse ranges over the ring.
    #[arg(long, default_value_t = DEFAULT_SEGMENTS)]
    pub segments: usize,
    /// Fine ranges per coarse range.
    #[arg(long, default_value_t = DEFAULT_SUB_SEGMENTS)]
    pub sub_segments: usize,
    /// Consistency level passed to every query.
    #[arg(long, default_value_t = ConsistencyLevel::default())]
    pub consistency: ConsistencyLevel,
    /// Artificial latency of each query, in milliseconds.
    #[arg(long, default_value_t = 0)]
    pub latency_ms: u64,
    /// Per-query timeout, in milliseconds.
    #[arg(long)]
    pub timeout_ms: Option<u64>,
}

/// Output of a command.
#[derive(Debug, Serialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum CommandResult {
    Plan {
        range: TokenRange,
        ranges: Vec<TokenRange>,
    },
    Simulate {
        expected: u64,
        counted: u64,
        elapsed_ms: u64,
    },
}

impl Command {
    pub async fn execute(self) -> anyhow::Result<CommandResult> {
        match self {
            Command::Plan(args) => plan(args),
            Command::Simulate(args) => simulate(args).await,
        }
    }
}

fn plan(args: PlanArgs) -> anyhow::Result<CommandResult> {
    let range = TokenRange::new(args.start, args.end)?;
    let coarse = RangePartitioner::new(args.segments)?;
    let fine = RangePartitioner::new(args.sub_segments)?;
    let ranges = split_two_level(range, coarse, fine).collect();
    Ok(CommandResult::Plan { range, ranges })
}

async fn simulate(args: SimulateArgs) -> anyhow::Result<CommandResult> {
    let mut executor = MemoryExecutor::new();
    if args.latency_ms > 0 {
        executor = executor.with_latency(Duration::from_millis(args.latency_ms));
    }
    executor.create_table(SIMULATED_KEYSPACE, SIMULATED_TABLE, &["id"]);
    executor
        .insert_keys(
            SIMULATED_KEYSPACE,
            SIMULATED_TABLE,
            (0..args.rows).map(|i| format!("row-{i}")),
        )
        .context("loading simulated rows")?;
    info!(rows = args.rows, "loaded simulated table");

    let mut config = CountConfig::new(SIMULATED_KEYSPACE, SIMULATED_TABLE)
        .with_consistency(args.consistency)
        .with_workers(args.workers)
        .with_segments(args.segments)
        .with_sub_segments(args.sub_segments);
    if let Some(timeout_ms) = args.timeout_ms {
        config = config.with_query_timeout(Duration::from_millis(timeout_ms));
    }

    let started = Instant::now();
    let aggregator = ParallelCountAggregator::new(Arc::new(executor), config).await?;
    let counted = aggregator.count_rows().await?;
    let elapsed_ms = started.elapsed().as_millis() as u64;

    anyhow::ensure!(
        counted == args.rows,
        "counted {counted} rows but the table holds {}",
        args.rows
    );
    Ok(CommandResult::Simulate {
        expected: args.rows,
        counted,
        elapsed_ms,
    })
}

impl CommandResult {
    /// Write the result as text lines or as one JSON document.
    pub fn write(&self, out: &mut impl Write, json: bool) -> anyhow::Result<()> {
        if json {
            serde_json::to_writer_pretty(&mut *out, self)?;
            writeln!(out)?;
            return Ok(());
        }
        match self {
            CommandResult::Plan { range, ranges } => {
                writeln!(out, "# {} ranges over {range}", ranges.len())?;
                for r in ranges {
                    writeln!(out, "{}\t{}", r.start, r.end)?;
                }
            }
            CommandResult::Simulate {
                expected,
                counted,
                elapsed_ms,
            } => {
                writeln!(out, "counted {counted} of {expected} rows in {elapsed_ms} ms")?;
            }
        }
        Ok(())
    }
}
