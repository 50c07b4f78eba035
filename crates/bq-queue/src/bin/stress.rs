//! bq-stress: multi-producer load against a `BlockQueue`.
//!
//! # Usage
//!
//! ```bash
//! bq-stress --producers 4 --items 10000 --capacity 64 --timeout-ms 100
//! ```
//!
//! Producers push log-record strings and retry when the queue is full; a
//! single consumer drains with timed pops. Prints JSON to stdout and exits
//! with status 1 if any record was lost or delivered twice.

use std::collections::HashSet;
use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use clap::Parser;
use serde_json::json;
use tracing_subscriber::EnvFilter;

use bq_queue::{BlockQueue, ConfigError, QueueConfig, QueueError};

/// Push records from several producers through a bounded queue.
#[derive(Parser, Debug)]
#[command(name = "bq-stress")]
#[command(about = "Stress a bounded blocking queue with concurrent producers")]
struct Cli {
    /// Number of producer threads.
    #[arg(long, default_value_t = 4)]
    producers: u64,

    /// Records pushed by each producer.
    #[arg(long, default_value_t = 1000)]
    items: u64,

    /// Queue capacity (overrides the config file and BLOCKQ_CAPACITY).
    #[arg(long)]
    capacity: Option<usize>,

    /// Consumer wait per pop, in milliseconds.
    #[arg(long, default_value_t = 100)]
    timeout_ms: u64,

    /// TOML queue configuration.
    #[arg(long)]
    config: Option<PathBuf>,
}

fn load_config(cli: &Cli) -> Result<QueueConfig, ConfigError> {
    let mut config = match &cli.config {
        Some(path) => QueueConfig::from_file(path)?,
        None => QueueConfig::from_env()?,
    };
    if let Some(capacity) = cli.capacity {
        config.capacity = capacity;
    }
    config.validate()?;
    Ok(config)
}

/// Total records, or `None` when the count does not fit in a `u64`.
fn expected_records(producers: u64, items: u64) -> Option<u64> {
    producers.checked_mul(items)
}

/// Dedup set size hint; large runs grow the set as records arrive.
const SEEN_CAPACITY_MAX: u64 = 1 << 20;

struct Drained {
    received: u64,
    duplicates: u64,
    unique: usize,
    timeouts: u64,
}

fn drain(
    queue: &BlockQueue<String>,
    expected: u64,
    timeout: Duration,
    producers_done: &AtomicBool,
) -> Drained {
    let mut seen = HashSet::with_capacity(expected.min(SEEN_CAPACITY_MAX) as usize);
    let mut drained = Drained {
        received: 0,
        duplicates: 0,
        unique: 0,
        timeouts: 0,
    };

    while drained.received < expected {
        match queue.pop_timeout(timeout) {
            Ok(record) => {
                drained.received += 1;
                if !seen.insert(record) {
                    drained.duplicates += 1;
                }
            }
            Err(QueueError::Timeout) => {
                drained.timeouts += 1;
                if producers_done.load(Ordering::Acquire) && queue.is_empty().unwrap_or(true) {
                    tracing::warn!(received = drained.received, expected, "queue drained early");
                    break;
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "consumer failed");
                break;
            }
        }
    }

    drained.unique = seen.len();
    drained
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(2);
        }
    };
    let queue = match BlockQueue::<String>::with_config(&config) {
        Ok(queue) => Arc::new(queue),
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(2);
        }
    };

    let Some(expected) = expected_records(cli.producers, cli.items) else {
        eprintln!(
            "Error: {} producers x {} items overflows the record count",
            cli.producers, cli.items
        );
        process::exit(2);
    };
    let rejected = Arc::new(AtomicU64::new(0));
    let producers_done = Arc::new(AtomicBool::new(false));
    tracing::info!(
        producers = cli.producers,
        items = cli.items,
        capacity = config.capacity,
        timed_pop = ?config.timed_pop,
        "starting"
    );

    let start = Instant::now();
    let producers: Vec<_> = (0..cli.producers)
        .map(|p| {
            let queue = Arc::clone(&queue);
            let rejected = Arc::clone(&rejected);
            let items = cli.items;
            thread::spawn(move || {
                for n in 0..items {
                    let mut record = format!("producer={} seq={}", p, n);
                    loop {
                        match queue.push(record) {
                            Ok(()) => break,
                            Err(e) if e.is_full() => {
                                rejected.fetch_add(1, Ordering::Relaxed);
                                record = e.into_inner();
                                thread::yield_now();
                            }
                            Err(e) => {
                                tracing::error!(producer = p, error = %e, "push failed");
                                return;
                            }
                        }
                    }
                }
                tracing::debug!(producer = p, "producer finished");
            })
        })
        .collect();

    let consumer = {
        let queue = Arc::clone(&queue);
        let producers_done = Arc::clone(&producers_done);
        let timeout = Duration::from_millis(cli.timeout_ms);
        thread::spawn(move || drain(&queue, expected, timeout, &producers_done))
    };

    for producer in producers {
        if producer.join().is_err() {
            tracing::error!("producer panicked");
        }
    }
    producers_done.store(true, Ordering::Release);

    let drained = match consumer.join() {
        Ok(drained) => drained,
        Err(_) => {
            eprintln!("Error: consumer panicked");
            process::exit(2);
        }
    };
    let elapsed = start.elapsed();

    let lost = expected.saturating_sub(drained.unique as u64);
    let items_per_sec = if elapsed.as_secs_f64() > 0.0 {
        drained.received as f64 / elapsed.as_secs_f64()
    } else {
        0.0
    };

    let report = json!({
        "producers": cli.producers,
        "items_per_producer": cli.items,
        "capacity": config.capacity,
        "timed_pop": config.timed_pop,
        "expected": expected,
        "received": drained.received,
        "lost": lost,
        "duplicates": drained.duplicates,
        "rejected_pushes": rejected.load(Ordering::Relaxed),
        "timeouts": drained.timeouts,
        "elapsed_ms": elapsed.as_millis() as u64,
        "items_per_sec": items_per_sec,
    });
    println!("{}", serde_json::to_string_pretty(&report).unwrap_or_else(|_| report.to_string()));

    if lost > 0 || drained.duplicates > 0 {
        tracing::error!(lost, duplicates = drained.duplicates, "queue lost or duplicated records");
        process::exit(1);
    }
}
