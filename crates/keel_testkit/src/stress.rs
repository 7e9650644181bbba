//! Stress tests for Keel.
//!
//! These runs hammer a durable table from several threads and then check
//! that nothing was lost, both in memory and after replaying the log.

use keel_core::{validators, IndexEngine, IndexStore, LocalHashTable};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Result of a stress test run.
#[derive(Debug, Clone)]
pub struct StressTestResult {
    /// Total operations performed.
    pub total_ops: usize,
    /// Successful operations.
    pub successful_ops: usize,
    /// Failed operations.
    pub failed_ops: usize,
    /// Total duration.
    pub duration: Duration,
    /// Operations per second.
    pub ops_per_second: f64,
}

impl StressTestResult {
    /// Creates a new result.
    pub fn new(successful: usize, failed: usize, duration: Duration) -> Self {
        let total = successful + failed;
        let ops_per_second = if duration.as_secs_f64() > 0.0 {
            total as f64 / duration.as_secs_f64()
        } else {
            0.0
        };

        Self {
            total_ops: total,
            successful_ops: successful,
            failed_ops: failed,
            duration,
            ops_per_second,
        }
    }

    /// Prints a summary of the test.
    pub fn print_summary(&self, name: &str) {
        println!("\n=== {} ===", name);
        println!("Total operations: {}", self.total_ops);
        println!("Successful: {}", self.successful_ops);
        println!("Failed: {}", self.failed_ops);
        println!("Duration: {:?}", self.duration);
        println!("Throughput: {:.2} ops/sec", self.ops_per_second);
    }
}

/// Configuration for stress tests.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Operations per thread.
    pub operations: usize,
    /// Number of concurrent threads.
    pub threads: usize,
    /// Number of distinct counter keys.
    pub keys: u64,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            operations: 2_000,
            threads: 4,
            keys: 8,
        }
    }
}

impl StressConfig {
    /// Small configuration for unit tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            operations: 200,
            threads: 4,
            keys: 4,
        }
    }

    /// Sum every counter must reach.
    #[must_use]
    pub fn expected_total(&self) -> u64 {
        (self.operations * self.threads) as u64
    }
}

/// Increments counters from `config.threads` threads, spreading the
/// increments over `config.keys` keys.
///
/// Every increment is an atomic `update`, so the counters must add up to
/// [`StressConfig::expected_total`].
pub fn stress_concurrent_counters(
    table: Arc<LocalHashTable<u64, u64>>,
    config: &StressConfig,
) -> StressTestResult {
    let successful = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));
    let start = Instant::now();

    let handles: Vec<_> = (0..config.threads)
        .map(|t| {
            let table = Arc::clone(&table);
            let successful = Arc::clone(&successful);
            let failed = Arc::clone(&failed);
            let operations = config.operations;
            let keys = config.keys;
            thread::spawn(move || {
                let increment = |n: Option<&u64>| n.copied().unwrap_or(0) + 1;
                for i in 0..operations {
                    let key = (t + i) as u64 % keys;
                    match table.update(key, &increment) {
                        Ok(()) => successful.fetch_add(1, Ordering::Relaxed),
                        Err(_) => failed.fetch_add(1, Ordering::Relaxed),
                    };
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("stress thread panicked");
    }

    StressTestResult::new(
        successful.load(Ordering::Relaxed),
        failed.load(Ordering::Relaxed),
        start.elapsed(),
    )
}

/// Races `config.threads` threads to claim each of `config.keys` keys with
/// an insert-if-absent validated put. Returns how many claims won per key.
pub fn stress_unique_claims(
    table: Arc<LocalHashTable<u64, u64>>,
    config: &StressConfig,
) -> Vec<usize> {
    let wins: Arc<Vec<AtomicUsize>> =
        Arc::new((0..config.keys).map(|_| AtomicUsize::new(0)).collect());

    let handles: Vec<_> = (0..config.threads)
        .map(|t| {
            let table = Arc::clone(&table);
            let wins = Arc::clone(&wins);
            let keys = config.keys;
            thread::spawn(move || {
                for key in 0..keys {
                    let won = table
                        .validated_put(key, t as u64, &validators::insert_if_absent())
                        .unwrap_or(false);
                    if won {
                        wins[key as usize].fetch_add(1, Ordering::Relaxed);
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("stress thread panicked");
    }
    wins.iter().map(|w| w.load(Ordering::Relaxed)).collect()
}

/// Sums every value in table `name` of `store`.
pub fn counter_total(store: &IndexStore, name: &str) -> u64 {
    let table = store
        .open_table::<u64, u64>(name)
        .expect("Failed to open counter table");
    table.entries().into_iter().map(|(_, v)| v).sum()
}
