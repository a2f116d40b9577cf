//! Stress tests for the record store.
//!
//! These runs verify behavior under many writers sharing one store.

use deskstore_core::{Fields, RecordStore};
use deskstore_storage::KeyValueStorage;
use serde_json::Value;
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
}

impl StressTestResult {
    /// Creates a new result.
    pub fn new(successful: usize, failed: usize, duration: Duration) -> Self {
        Self {
            total_ops: successful + failed,
            successful_ops: successful,
            failed_ops: failed,
            duration,
        }
    }

    /// Operations per second, zero for an instant run.
    pub fn ops_per_second(&self) -> f64 {
        let secs = self.duration.as_secs_f64();
        if secs > 0.0 {
            self.total_ops as f64 / secs
        } else {
            0.0
        }
    }
}

/// Configuration for stress runs.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Number of concurrent threads.
    pub threads: usize,
    /// Operations per thread.
    pub operations_per_thread: usize,
    /// Module written to.
    pub module: String,
    /// Owner written to.
    pub owner_id: String,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            threads: 4,
            operations_per_thread: 50,
            module: "todos".into(),
            owner_id: "stress".into(),
        }
    }
}

/// Creates records from several threads into one collection.
pub fn stress_concurrent_creates<S>(store: Arc<RecordStore<S>>, config: &StressConfig) -> StressTestResult
where
    S: KeyValueStorage + 'static,
{
    let successful = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));
    let start = Instant::now();

    let handles: Vec<_> = (0..config.threads)
        .map(|t| {
            let store = Arc::clone(&store);
            let successful = Arc::clone(&successful);
            let failed = Arc::clone(&failed);
            let module = config.module.clone();
            let owner_id = config.owner_id.clone();
            let operations = config.operations_per_thread;

            thread::spawn(move || {
                for i in 0..operations {
                    let mut payload = Fields::new();
                    payload.insert("writer".into(), Value::from(t));
                    payload.insert("seq".into(), Value::from(i));
                    match store.create(&module, &owner_id, payload) {
                        Ok(_) => successful.fetch_add(1, Ordering::Relaxed),
                        Err(_) => failed.fetch_add(1, Ordering::Relaxed),
                    };
                }
            })
        })
        .collect();

    for handle in handles {
        if handle.join().is_err() {
            failed.fetch_add(config.operations_per_thread, Ordering::Relaxed);
        }
    }

    StressTestResult::new(
        successful.load(Ordering::Relaxed),
        failed.load(Ordering::Relaxed),
        start.elapsed(),
    )
}
