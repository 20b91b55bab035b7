//! Timeout Scanner
//!
//! Periodically drives `process_timeout` on every partition so that
//! SyncWrites which cannot reach quorum are aborted once their deadline
//! passes.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tokio::time::interval;

use crate::partition::Partition;

/// Background task aborting expired SyncWrites
pub struct TimeoutScanner {
    partitions: Vec<Arc<Partition>>,
    scan_interval: Duration,
    shutdown: RwLock<bool>,
}

impl TimeoutScanner {
    pub fn new(partitions: Vec<Arc<Partition>>, scan_interval: Duration) -> Self {
        Self {
            partitions,
            scan_interval,
            shutdown: RwLock::new(false),
        }
    }

    /// Run until `stop` is called
    pub async fn run(&self) {
        tracing::debug!(
            "Timeout scanner started for {} partitions every {:?}",
            self.partitions.len(),
            self.scan_interval
        );

        let mut ticker = interval(self.scan_interval);
        loop {
            if *self.shutdown.read().await {
                break;
            }

            ticker.tick().await;
            self.scan_once(Instant::now());
        }

        tracing::debug!("Timeout scanner stopped");
    }

    /// Abort every expired SyncWrite as of `now`, returning how many
    pub fn scan_once(&self, now: Instant) -> usize {
        let mut aborted = 0;
        for partition in &self.partitions {
            let count = partition.process_timeout(now);
            if count > 0 {
                tracing::info!("Partition {}: {} SyncWrites timed out", partition.id(), count);
            }
            aborted += count;
        }
        aborted
    }

    pub async fn stop(&self) {
        *self.shutdown.write().await = true;
    }
}
