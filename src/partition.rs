//! Partition
//!
//! A minimal in-memory partition (vbucket) that owns a durability monitor.
//! It assigns seqnos, keeps pending values invisible until their SyncWrite
//! commits, and receives commit/abort notifications from its monitor.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Instant;

use crate::config::DurabilityConfig;
use crate::durability::{
    DurabilityMonitor, DurabilityStats, Level, PartitionId, ReplicaTracker, ReplicationTopology,
    Requirements, Seqno, SyncWrite, SyncWriteResolver,
};
use crate::error::{Error, Result};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Value waiting for its SyncWrite to resolve
#[derive(Debug, Clone)]
struct PendingValue {
    seqno: Seqno,
    value: Vec<u8>,
}

/// A stored document: the visible value plus at most one pending value
#[derive(Debug, Default)]
struct Document {
    committed: Option<Vec<u8>>,
    pending: Option<PendingValue>,
}

/// In-memory partition owning one durability monitor
pub struct Partition {
    id: PartitionId,
    monitor: DurabilityMonitor,
    default_level: Level,
    /// High seqno; held while a mutation is assigned a seqno and tracked
    high_seqno: Mutex<Seqno>,
    documents: Mutex<HashMap<String, Document>>,
}

impl Partition {
    /// Create a partition and its monitor.
    ///
    /// The monitor only holds a weak handle back to the partition.
    pub fn new(
        id: PartitionId,
        local_id: String,
        topology: ReplicationTopology,
        config: &DurabilityConfig,
    ) -> Result<Arc<Self>> {
        let replicas = ReplicaTracker::new(local_id, topology, config.max_replicas)?;

        Ok(Arc::new_cyclic(|partition: &Weak<Partition>| {
            let resolver: Weak<dyn SyncWriteResolver> = partition.clone();
            Self {
                id,
                monitor: DurabilityMonitor::with_tracker(id, replicas, config, resolver),
                default_level: config.default_level,
                high_seqno: Mutex::new(0),
                documents: Mutex::new(HashMap::new()),
            }
        }))
    }

    pub fn id(&self) -> PartitionId {
        self.id
    }

    pub fn monitor(&self) -> &DurabilityMonitor {
        &self.monitor
    }

    pub fn high_seqno(&self) -> Seqno {
        *lock(&self.high_seqno)
    }

    /// Store a value, optionally requiring durability.
    ///
    /// Returns the assigned seqno. A durable value stays invisible until its
    /// SyncWrite commits. Any write to a key with a pending SyncWrite fails
    /// with `SyncWriteInProgress`.
    pub fn set(&self, key: &str, value: Vec<u8>, requirements: Option<Requirements>) -> Result<Seqno> {
        let mut high_seqno = lock(&self.high_seqno);
        let seqno = *high_seqno + 1;

        {
            let mut documents = lock(&self.documents);
            let document = documents.entry(key.to_string()).or_default();
            if document.pending.is_some() {
                return Err(Error::SyncWriteInProgress(key.to_string()));
            }
            match requirements {
                Some(_) => document.pending = Some(PendingValue { seqno, value }),
                None => document.committed = Some(value),
            }
        }

        if let Some(requirements) = requirements {
            // Documents lock is released: the monitor may commit right away
            if let Err(e) = self.monitor.add_sync_write(SyncWrite::new(seqno, key, requirements)) {
                let mut documents = lock(&self.documents);
                if let Some(document) = documents.get_mut(key) {
                    document.pending = None;
                    if document.committed.is_none() {
                        documents.remove(key);
                    }
                }
                return Err(e);
            }
        }

        *high_seqno = seqno;
        Ok(seqno)
    }

    /// Store a value with the partition's default durability level
    pub fn set_durable(&self, key: &str, value: Vec<u8>) -> Result<Seqno> {
        self.set(key, value, Some(Requirements::new(self.default_level)))
    }

    /// Visible (committed) value of a key
    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        lock(&self.documents)
            .get(key)
            .and_then(|d| d.committed.clone())
    }

    /// Seqno of the pending SyncWrite on a key, if any
    pub fn pending_seqno(&self, key: &str) -> Option<Seqno> {
        lock(&self.documents)
            .get(key)
            .and_then(|d| d.pending.as_ref().map(|p| p.seqno))
    }

    /// Seqno acknowledgment delivered by the replication stream
    pub fn seqno_acknowledged(&self, replica: &str, memory_seqno: Seqno, disk_seqno: Seqno) -> Result<()> {
        self.monitor.seqno_ack_received(replica, memory_seqno, disk_seqno)
    }

    pub fn set_replication_topology(&self, topology: ReplicationTopology) -> Result<()> {
        self.monitor.set_replication_topology(topology)
    }

    pub fn process_timeout(&self, now: Instant) -> usize {
        self.monitor.process_timeout(now)
    }

    pub fn stats(&self) -> DurabilityStats {
        self.monitor.stats()
    }
}

impl SyncWriteResolver for Partition {
    fn on_commit(&self, seqno: Seqno, key: &str) {
        let mut documents = lock(&self.documents);
        let Some(document) = documents.get_mut(key) else {
            tracing::warn!("Partition {}: commit of {} for unknown key {}", self.id, seqno, key);
            return;
        };

        match document.pending.take() {
            Some(pending) if pending.seqno == seqno => document.committed = Some(pending.value),
            other => {
                tracing::warn!(
                    "Partition {}: commit of {} does not match pending write on {}",
                    self.id,
                    seqno,
                    key
                );
                document.pending = other;
            }
        }
    }

    fn on_abort(&self, seqno: Seqno, key: &str) {
        let mut documents = lock(&self.documents);
        let Some(document) = documents.get_mut(key) else {
            tracing::warn!("Partition {}: abort of {} for unknown key {}", self.id, seqno, key);
            return;
        };

        if document.pending.as_ref().is_some_and(|p| p.seqno == seqno) {
            document.pending = None;
            if document.committed.is_none() {
                documents.remove(key);
            }
        }
    }
}
