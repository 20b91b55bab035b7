//! Durability Statistics
//!
//! Read-only counters exposed to the statistics subsystem.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::replica::ReplicaState;
use super::sync_write::Seqno;
use super::PartitionId;

/// Running counters kept under the monitor lock
#[derive(Debug, Default, Clone)]
pub(crate) struct Counters {
    pub accepted: u64,
    pub committed: u64,
    pub aborted: u64,
    pub timed_out: u64,
    pub high_committed_seqno: Seqno,
    pub high_aborted_seqno: Seqno,
}

impl Counters {
    pub fn record_commit(&mut self, seqno: Seqno) {
        self.committed += 1;
        self.high_committed_seqno = self.high_committed_seqno.max(seqno);
    }

    pub fn record_abort(&mut self, seqno: Seqno, timed_out: bool) {
        self.aborted += 1;
        if timed_out {
            self.timed_out += 1;
        }
        self.high_aborted_seqno = self.high_aborted_seqno.max(seqno);
    }
}

/// Watermarks of one replica
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicaStats {
    pub id: String,
    #[serde(flatten)]
    pub state: ReplicaState,
}

/// Snapshot of a partition's durability monitor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DurabilityStats {
    pub partition: PartitionId,
    pub num_tracked: usize,
    pub total_accepted: u64,
    pub total_committed: u64,
    pub total_aborted: u64,
    pub total_timed_out: u64,
    pub high_committed_seqno: Seqno,
    pub high_aborted_seqno: Seqno,
    pub majority: usize,
    pub quorum_reachable: bool,
    pub replicas: Vec<ReplicaStats>,
    pub taken_at: DateTime<Utc>,
}

impl DurabilityStats {
    /// Writes that have left the log, by either path
    pub fn total_resolved(&self) -> u64 {
        self.total_committed + self.total_aborted
    }

    /// Look up one replica's watermarks
    pub fn replica(&self, id: &str) -> Option<&ReplicaState> {
        self.replicas.iter().find(|r| r.id == id).map(|r| &r.state)
    }
}
