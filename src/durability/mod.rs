//! Durability Module
//!
//! Turns locally queued mutations into durably replicated writes:
//! SyncWrites are tracked until a majority of nodes acknowledge them, then
//! committed in seqno order, or aborted on timeout or loss of quorum.

mod sync_write;
mod tracked_log;
mod replica;
mod quorum;
mod stats;
mod monitor;

pub use sync_write::{Level, Requirements, Seqno, SyncWrite, SyncWriteState};
pub use tracked_log::TrackedWriteLog;
pub use replica::{ReplicaState, ReplicaTracker, ReplicationTopology};
pub use quorum::QuorumEvaluator;
pub use stats::{DurabilityStats, ReplicaStats};
pub use monitor::{DurabilityMonitor, SyncWriteResolver};

/// Partition (vbucket) identifier: the unit of replication
pub type PartitionId = u16;
