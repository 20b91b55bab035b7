//! Durability Monitor
//!
//! Tracks the SyncWrites of one partition and resolves each of them exactly
//! once: committed when a majority of nodes acknowledged it, aborted when
//! it times out at the head of the log or the topology can no longer form
//! a quorum.
//!
//! All state sits behind a single mutex. Commit and abort callbacks run
//! while that lock is held, so they are delivered in seqno order across
//! concurrent callers and must not call back into the monitor.

use std::sync::{Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, Instant};

use super::quorum::QuorumEvaluator;
use super::replica::{ReplicaTracker, ReplicationTopology};
use super::stats::{Counters, DurabilityStats, ReplicaStats};
use super::sync_write::{Seqno, SyncWrite, SyncWriteState};
use super::tracked_log::TrackedWriteLog;
use super::PartitionId;
use crate::config::DurabilityConfig;
use crate::error::{Error, Result};

/// Receiver of SyncWrite resolutions, implemented by the owning store.
///
/// Called with the partition lock held: implementations must be fast,
/// non-blocking and must not re-enter the monitor.
pub trait SyncWriteResolver: Send + Sync {
    /// The write is durable and may become visible
    fn on_commit(&self, seqno: Seqno, key: &str);

    /// The write will never become durable and must be discarded
    fn on_abort(&self, seqno: Seqno, key: &str);
}

/// Why a write was aborted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AbortReason {
    Timeout,
    QuorumLost,
}

struct MonitorState {
    log: TrackedWriteLog,
    replicas: ReplicaTracker,
    counters: Counters,
}

/// Per-partition durability monitor
pub struct DurabilityMonitor {
    partition: PartitionId,
    state: Mutex<MonitorState>,
    resolver: Weak<dyn SyncWriteResolver>,
    default_timeout: Duration,
}

impl DurabilityMonitor {
    /// Create a monitor for `partition`, with `local_id` as the active node.
    ///
    /// The resolver is held weakly: the store owns the monitor, never the
    /// other way round.
    pub fn new(
        partition: PartitionId,
        local_id: String,
        topology: ReplicationTopology,
        config: &DurabilityConfig,
        resolver: Weak<dyn SyncWriteResolver>,
    ) -> Result<Self> {
        let replicas = ReplicaTracker::new(local_id, topology, config.max_replicas)?;
        Ok(Self::with_tracker(partition, replicas, config, resolver))
    }

    /// Create a monitor around an already validated replica tracker
    pub fn with_tracker(
        partition: PartitionId,
        replicas: ReplicaTracker,
        config: &DurabilityConfig,
        resolver: Weak<dyn SyncWriteResolver>,
    ) -> Self {
        Self {
            partition,
            state: Mutex::new(MonitorState {
                log: TrackedWriteLog::new(),
                replicas,
                counters: Counters::default(),
            }),
            resolver,
            default_timeout: config.default_timeout(),
        }
    }

    pub fn partition(&self) -> PartitionId {
        self.partition
    }

    fn lock(&self) -> MutexGuard<'_, MonitorState> {
        // Every operation validates before mutating, so a poisoned state is still consistent
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start tracking a SyncWrite.
    ///
    /// Never waits for replication. The write commits immediately only if
    /// the current acknowledgments already satisfy it.
    pub fn add_sync_write(&self, mut write: SyncWrite) -> Result<()> {
        write.resolve_deadline(self.default_timeout);
        let seqno = write.seqno();

        let mut state = self.lock();
        if let Err(e) = state.log.append(write) {
            tracing::error!("Partition {}: rejected SyncWrite {}: {}", self.partition, seqno, e);
            return Err(e);
        }
        state.counters.accepted += 1;
        tracing::trace!("Partition {}: tracking SyncWrite {}", self.partition, seqno);

        self.commit_satisfied(&mut state);
        Ok(())
    }

    /// Handle a seqno acknowledgment from a replica.
    ///
    /// Commits every write that has now reached quorum, invoking the commit
    /// callback once per write in seqno order before returning. A failed
    /// call leaves the monitor untouched.
    pub fn seqno_ack_received(&self, replica: &str, memory_seqno: Seqno, disk_seqno: Seqno) -> Result<()> {
        let mut state = self.lock();

        if state.log.is_empty() {
            tracing::warn!(
                "Partition {}: no tracked SyncWrite for ack from {} (memory seqno {})",
                self.partition,
                replica,
                memory_seqno
            );
            return Err(Error::NoTrackedWrite {
                replica: replica.to_string(),
                seqno: memory_seqno,
            });
        }

        if let Err(e) = state.replicas.record_ack(replica, memory_seqno, disk_seqno) {
            match &e {
                Error::UnknownReplica(_) => {
                    tracing::debug!("Partition {}: ignoring ack: {}", self.partition, e)
                }
                Error::InvariantViolation(_) => {
                    tracing::error!("Partition {}: {}", self.partition, e)
                }
                _ => tracing::warn!("Partition {}: {}", self.partition, e),
            }
            return Err(e);
        }

        let memory_position = state.log.highest_tracked_at_or_below(memory_seqno);
        let disk_position = state.log.highest_tracked_at_or_below(disk_seqno);
        state.replicas.advance_positions(replica, memory_position, disk_position);

        let committed = self.commit_satisfied(&mut state);
        tracing::trace!(
            "Partition {}: ack from {} (memory {}, disk {}) committed {} SyncWrites",
            self.partition,
            replica,
            memory_seqno,
            disk_seqno,
            committed
        );
        Ok(())
    }

    /// Replace the replication topology (rebalance or failover).
    ///
    /// Writes that became satisfied commit. If the new topology can never
    /// form a quorum, every pending write aborts, head first.
    pub fn set_replication_topology(&self, topology: ReplicationTopology) -> Result<()> {
        let mut state = self.lock();
        state.replicas.set_topology(topology)?;

        tracing::info!(
            "Partition {}: replication topology of {} set to {} (majority {})",
            self.partition,
            state.replicas.local_id(),
            state.replicas.topology(),
            state.replicas.majority()
        );

        if state.replicas.is_quorum_reachable() {
            self.commit_satisfied(&mut state);
        } else {
            let pending = state.log.num_tracked();
            if pending > 0 {
                tracing::warn!(
                    "Partition {}: quorum unreachable, aborting {} pending SyncWrites",
                    self.partition,
                    pending
                );
            }
            while let Some(write) = state.log.pop_earliest() {
                self.abort(&mut state, write, AbortReason::QuorumLost);
            }
        }

        Ok(())
    }

    /// Abort writes whose deadline passed, starting at the head.
    ///
    /// A later write is never aborted while an earlier one is still pending.
    /// Returns the number of writes aborted.
    pub fn process_timeout(&self, now: Instant) -> usize {
        let mut state = self.lock();

        let mut aborted = 0;
        while state.log.peek_earliest().is_some_and(|w| w.is_expired(now)) {
            let Some(write) = state.log.pop_earliest() else {
                break;
            };
            self.abort(&mut state, write, AbortReason::Timeout);
            aborted += 1;
        }

        if aborted > 0 {
            // The aborted head may have been blocking already-satisfied writes
            self.commit_satisfied(&mut state);
        }
        aborted
    }

    /// Commit every write up to the quorum frontier
    fn commit_satisfied(&self, state: &mut MonitorState) -> usize {
        let frontier = QuorumEvaluator::new(&state.replicas).frontier(state.log.levels());
        let Some(frontier) = frontier else {
            return 0;
        };

        let released = state.log.release_up_to(frontier);
        let resolver = self.resolver.upgrade();
        if resolver.is_none() {
            tracing::warn!(
                "Partition {}: resolver dropped, {} commits not delivered",
                self.partition,
                released.len()
            );
        }

        let count = released.len();
        for mut write in released {
            write.set_state(SyncWriteState::Committed);
            state.counters.record_commit(write.seqno());
            tracing::debug!(
                "Partition {}: committed SyncWrite {} ({}) for key {}",
                self.partition,
                write.seqno(),
                write.level(),
                write.key()
            );
            if let Some(resolver) = &resolver {
                resolver.on_commit(write.seqno(), write.key());
            }
        }
        count
    }

    fn abort(&self, state: &mut MonitorState, mut write: SyncWrite, reason: AbortReason) {
        write.set_state(SyncWriteState::Aborted);
        state
            .counters
            .record_abort(write.seqno(), reason == AbortReason::Timeout);

        tracing::debug!(
            "Partition {}: aborted SyncWrite {} for key {} ({:?})",
            self.partition,
            write.seqno(),
            write.key(),
            reason
        );

        match self.resolver.upgrade() {
            Some(resolver) => resolver.on_abort(write.seqno(), write.key()),
            None => tracing::warn!(
                "Partition {}: resolver dropped, abort of {} not delivered",
                self.partition,
                write.seqno()
            ),
        }
    }

    /// Number of SyncWrites awaiting resolution
    pub fn num_tracked(&self) -> usize {
        self.lock().log.num_tracked()
    }

    /// Seqnos currently tracked, head first
    pub fn tracked_seqnos(&self) -> Vec<Seqno> {
        self.lock().log.seqnos()
    }

    /// Highest tracked SyncWrite seqno the replica covers in memory
    pub fn replica_memory_seqno(&self, replica: &str) -> Result<Seqno> {
        self.lock().replicas.memory_seqno(replica)
    }

    /// Raw memory seqno last acknowledged by the replica
    pub fn replica_ack_seqno(&self, replica: &str) -> Result<Seqno> {
        self.lock().replicas.ack_seqno(replica)
    }

    pub fn replica_disk_seqno(&self, replica: &str) -> Result<Seqno> {
        self.lock().replicas.disk_seqno(replica)
    }

    pub fn replica_disk_ack_seqno(&self, replica: &str) -> Result<Seqno> {
        self.lock().replicas.disk_ack_seqno(replica)
    }

    pub fn high_committed_seqno(&self) -> Seqno {
        self.lock().counters.high_committed_seqno
    }

    pub fn topology(&self) -> ReplicationTopology {
        self.lock().replicas.topology().clone()
    }

    /// Snapshot of the monitor's counters and replica watermarks
    pub fn stats(&self) -> DurabilityStats {
        let state = self.lock();
        DurabilityStats {
            partition: self.partition,
            num_tracked: state.log.num_tracked(),
            total_accepted: state.counters.accepted,
            total_committed: state.counters.committed,
            total_aborted: state.counters.aborted,
            total_timed_out: state.counters.timed_out,
            high_committed_seqno: state.counters.high_committed_seqno,
            high_aborted_seqno: state.counters.high_aborted_seqno,
            majority: state.replicas.majority(),
            quorum_reachable: state.replicas.is_quorum_reachable(),
            replicas: state
                .replicas
                .snapshot()
                .into_iter()
                .map(|(id, replica)| ReplicaStats { id, state: replica })
                .collect(),
            taken_at: chrono::Utc::now(),
        }
    }
}
