//! Quorum Evaluation
//!
//! Pure computation of the committable frontier from the replica
//! watermarks of a [`ReplicaTracker`]. The active node always satisfies a
//! durability requirement locally, so it takes part in every quorum with an
//! unbounded watermark.

use super::replica::ReplicaTracker;
use super::sync_write::{Level, Seqno};

/// Evaluates which tracked writes have reached quorum
pub struct QuorumEvaluator<'a> {
    tracker: &'a ReplicaTracker,
}

impl<'a> QuorumEvaluator<'a> {
    pub fn new(tracker: &'a ReplicaTracker) -> Self {
        Self { tracker }
    }

    /// Highest seqno acknowledged by at least a majority of nodes at the
    /// granularity `level` demands. None if quorum is unreachable.
    pub fn ack_threshold(&self, level: Level) -> Option<Seqno> {
        if !self.tracker.is_quorum_reachable() {
            return None;
        }

        let mut seqnos = self.tracker.ack_watermarks(level.requires_persistence());
        seqnos.push(Seqno::MAX);
        seqnos.sort_unstable();

        let majority = self.tracker.majority();
        if seqnos.len() < majority {
            return None;
        }
        Some(seqnos[seqnos.len() - majority])
    }

    /// Highest tracked seqno committable at `level`.
    ///
    /// `tracked` must be ascending. An ack landing between two tracked
    /// seqnos only covers the earlier one.
    pub fn committable_seqno(&self, level: Level, tracked: &[Seqno]) -> Option<Seqno> {
        let threshold = self.ack_threshold(level)?;
        let count = tracked.partition_point(|seqno| *seqno <= threshold);
        count.checked_sub(1).map(|idx| tracked[idx])
    }

    /// Committable frontier over writes of mixed levels, head first.
    ///
    /// Stops at the first unsatisfied write: a later write never commits
    /// ahead of an earlier pending one.
    pub fn frontier<I>(&self, writes: I) -> Option<Seqno>
    where
        I: IntoIterator<Item = (Seqno, Level)>,
    {
        let memory = self.ack_threshold(Level::Majority);
        let disk = self.ack_threshold(Level::PersistToMajority);

        let mut frontier = None;
        for (seqno, level) in writes {
            let threshold = if level.requires_persistence() { disk } else { memory };
            match threshold {
                Some(threshold) if seqno <= threshold => frontier = Some(seqno),
                _ => break,
            }
        }
        frontier
    }
}
