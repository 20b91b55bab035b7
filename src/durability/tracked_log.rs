//! Tracked Write Log
//!
//! Seqno-ordered queue of SyncWrites that are still waiting for quorum.
//! Writes enter at the tail and leave from the head, either as a committed
//! prefix or one at a time when aborted.

use std::collections::VecDeque;

use super::sync_write::{Level, Seqno, SyncWrite};
use crate::error::{Error, Result};

/// Append-only, strictly seqno-ascending log of pending SyncWrites
#[derive(Debug, Default)]
pub struct TrackedWriteLog {
    writes: VecDeque<SyncWrite>,
}

impl TrackedWriteLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a write at the tail.
    ///
    /// The seqno must be positive and strictly greater than the current
    /// tail's seqno. Replica watermarks start at 0, so a write at 0 or below
    /// would count as acknowledged by every replica.
    pub fn append(&mut self, write: SyncWrite) -> Result<()> {
        if write.seqno() <= 0 {
            return Err(Error::InvariantViolation(format!(
                "SyncWrite seqno {} must be positive",
                write.seqno()
            )));
        }
        if let Some(tail) = self.writes.back() {
            if write.seqno() <= tail.seqno() {
                return Err(Error::InvariantViolation(format!(
                    "SyncWrite seqno {} is not greater than last tracked seqno {}",
                    write.seqno(),
                    tail.seqno()
                )));
            }
        }
        self.writes.push_back(write);
        Ok(())
    }

    /// Remove and return, in ascending order, every write with seqno <= `seqno`
    pub fn release_up_to(&mut self, seqno: Seqno) -> Vec<SyncWrite> {
        let count = self.writes.partition_point(|w| w.seqno() <= seqno);
        self.writes.drain(..count).collect()
    }

    /// Remove the head write
    pub fn pop_earliest(&mut self) -> Option<SyncWrite> {
        self.writes.pop_front()
    }

    pub fn peek_earliest(&self) -> Option<&SyncWrite> {
        self.writes.front()
    }

    pub fn num_tracked(&self) -> usize {
        self.writes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    pub fn last_tracked_seqno(&self) -> Option<Seqno> {
        self.writes.back().map(|w| w.seqno())
    }

    /// Largest tracked seqno that is <= `seqno`.
    /// Used to collapse a sparse ack onto the write it actually covers.
    pub fn highest_tracked_at_or_below(&self, seqno: Seqno) -> Option<Seqno> {
        let count = self.writes.partition_point(|w| w.seqno() <= seqno);
        count.checked_sub(1).map(|idx| self.writes[idx].seqno())
    }

    /// Iterate tracked `(seqno, level)` pairs, head first
    pub fn levels(&self) -> impl Iterator<Item = (Seqno, Level)> + '_ {
        self.writes.iter().map(|w| (w.seqno(), w.level()))
    }

    pub fn seqnos(&self) -> Vec<Seqno> {
        self.writes.iter().map(|w| w.seqno()).collect()
    }
}
