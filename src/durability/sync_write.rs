//! SyncWrite Types
//!
//! A SyncWrite is a mutation that has been queued locally but is not yet
//! visible: it waits until enough replicas acknowledge it.

use std::time::{Duration, Instant};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Sequence number identifying mutation order within a partition
pub type Seqno = i64;

/// Durability level requested for a write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    /// Majority of nodes have the write in memory
    Majority,
    /// Majority in memory, and persisted on the active node
    MajorityAndPersistOnMaster,
    /// Majority of nodes have persisted the write
    PersistToMajority,
}

impl Level {
    /// Numeric code used by the replication protocol
    pub fn code(&self) -> u8 {
        match self {
            Level::Majority => 1,
            Level::MajorityAndPersistOnMaster => 2,
            Level::PersistToMajority => 3,
        }
    }

    /// Whether replicas must acknowledge persistence rather than receipt
    pub fn requires_persistence(&self) -> bool {
        matches!(self, Level::PersistToMajority)
    }
}

impl TryFrom<u8> for Level {
    type Error = Error;

    fn try_from(code: u8) -> Result<Self> {
        match code {
            1 => Ok(Level::Majority),
            2 => Ok(Level::MajorityAndPersistOnMaster),
            3 => Ok(Level::PersistToMajority),
            // 0 is "no durability", which never produces a SyncWrite
            other => Err(Error::InvalidLevel(other)),
        }
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Level::Majority => write!(f, "MAJORITY"),
            Level::MajorityAndPersistOnMaster => write!(f, "MAJORITY_AND_PERSIST_ON_MASTER"),
            Level::PersistToMajority => write!(f, "PERSIST_TO_MAJORITY"),
        }
    }
}

/// Durability requirements attached to a mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Requirements {
    pub level: Level,
    /// None means the monitor's default timeout
    pub timeout: Option<Duration>,
}

impl Requirements {
    pub fn new(level: Level) -> Self {
        Self { level, timeout: None }
    }

    pub fn with_timeout(level: Level, timeout: Duration) -> Self {
        Self {
            level,
            timeout: Some(timeout),
        }
    }
}

/// Lifecycle state of a SyncWrite
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncWriteState {
    Pending,
    Committed,
    Aborted,
}

impl std::fmt::Display for SyncWriteState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncWriteState::Pending => write!(f, "PENDING"),
            SyncWriteState::Committed => write!(f, "COMMITTED"),
            SyncWriteState::Aborted => write!(f, "ABORTED"),
        }
    }
}

/// A write awaiting durability
#[derive(Debug, Clone)]
pub struct SyncWrite {
    seqno: Seqno,
    key: String,
    requirements: Requirements,
    state: SyncWriteState,
    inserted_at: Instant,
    deadline: Option<Instant>,
}

impl SyncWrite {
    /// Create a pending SyncWrite stamped with the current time
    pub fn new(seqno: Seqno, key: impl Into<String>, requirements: Requirements) -> Self {
        Self::with_inserted_at(seqno, key, requirements, Instant::now())
    }

    /// Create a pending SyncWrite with an explicit insertion time
    pub fn with_inserted_at(
        seqno: Seqno,
        key: impl Into<String>,
        requirements: Requirements,
        inserted_at: Instant,
    ) -> Self {
        Self {
            seqno,
            key: key.into(),
            requirements,
            state: SyncWriteState::Pending,
            inserted_at,
            deadline: None,
        }
    }

    pub fn seqno(&self) -> Seqno {
        self.seqno
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn requirements(&self) -> Requirements {
        self.requirements
    }

    pub fn level(&self) -> Level {
        self.requirements.level
    }

    pub fn state(&self) -> SyncWriteState {
        self.state
    }

    pub fn inserted_at(&self) -> Instant {
        self.inserted_at
    }

    /// Deadline after which the write is aborted by a timeout scan.
    /// Fixed when the monitor starts tracking the write.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Check whether the write is older than its timeout at `now`
    pub fn is_expired(&self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) => deadline < now,
            None => false,
        }
    }

    pub(crate) fn resolve_deadline(&mut self, default_timeout: Duration) {
        let timeout = self.requirements.timeout.unwrap_or(default_timeout);
        self.deadline = self.inserted_at.checked_add(timeout);
    }

    pub(crate) fn set_state(&mut self, state: SyncWriteState) {
        self.state = state;
    }
}
