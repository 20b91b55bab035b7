//! WolfSync Error Types

use thiserror::Error;

use crate::durability::Seqno;

/// Result type alias for WolfSync operations
pub type Result<T> = std::result::Result<T, Error>;

/// WolfSync error types
#[derive(Error, Debug)]
pub enum Error {
    // Durability errors
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("No tracked SyncWrite for ack from replica {replica} (memory seqno {seqno})")]
    NoTrackedWrite { replica: String, seqno: Seqno },

    #[error("Stale ack from replica {replica}: ack'ed seqno {acked} is behind recorded seqno {recorded}")]
    StaleAck {
        replica: String,
        acked: Seqno,
        recorded: Seqno,
    },

    #[error("Unknown replica: {0}")]
    UnknownReplica(String),

    #[error("Invalid replication topology: {0}")]
    InvalidTopology(String),

    #[error("Invalid durability level: {0}")]
    InvalidLevel(u8),

    #[error("SyncWrite already in progress for key {0}")]
    SyncWriteInProgress(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Failed to render configuration: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Check if this error indicates a bug in a surrounding component.
    /// These must be escalated, never absorbed.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::InvariantViolation(_))
    }

    /// Check if this error is an operational condition the replication
    /// layer may act on (ignore, disconnect or resync the replica)
    pub fn is_operational(&self) -> bool {
        matches!(
            self,
            Error::NoTrackedWrite { .. } | Error::StaleAck { .. } | Error::UnknownReplica(_)
        )
    }
}
