//! WolfSync - Synchronous Replication Durability Monitor
//!
//! Tracks durable writes ("SyncWrites") on the active copy of a partition
//! until enough replicas have acknowledged them, then commits them in seqno
//! order. Writes that cannot reach quorum abort on timeout or when the
//! replication topology loses its majority.
//!
//! # Architecture
//!
//! Each partition owns one `DurabilityMonitor`. The replication stream
//! reports replica acknowledgments to the monitor, and the monitor reports
//! commit and abort back to the partition through `SyncWriteResolver`.
//! A `TimeoutScanner` task periodically expires writes that stalled.
//!
//! # Features
//!
//! - Majority, MajorityAndPersistOnMaster and PersistToMajority levels
//! - Sparse acknowledgments: acks need not name a tracked seqno
//! - Topology changes with watermark retention and quorum-loss abort
//! - Per-partition statistics as JSON

pub mod config;
pub mod error;
pub mod durability;
pub mod partition;
pub mod scanner;

pub use config::WolfSyncConfig;
pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::WolfSyncConfig;
    pub use crate::durability::{
        DurabilityMonitor, DurabilityStats, Level, ReplicationTopology, Requirements, Seqno,
        SyncWrite, SyncWriteResolver,
    };
    pub use crate::error::{Error, Result};
    pub use crate::partition::Partition;
    pub use crate::scanner::TimeoutScanner;
}
