//! Shared test helpers: a recording resolver and an ack fault injector

#![allow(dead_code)]

use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use wolfsync::config::DurabilityConfig;
use wolfsync::durability::{
    DurabilityMonitor, Level, ReplicationTopology, Requirements, Seqno, SyncWrite,
    SyncWriteResolver,
};
use wolfsync::Result;

/// Resolution delivered to the resolver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Commit(Seqno),
    Abort(Seqno),
}

impl Outcome {
    pub fn seqno(&self) -> Seqno {
        match self {
            Outcome::Commit(s) | Outcome::Abort(s) => *s,
        }
    }
}

/// Resolver recording every callback in delivery order
#[derive(Default)]
pub struct Recorder {
    outcomes: Mutex<Vec<Outcome>>,
}

impl Recorder {
    pub fn outcomes(&self) -> Vec<Outcome> {
        self.outcomes.lock().unwrap().clone()
    }

    pub fn committed(&self) -> Vec<Seqno> {
        self.outcomes()
            .into_iter()
            .filter_map(|o| match o {
                Outcome::Commit(s) => Some(s),
                Outcome::Abort(_) => None,
            })
            .collect()
    }

    pub fn aborted(&self) -> Vec<Seqno> {
        self.outcomes()
            .into_iter()
            .filter_map(|o| match o {
                Outcome::Abort(s) => Some(s),
                Outcome::Commit(_) => None,
            })
            .collect()
    }
}

impl SyncWriteResolver for Recorder {
    fn on_commit(&self, seqno: Seqno, _key: &str) {
        self.outcomes.lock().unwrap().push(Outcome::Commit(seqno));
    }

    fn on_abort(&self, seqno: Seqno, _key: &str) {
        self.outcomes.lock().unwrap().push(Outcome::Abort(seqno));
    }
}

/// Monitor for partition 0 with "active" as the local node
pub fn monitor(topology: ReplicationTopology) -> (Arc<Recorder>, DurabilityMonitor) {
    let recorder = Arc::new(Recorder::default());
    let resolver: Weak<Recorder> = Arc::downgrade(&recorder);
    let monitor = DurabilityMonitor::new(
        0,
        "active".to_string(),
        topology,
        &DurabilityConfig::default(),
        resolver,
    )
    .unwrap();
    (recorder, monitor)
}

pub fn replicas(ids: &[&str]) -> ReplicationTopology {
    ReplicationTopology::from_ids(ids.iter().copied())
}

pub fn add(monitor: &DurabilityMonitor, seqno: Seqno, level: Level) {
    monitor
        .add_sync_write(SyncWrite::new(seqno, format!("key{}", seqno), Requirements::new(level)))
        .unwrap();
}

pub fn add_with_timeout(monitor: &DurabilityMonitor, seqno: Seqno, timeout: Duration) {
    monitor
        .add_sync_write(SyncWrite::new(
            seqno,
            format!("key{}", seqno),
            Requirements::with_timeout(Level::Majority, timeout),
        ))
        .unwrap();
}

/// What happens to one acknowledgment in transit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Delivered once, followed by anything held back
    Deliver,
    /// Lost
    Drop,
    /// Delivered twice
    Duplicate,
    /// Held back until after the next delivered ack
    Delay,
}

/// Decorates a monitor's ack path with transport faults
pub struct FaultInjector<'a> {
    monitor: &'a DurabilityMonitor,
    held: Vec<(String, Seqno, Seqno)>,
}

impl<'a> FaultInjector<'a> {
    pub fn new(monitor: &'a DurabilityMonitor) -> Self {
        Self {
            monitor,
            held: Vec::new(),
        }
    }

    /// Send one ack through the faulty transport, returning the result of
    /// every delivery it caused, in delivery order
    pub fn ack(&mut self, fault: Fault, replica: &str, memory: Seqno, disk: Seqno) -> Vec<Result<()>> {
        match fault {
            Fault::Drop => Vec::new(),
            Fault::Delay => {
                self.held.push((replica.to_string(), memory, disk));
                Vec::new()
            }
            Fault::Duplicate => vec![
                self.monitor.seqno_ack_received(replica, memory, disk),
                self.monitor.seqno_ack_received(replica, memory, disk),
            ],
            Fault::Deliver => {
                let mut results = vec![self.monitor.seqno_ack_received(replica, memory, disk)];
                results.extend(self.flush());
                results
            }
        }
    }

    /// Deliver everything held back
    pub fn flush(&mut self) -> Vec<Result<()>> {
        self.held
            .drain(..)
            .map(|(replica, memory, disk)| self.monitor.seqno_ack_received(&replica, memory, disk))
            .collect()
    }

    pub fn num_held(&self) -> usize {
        self.held.len()
    }
}
