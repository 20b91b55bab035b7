//! Replica Tracking
//!
//! Per-replica acknowledgment watermarks and replication topology.

use std::collections::{HashMap, HashSet};
use serde::{Deserialize, Serialize};

use super::sync_write::Seqno;
use crate::error::{Error, Result};

/// Replication topology for one partition.
///
/// Each slot holds a replica id, or `None` for a replica that is expected
/// but not currently defined (e.g. failed over and not yet replaced).
/// Undefined slots still count towards the majority.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicationTopology {
    replicas: Vec<Option<String>>,
}

impl ReplicationTopology {
    pub fn new(replicas: Vec<Option<String>>) -> Self {
        Self { replicas }
    }

    /// Topology where every slot is a defined replica
    pub fn from_ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replicas: ids.into_iter().map(|id| Some(id.into())).collect(),
        }
    }

    /// Topology with no replicas (the active node alone)
    pub fn local_only() -> Self {
        Self::default()
    }

    pub fn replicas(&self) -> &[Option<String>] {
        &self.replicas
    }

    /// Ids of the defined replicas
    pub fn defined(&self) -> impl Iterator<Item = &str> {
        self.replicas.iter().filter_map(|r| r.as_deref())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.defined().any(|r| r == id)
    }

    /// Number of nodes, including the active node and undefined slots
    pub fn size(&self) -> usize {
        self.replicas.len() + 1
    }

    /// Get quorum size (majority)
    pub fn majority(&self) -> usize {
        (self.size() / 2) + 1
    }

    /// Number of nodes able to acknowledge, including the active node
    pub fn defined_nodes(&self) -> usize {
        self.defined().count() + 1
    }

    /// Whether the defined nodes can ever form a majority
    pub fn is_quorum_reachable(&self) -> bool {
        self.defined_nodes() >= self.majority()
    }

    /// Validate the topology against the active node id and replica limit
    pub fn validate(&self, local_id: &str, max_replicas: usize) -> Result<()> {
        if self.replicas.len() > max_replicas {
            return Err(Error::InvalidTopology(format!(
                "{} replicas exceeds the maximum of {}",
                self.replicas.len(),
                max_replicas
            )));
        }

        let mut seen = HashSet::new();
        for id in self.defined() {
            if id.is_empty() {
                return Err(Error::InvalidTopology("replica id cannot be empty".into()));
            }
            if id == local_id {
                return Err(Error::InvalidTopology(format!(
                    "active node {} cannot be its own replica",
                    id
                )));
            }
            if !seen.insert(id) {
                return Err(Error::InvalidTopology(format!("duplicate replica {}", id)));
            }
        }

        Ok(())
    }
}

impl std::fmt::Display for ReplicationTopology {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let slots: Vec<&str> = self
            .replicas
            .iter()
            .map(|r| r.as_deref().unwrap_or("<undefined>"))
            .collect();
        write!(f, "[{}]", slots.join(", "))
    }
}

/// Acknowledgment state of a single replica
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicaState {
    /// Highest tracked SyncWrite seqno covered in memory
    pub memory_seqno: Seqno,
    /// Raw memory seqno last acknowledged
    pub memory_ack_seqno: Seqno,
    /// Highest tracked SyncWrite seqno covered on disk
    pub disk_seqno: Seqno,
    /// Raw disk seqno last acknowledged
    pub disk_ack_seqno: Seqno,
}

/// Tracks acknowledgments for the replicas of the current topology
#[derive(Debug)]
pub struct ReplicaTracker {
    /// Active node id
    local_id: String,
    topology: ReplicationTopology,
    replicas: HashMap<String, ReplicaState>,
    max_replicas: usize,
}

impl ReplicaTracker {
    pub fn new(local_id: String, topology: ReplicationTopology, max_replicas: usize) -> Result<Self> {
        topology.validate(&local_id, max_replicas)?;

        let replicas = topology
            .defined()
            .map(|id| (id.to_string(), ReplicaState::default()))
            .collect();

        Ok(Self {
            local_id,
            topology,
            replicas,
            max_replicas,
        })
    }

    pub fn local_id(&self) -> &str {
        &self.local_id
    }

    pub fn topology(&self) -> &ReplicationTopology {
        &self.topology
    }

    pub fn majority(&self) -> usize {
        self.topology.majority()
    }

    pub fn is_quorum_reachable(&self) -> bool {
        self.topology.is_quorum_reachable()
    }

    /// Record an acknowledgment from a replica.
    ///
    /// Nothing is modified unless the ack is accepted.
    pub fn record_ack(&mut self, replica: &str, memory_seqno: Seqno, disk_seqno: Seqno) -> Result<()> {
        let state = self
            .replicas
            .get_mut(replica)
            .ok_or_else(|| Error::UnknownReplica(replica.to_string()))?;

        if disk_seqno > memory_seqno {
            return Err(Error::InvariantViolation(format!(
                "replica {} ack'ed disk seqno {} ahead of memory seqno {}",
                replica, disk_seqno, memory_seqno
            )));
        }

        if memory_seqno < state.memory_ack_seqno {
            return Err(Error::StaleAck {
                replica: replica.to_string(),
                acked: memory_seqno,
                recorded: state.memory_ack_seqno,
            });
        }

        state.memory_ack_seqno = memory_seqno;
        // Memory-only levels report 0 for disk; never move backwards
        state.disk_ack_seqno = state.disk_ack_seqno.max(disk_seqno);
        Ok(())
    }

    /// Move the replica's tracked-write positions forward
    pub fn advance_positions(&mut self, replica: &str, memory: Option<Seqno>, disk: Option<Seqno>) {
        if let Some(state) = self.replicas.get_mut(replica) {
            if let Some(seqno) = memory {
                state.memory_seqno = state.memory_seqno.max(seqno);
            }
            if let Some(seqno) = disk {
                state.disk_seqno = state.disk_seqno.max(seqno);
            }
        }
    }

    pub fn state(&self, replica: &str) -> Result<ReplicaState> {
        self.replicas
            .get(replica)
            .copied()
            .ok_or_else(|| Error::UnknownReplica(replica.to_string()))
    }

    pub fn memory_seqno(&self, replica: &str) -> Result<Seqno> {
        self.state(replica).map(|s| s.memory_seqno)
    }

    pub fn ack_seqno(&self, replica: &str) -> Result<Seqno> {
        self.state(replica).map(|s| s.memory_ack_seqno)
    }

    pub fn disk_seqno(&self, replica: &str) -> Result<Seqno> {
        self.state(replica).map(|s| s.disk_seqno)
    }

    pub fn disk_ack_seqno(&self, replica: &str) -> Result<Seqno> {
        self.state(replica).map(|s| s.disk_ack_seqno)
    }

    /// Raw ack watermarks of the defined replicas, in topology order
    pub fn ack_watermarks(&self, persisted: bool) -> Vec<Seqno> {
        self.topology
            .defined()
            .filter_map(|id| self.replicas.get(id))
            .map(|s| if persisted { s.disk_ack_seqno } else { s.memory_ack_seqno })
            .collect()
    }

    /// Replace the topology.
    ///
    /// Replicas present in both topologies keep their watermarks, new ones
    /// start at 0, removed ones are forgotten.
    pub fn set_topology(&mut self, topology: ReplicationTopology) -> Result<()> {
        topology.validate(&self.local_id, self.max_replicas)?;

        let mut replicas = HashMap::with_capacity(topology.defined_nodes());
        for id in topology.defined() {
            let state = self.replicas.get(id).copied().unwrap_or_default();
            replicas.insert(id.to_string(), state);
        }

        self.replicas = replicas;
        self.topology = topology;
        Ok(())
    }

    /// Snapshot of every replica's state, in topology order
    pub fn snapshot(&self) -> Vec<(String, ReplicaState)> {
        self.topology
            .defined()
            .filter_map(|id| self.replicas.get(id).map(|s| (id.to_string(), *s)))
            .collect()
    }
}
