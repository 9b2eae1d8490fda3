//! Node role and peer topology
//!
//! Built once at startup from the configuration and never changed. A node
//! with no peers is a leaf; otherwise it is an orchestrator whose peers are
//! sorted lexicographically so that every orchestrator agrees on the primary
//! peer (position 0).

use crate::barrier::ExpectedParticipants;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Topology {
    /// Executes operations against the local backend
    Leaf,
    /// Fans operations out to `peers` once all `participants` have called
    Orchestrator {
        peers: Vec<String>,
        participants: ExpectedParticipants,
    },
}

impl Topology {
    /// Orchestrator topology over `peers`, sorted and deduplicated
    pub fn orchestrator(mut peers: Vec<String>, participants: ExpectedParticipants) -> anyhow::Result<Self> {
        peers.sort();
        peers.dedup();
        if peers.is_empty() {
            anyhow::bail!("an orchestrator needs at least one peer");
        }
        Ok(Topology::Orchestrator { peers, participants })
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, Topology::Leaf)
    }

    /// Peers in topology order, empty for a leaf
    pub fn peers(&self) -> &[String] {
        match self {
            Topology::Leaf => &[],
            Topology::Orchestrator { peers, .. } => peers,
        }
    }

    /// Peer at position 0
    pub fn primary(&self) -> Option<&str> {
        self.peers().first().map(String::as_str)
    }

    pub fn participants(&self) -> Option<&ExpectedParticipants> {
        match self {
            Topology::Leaf => None,
            Topology::Orchestrator { participants, .. } => Some(participants),
        }
    }
}

impl fmt::Display for Topology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Topology::Leaf => write!(f, "leaf"),
            Topology::Orchestrator { peers, participants } => write!(
                f,
                "orchestrator ({} peers, {} participants)",
                peers.len(),
                participants.len()
            ),
        }
    }
}
