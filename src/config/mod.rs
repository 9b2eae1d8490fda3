//! Configuration module
//!
//! Handles CLI argument parsing, TOML configuration files, and validation.
//! The validated `Config` is turned into the immutable `Topology` and
//! timeouts the service is built from.

pub mod cli;
pub mod cli_convert;
pub mod toml;
pub mod validator;

use crate::barrier::ExpectedParticipants;
use crate::distributed::Topology;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

/// Default port of relay nodes
pub const DEFAULT_PORT: u16 = 50051;

/// Complete node configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub cluster: ClusterConfig,
    #[serde(default)]
    pub barrier: BarrierConfig,
    #[serde(default)]
    pub peers: PeersConfig,
}

/// Listening side
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address to accept connections on
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// Requests handled concurrently
    #[serde(default = "default_workers")]
    pub workers: usize,
}

fn default_listen_addr() -> String {
    format!("0.0.0.0:{}", DEFAULT_PORT)
}

fn default_workers() -> usize {
    10
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            workers: default_workers(),
        }
    }
}

/// Cluster membership
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Caller identities every round waits for (orchestrator only)
    #[serde(default)]
    pub participants: Vec<String>,
    /// Peer nodes; empty makes this node a leaf
    #[serde(default)]
    pub nodes: Vec<String>,
    /// Port appended to nodes given without one
    #[serde(default = "default_node_port")]
    pub node_port: u16,
}

fn default_node_port() -> u16 {
    DEFAULT_PORT
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            participants: Vec::new(),
            nodes: Vec::new(),
            node_port: default_node_port(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BarrierConfig {
    /// Longest a caller waits for the rest of its round (e.g. "300s")
    #[serde(default = "default_barrier_timeout")]
    pub timeout: String,
}

fn default_barrier_timeout() -> String {
    "300s".to_string()
}

impl Default for BarrierConfig {
    fn default() -> Self {
        Self {
            timeout: default_barrier_timeout(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeersConfig {
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: String,
    /// Bound on one peer request, including the peer's computation
    #[serde(default = "default_call_timeout")]
    pub call_timeout: String,
}

fn default_connect_timeout() -> String {
    "5s".to_string()
}

fn default_call_timeout() -> String {
    "600s".to_string()
}

impl Default for PeersConfig {
    fn default() -> Self {
        Self {
            connect_timeout: default_connect_timeout(),
            call_timeout: default_call_timeout(),
        }
    }
}

impl Config {
    pub fn is_leaf(&self) -> bool {
        self.cluster.nodes.iter().all(|n| n.trim().is_empty())
    }

    pub fn barrier_timeout(&self) -> Result<Duration> {
        cli_convert::parse_duration(&self.barrier.timeout).context("Invalid barrier.timeout")
    }

    pub fn connect_timeout(&self) -> Result<Duration> {
        cli_convert::parse_duration(&self.peers.connect_timeout).context("Invalid peers.connect_timeout")
    }

    pub fn call_timeout(&self) -> Result<Duration> {
        cli_convert::parse_duration(&self.peers.call_timeout).context("Invalid peers.call_timeout")
    }

    /// Peer addresses with the default port filled in, in configured order
    pub fn peer_addresses(&self) -> Vec<String> {
        self.cluster
            .nodes
            .iter()
            .map(|n| n.trim())
            .filter(|n| !n.is_empty())
            .map(|n| with_port(n, self.cluster.node_port))
            .collect()
    }

    /// Role and peers of this node
    pub fn topology(&self) -> Result<Topology> {
        if self.is_leaf() {
            return Ok(Topology::Leaf);
        }
        let participants = ExpectedParticipants::new(self.cluster.participants.iter().cloned())
            .context("An orchestrator needs cluster.participants")?;
        Topology::orchestrator(self.peer_addresses(), participants)
    }
}

/// Append `port` to `node` unless it already names one
pub fn with_port(node: &str, port: u16) -> String {
    if node.parse::<SocketAddr>().is_ok() {
        return node.to_string();
    }
    if let Ok(ip) = node.parse::<IpAddr>() {
        return SocketAddr::new(ip, port).to_string();
    }
    match node.rsplit_once(':') {
        Some((_, p)) if p.parse::<u16>().is_ok() => node.to_string(),
        _ => format!("{}:{}", node, port),
    }
}
