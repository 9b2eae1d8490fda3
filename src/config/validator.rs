//! Configuration validation

use super::*;
use anyhow::Result;
use std::collections::BTreeSet;

/// Validate complete configuration
pub fn validate_config(config: &Config) -> Result<()> {
    validate_server(&config.server)?;
    validate_timeouts(config)?;
    validate_cluster(&config.cluster)?;

    if !config.is_leaf() && config.server.workers < config.cluster.participants.len() {
        anyhow::bail!(
            "server.workers ({}) must be at least the number of participants ({}), otherwise a round can never fill",
            config.server.workers,
            config.cluster.participants.len()
        );
    }

    Ok(())
}

/// Validate server configuration
pub fn validate_server(server: &ServerConfig) -> Result<()> {
    if server.workers == 0 {
        anyhow::bail!("server.workers must be at least 1");
    }

    if server.workers > 1024 {
        log::warn!(
            "Very high worker count ({}), each worker may hold a peer connection",
            server.workers
        );
    }

    if server.listen_addr.parse::<SocketAddr>().is_err() {
        anyhow::bail!("server.listen_addr is not a socket address: {}", server.listen_addr);
    }

    Ok(())
}

/// Validate barrier and peer timeouts
pub fn validate_timeouts(config: &Config) -> Result<()> {
    for (name, timeout) in [
        ("barrier.timeout", config.barrier_timeout()?),
        ("peers.connect_timeout", config.connect_timeout()?),
        ("peers.call_timeout", config.call_timeout()?),
    ] {
        if timeout.is_zero() {
            anyhow::bail!("{} must be greater than 0", name);
        }
    }

    Ok(())
}

/// Validate cluster membership
pub fn validate_cluster(cluster: &ClusterConfig) -> Result<()> {
    let mut seen = BTreeSet::new();
    for participant in &cluster.participants {
        let participant = participant.trim();
        if participant.is_empty() {
            anyhow::bail!("cluster.participants contains an empty identity");
        }
        if !seen.insert(participant) {
            anyhow::bail!("Duplicate participant: {}", participant);
        }
    }

    if cluster.node_port == 0 {
        anyhow::bail!("cluster.node_port must be greater than 0");
    }

    let nodes: Vec<&str> = cluster
        .nodes
        .iter()
        .map(|n| n.trim())
        .filter(|n| !n.is_empty())
        .collect();

    if nodes.is_empty() {
        if !cluster.participants.is_empty() {
            log::warn!("cluster.participants is ignored on a leaf node (no cluster.nodes)");
        }
        return Ok(());
    }

    if cluster.participants.is_empty() {
        anyhow::bail!("An orchestrator (cluster.nodes set) needs at least one participant");
    }

    let mut addresses = BTreeSet::new();
    for node in nodes {
        let addr = with_port(node, cluster.node_port);
        validate_peer_address(&addr)?;
        if !addresses.insert(addr.clone()) {
            anyhow::bail!("Duplicate node: {}", addr);
        }
    }

    Ok(())
}

/// Check that `addr` is `host:port`
fn validate_peer_address(addr: &str) -> Result<()> {
    if addr.parse::<SocketAddr>().is_ok() {
        return Ok(());
    }

    match addr.rsplit_once(':') {
        Some((host, port))
            if !host.is_empty()
                && !host.contains(|c: char| c.is_whitespace() || c == ':' || c == '/')
                && port.parse::<u16>().map_or(false, |p| p > 0) =>
        {
            Ok(())
        }
        _ => anyhow::bail!("Invalid node address: {}", addr),
    }
}
