//! CLI argument parsing using clap

use clap::Parser;
use std::path::PathBuf;

/// quorum-relay - barrier-synchronized scatter/gather relay
#[derive(Parser, Debug)]
#[command(name = "quorum-relay")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// TOML configuration file (CLI flags override its values)
    #[arg(short = 'c', long, env = "QUORUM_RELAY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Address to listen on (e.g., "0.0.0.0:50051")
    #[arg(short = 'l', long)]
    pub listen: Option<String>,

    /// Maximum number of requests handled concurrently
    #[arg(short = 'w', long)]
    pub workers: Option<usize>,

    /// Comma-separated caller identities every round waits for
    #[arg(long)]
    pub participants: Option<String>,

    /// Comma-separated peer nodes; none makes this node a leaf
    #[arg(long)]
    pub nodes: Option<String>,

    /// Port used for nodes listed without one
    #[arg(long)]
    pub node_port: Option<u16>,

    /// How long a caller waits for the rest of its round (e.g., 300s, 5m)
    #[arg(long)]
    pub barrier_timeout: Option<String>,

    /// Timeout for connecting to a peer (e.g., 5s)
    #[arg(long)]
    pub connect_timeout: Option<String>,

    /// Timeout for one peer request (e.g., 600s)
    #[arg(long)]
    pub call_timeout: Option<String>,

    /// Enable debug logging (RUST_LOG takes precedence)
    #[arg(long)]
    pub debug: bool,

    /// Validate and print the effective configuration, then exit
    #[arg(long)]
    pub dry_run: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_unset() {
        let cli = Cli::try_parse_from(["quorum-relay"]).unwrap();
        assert!(cli.config.is_none());
        assert!(cli.listen.is_none());
        assert!(cli.nodes.is_none());
        assert!(!cli.debug);
        assert!(!cli.dry_run);
    }

    #[test]
    fn test_orchestrator_flags() {
        let cli = Cli::try_parse_from([
            "quorum-relay",
            "--listen",
            "127.0.0.1:6000",
            "--participants",
            "alice,bob",
            "--nodes",
            "10.0.0.1,10.0.0.2:7000",
            "--barrier-timeout",
            "30s",
            "-w",
            "4",
        ])
        .unwrap();
        assert_eq!(cli.listen.as_deref(), Some("127.0.0.1:6000"));
        assert_eq!(cli.participants.as_deref(), Some("alice,bob"));
        assert_eq!(cli.workers, Some(4));
        assert_eq!(cli.barrier_timeout.as_deref(), Some("30s"));
    }

    #[test]
    fn test_invalid_port_rejected() {
        assert!(Cli::try_parse_from(["quorum-relay", "--node-port", "70000"]).is_err());
    }
}
