//! TOML configuration file parsing

use super::cli::Cli;
use super::cli_convert::parse_list;
use super::Config;
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// Parse TOML configuration file
pub fn parse_toml_file(path: &Path) -> Result<Config> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_toml_string(&contents)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Parse TOML configuration from string
pub fn parse_toml_string(contents: &str) -> Result<Config> {
    let config: Config = ::toml::from_str(contents).context("Failed to parse TOML configuration")?;

    Ok(config)
}

/// Render a configuration as TOML
pub fn to_toml_string(config: &Config) -> Result<String> {
    ::toml::to_string_pretty(config).context("Failed to render TOML configuration")
}

/// Merge CLI arguments with TOML configuration (CLI takes precedence)
pub fn merge_cli_with_config(cli: &Cli, mut config: Config) -> Config {
    if let Some(listen) = &cli.listen {
        config.server.listen_addr = listen.clone();
    }
    if let Some(workers) = cli.workers {
        config.server.workers = workers;
    }

    if let Some(participants) = &cli.participants {
        config.cluster.participants = parse_list(participants);
    }
    if let Some(nodes) = &cli.nodes {
        config.cluster.nodes = parse_list(nodes);
    }
    if let Some(port) = cli.node_port {
        config.cluster.node_port = port;
    }

    if let Some(timeout) = &cli.barrier_timeout {
        config.barrier.timeout = timeout.clone();
    }
    if let Some(timeout) = &cli.connect_timeout {
        config.peers.connect_timeout = timeout.clone();
    }
    if let Some(timeout) = &cli.call_timeout {
        config.peers.call_timeout = timeout.clone();
    }

    config
}

/// Load the configuration the CLI points at, with CLI overrides applied
pub fn load_config(cli: &Cli) -> Result<Config> {
    let config = match &cli.config {
        Some(path) => parse_toml_file(path)?,
        None => Config::default(),
    };

    Ok(merge_cli_with_config(cli, config))
}
