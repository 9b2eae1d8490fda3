//! quorum-relay CLI entry point

use anyhow::{Context, Result};
use clap::Parser;
use quorum_relay::backend::mock::MockBackend;
use quorum_relay::backend::Collaborators;
use quorum_relay::config::{cli::Cli, toml as config_toml, validator, Config};
use quorum_relay::distributed::{get_node_id, Dispatcher, NodeService, PeerClient, ServiceFront, Topology};
use quorum_relay::operation::OperationRegistry;
use std::sync::Arc;

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.debug);

    let config = config_toml::load_config(&cli)?;
    validator::validate_config(&config).context("Configuration validation failed")?;
    let topology = config.topology()?;

    if cli.dry_run {
        print_configuration(&config, &topology)?;
        println!("Dry run mode - configuration validated successfully");
        return Ok(());
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(num_cpus::get().max(2))
        .enable_all()
        .build()
        .context("Failed to create tokio runtime")?;

    runtime.block_on(run_service(config, topology))
}

fn init_logging(debug: bool) {
    let default_filter = if debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp_millis()
        .init();
}

async fn run_service(config: Config, topology: Topology) -> Result<()> {
    let node_id = get_node_id();
    log::info!("quorum-relay v{} on {} as {}", env!("CARGO_PKG_VERSION"), node_id, topology);
    for (i, peer) in topology.peers().iter().enumerate() {
        log::info!("  peer {}: {}{}", i, peer, if i == 0 { " (primary)" } else { "" });
    }

    if topology.is_leaf() {
        log::warn!("No enclave backend is linked in, serving with the in-memory mock backend");
    }

    let client = PeerClient::new(config.connect_timeout()?, config.call_timeout()?);
    let dispatcher = Dispatcher::new(
        topology,
        Arc::new(OperationRegistry::standard()),
        Collaborators::from_backend(MockBackend::new()),
        client,
        node_id,
    )
    .context("Failed to create dispatcher")?;

    let front = ServiceFront::new(dispatcher, config.barrier_timeout()?);
    let service = NodeService::bind(&config.server.listen_addr, front, config.server.workers).await?;

    tokio::select! {
        result = service.run() => result,
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for Ctrl-C")?;
            log::info!("Shutting down");
            Ok(())
        }
    }
}

fn print_configuration(config: &Config, topology: &Topology) -> Result<()> {
    println!("Configuration:");
    println!("  Role: {}", topology);
    if let Some(participants) = topology.participants() {
        let names: Vec<&str> = participants.iter().map(String::as_str).collect();
        println!("  Participants: {}", names.join(", "));
    }
    for (i, peer) in topology.peers().iter().enumerate() {
        println!("  Peer {}: {}", i, peer);
    }
    println!();
    println!("{}", config_toml::to_toml_string(config)?);
    Ok(())
}
