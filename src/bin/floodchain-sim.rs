#![forbid(unsafe_code)]
//! Runs a flooding network in-process: registers the nodes, seeds one node with a
//! transaction batch and reports what every node ended up with.

use clap::Parser;
use floodchain::config::{load_config, load_config_from};
use floodchain::simulation::{scenario_transactions, Network};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to a config file (defaults to ./config.toml when present)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Number of nodes to register
    #[arg(long, default_value_t = 8)]
    nodes: usize,
    /// Id of the node that floods the initial transactions
    #[arg(long, default_value_t = 5)]
    origin: u64,
    /// Seconds to let gossip and mining settle
    #[arg(long, default_value_t = 12)]
    settle_secs: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };

    let network = Network::launch(cli.nodes, &config).await?;
    let origin = network
        .node(cli.origin)
        .ok_or_else(|| format!("no node with id {}", cli.origin))?;

    let reachable = network.reachable_from(cli.origin);
    info!(
        "Node {} floods {} transactions; {} of {} nodes are reachable",
        cli.origin,
        scenario_transactions().len(),
        reachable.len(),
        network.nodes().len()
    );
    origin.submit_transactions(scenario_transactions());

    tokio::time::sleep(Duration::from_secs(cli.settle_secs)).await;

    for node in network.nodes() {
        let ledger = node.ledger();
        let stats = node.stats();
        println!(
            "Node {} ({}) state={:?} chain_len={} tip={} valid={} pending={} mined={} relayed={} neighbors={:?}",
            node.id(),
            node.address(),
            node.state(),
            ledger.len(),
            ledger.tip_hash().unwrap_or("-"),
            ledger.validity_check(),
            node.pending_transactions().len(),
            stats.blocks_mined,
            stats.blocks_relayed,
            node.neighbors()
        );
    }

    Ok(())
}
