// src/main.rs
//
// Bootstrap: open the data directory, wire a durable node, and drive the
// miner tick loop. Servers, wallets and P2P are separate adapters; the
// binary only needs the core.

use std::fs;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use minichain::genesis;
use minichain::node::{Node, NodeConfig};
use minichain::producer::ProduceError;

#[derive(Parser, Debug)]
#[command(name = "minichain", about = "Minimal account-based PoW blockchain node")]
struct Cli {
    /// Data directory (chain database + genesis-alloc.json).
    #[arg(long, default_value = "./chain-data")]
    data_dir: PathBuf,

    /// Delete the chain database before starting.
    #[arg(long)]
    reset: bool,

    /// Required leading zero bits for PoW; 0 disables mining work.
    #[arg(long)]
    difficulty_bits: Option<i64>,

    #[arg(long)]
    max_tx_per_block: Option<usize>,

    /// Nonce attempts per tick before giving up.
    #[arg(long)]
    max_pow_tries: Option<u64>,

    /// Address credited with block rewards and fees.
    #[arg(long)]
    miner: Option<String>,

    /// Base block reward in minor units.
    #[arg(long)]
    block_reward: Option<i64>,

    /// Milliseconds between production attempts.
    #[arg(long, default_value_t = 1_000)]
    tick_ms: u64,

    /// Keep producing blocks until killed; otherwise run a single tick.
    #[arg(long)]
    keep_alive: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    if cli.reset {
        let chain_dir = cli.data_dir.join("chain");
        if chain_dir.exists() {
            fs::remove_dir_all(&chain_dir)
                .with_context(|| format!("resetting {}", chain_dir.display()))?;
            info!("removed existing chain database");
        }
    }
    fs::create_dir_all(&cli.data_dir)
        .with_context(|| format!("creating {}", cli.data_dir.display()))?;

    let mut config = NodeConfig::default_local();
    if let Some(bits) = cli.difficulty_bits {
        config.difficulty_bits = bits;
    }
    if let Some(max) = cli.max_tx_per_block {
        config.max_tx_per_block = max;
    }
    if let Some(tries) = cli.max_pow_tries {
        config.max_pow_tries = tries;
    }
    if let Some(miner) = &cli.miner {
        config.miner_address = Some(miner.clone());
    }
    if let Some(reward) = cli.block_reward {
        config.block_reward_minor = reward.max(0);
    }

    let alloc_path = cli.data_dir.join("genesis-alloc.json");
    let stored = genesis::load_allocations(&alloc_path)?;
    if let Some(allocations) = &stored {
        config.genesis_allocations = allocations.clone();
    }

    let node = Node::durable(config.clone(), &cli.data_dir)
        .with_context(|| format!("opening chain database in {}", cli.data_dir.display()))?;

    // First boot without an allocation file: persist the defaults so the
    // operator can see and edit what genesis was seeded from.
    if stored.is_none() && node.chain().get_head()?.is_none() {
        genesis::save_allocations(&alloc_path, &config.genesis_allocations)?;
        info!(path = %alloc_path.display(), "wrote default genesis allocations");
    }

    node.start().context("startup failed (genesis/replay)")?;

    let head = node.chain().get_head()?.expect("head exists after start");
    let height = node.chain().get_height(&head)?.unwrap_or(0);
    info!(height, head = %hex::encode(head), "node started");
    if let Some(miner) = &config.miner_address {
        info!(
            miner,
            reward = config.block_reward_minor,
            "mining rewards enabled"
        );
    }

    if cli.keep_alive {
        info!(tick_ms = cli.tick_ms, "producing blocks; press CTRL+C to exit");
        loop {
            run_tick(&node)?;
            thread::sleep(Duration::from_millis(cli.tick_ms));
        }
    } else {
        run_tick(&node)?;
        node.close()?;
    }
    Ok(())
}

fn run_tick(node: &Node) -> Result<()> {
    match node.tick() {
        Ok(Some(_)) | Ok(None) => Ok(()),
        // Corrupted balances mean we must stop producing, not limp on.
        Err(ProduceError::State(e)) => {
            error!("fatal state error during tick: {}", e);
            let _ = node.close();
            bail!("fatal state error: {}", e);
        }
        Err(e) => {
            warn!("tick failed: {}", e);
            Ok(())
        }
    }
}
