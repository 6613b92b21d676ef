//! fedtree federator daemon

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use fedtree_runtime::{init_logging, Federator, FederatorConfig};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the federator TOML config
    #[arg(short, long)]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = FederatorConfig::load(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    init_logging(&config.logging);

    let federator = Federator::start(&config)
        .await
        .context("starting federator")?;
    tracing::info!(id = %federator.id(), addr = %federator.local_addr(), "listening");

    federator.run().await.context("federator stopped")?;
    Ok(())
}
