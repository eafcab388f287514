//! The preconf oracle binary.

use clap::Parser;
use preconf_oracle_node::{Node, OracleNodeConfig};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(author, version, about = "Off-chain oracle settling builder pre-confirmation commitments")]
struct Cli {
    #[command(flatten)]
    config: OracleNodeConfig,
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    tracing::info!(target: "oracle::node", "starting preconf oracle");

    let node = Node::spawn(cli.config).await?;
    node.run_until_shutdown().await
}
