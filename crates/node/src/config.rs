use alloy_primitives::Address;
use std::path::PathBuf;

/// The configuration of the oracle node.
#[derive(Debug, Clone, clap::Args)]
pub struct OracleNodeConfig {
    /// Database args
    #[command(flatten)]
    pub database: DatabaseArgs,
    /// L1 args
    #[command(flatten)]
    pub l1: L1Args,
    /// Settlement chain args
    #[command(flatten)]
    pub settlement: SettlementArgs,
    /// Contract address args
    #[command(flatten)]
    pub contracts: ContractArgs,
    /// Metrics args
    #[command(flatten)]
    pub metrics: MetricsArgs,
}

/// The database arguments.
#[derive(Debug, Clone, clap::Args)]
pub struct DatabaseArgs {
    /// The database URL (postgres or sqlite).
    #[arg(long = "db.url", env = "ORACLE_DB_URL")]
    pub url: String,
}

/// The L1 arguments.
#[derive(Debug, Clone, clap::Args)]
pub struct L1Args {
    /// The L1 RPC URL.
    #[arg(long = "l1.rpc-url", env = "ORACLE_L1_RPC_URL")]
    pub rpc_url: String,
    /// The confirmation lag behind L1 head.
    #[arg(long = "l1.lag", default_value_t = 10)]
    pub lag: u64,
    /// An offset subtracted from the observed head, used in testing to
    /// replay deterministic blocks.
    #[arg(long = "l1.laggerd-mode", default_value_t = 0)]
    pub laggerd: u64,
    /// The number of L1 blocks per bidding window.
    #[arg(long = "l1.window-size", default_value_t = 10)]
    pub window_size: u64,
    /// Override the winning builders with a round-robin table of builder
    /// addresses.
    #[arg(long = "l1.override-winners", value_delimiter = ',')]
    pub override_winners: Vec<String>,
}

/// The settlement chain arguments.
#[derive(Debug, Clone, clap::Args)]
pub struct SettlementArgs {
    /// The settlement chain RPC URL.
    #[arg(long = "settlement.rpc-url", env = "ORACLE_SETTLEMENT_RPC_URL")]
    pub rpc_url: String,
    /// The file holding the hex-encoded private key of the oracle wallet.
    #[arg(long = "settlement.key-file", env = "ORACLE_KEY_FILE")]
    pub key_file: PathBuf,
}

/// The contract address arguments.
#[derive(Debug, Clone, clap::Args)]
pub struct ContractArgs {
    /// The Oracle contract address.
    #[arg(long = "contracts.oracle", env = "ORACLE_CONTRACT_ADDR")]
    pub oracle: Address,
    /// The commitment store contract address.
    #[arg(long = "contracts.preconf", env = "ORACLE_PRECONF_CONTRACT_ADDR")]
    pub preconf: Address,
    /// The block tracker contract address.
    #[arg(long = "contracts.block-tracker", env = "ORACLE_BLOCK_TRACKER_CONTRACT_ADDR")]
    pub block_tracker: Address,
}

/// The metrics arguments.
#[derive(Debug, Clone, clap::Args)]
pub struct MetricsArgs {
    /// The port the Prometheus metrics endpoint listens on.
    #[arg(long = "metrics.port", default_value_t = 8080)]
    pub port: u16,
}
