//! Wiring for the preconf oracle: configuration, client construction,
//! component startup and lifecycle.

mod config;
pub use config::{
    ContractArgs, DatabaseArgs, L1Args, MetricsArgs, OracleNodeConfig, SettlementArgs,
};

use alloy_primitives::{hex, Address};
use alloy_provider::ProviderBuilder;
use alloy_rpc_client::RpcClient;
use alloy_signer_local::PrivateKeySigner;
use alloy_transport::layers::RetryBackoffLayer;
use metrics_exporter_prometheus::PrometheusBuilder;
use preconf_oracle_db::{Database, DatabaseConnectionProvider};
use preconf_oracle_events::{EthLogClient, EventManager, Subscription};
use preconf_oracle_l1_listener::{
    BlockTrackerRecorder, EthL1Client, L1Listener, L1ListenerConfig,
};
use preconf_oracle_migration::{Migrator, MigratorTrait};
use preconf_oracle_settler::Settler;
use preconf_oracle_transactor::{
    BlockTrackerSession, EthChainClient, OracleSession, Transactor,
};
use preconf_oracle_updater::{EthBlockClient, Updater};
use std::{net::SocketAddr, str::FromStr, sync::Arc, time::Duration};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// The grace period workers get to wind down on shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// The retry layer parameters for both RPC clients: max retries, initial
/// backoff in milliseconds, compute units per second.
const RPC_RETRIES: u32 = 10;
const RPC_INITIAL_BACKOFF_MS: u64 = 100;
const RPC_COMPUTE_UNITS: u64 = 330;

/// A running oracle node.
#[derive(Debug)]
pub struct Node {
    shutdown: CancellationToken,
    fatal: CancellationToken,
    workers: Vec<(&'static str, JoinHandle<()>)>,
    db: Database,
}

impl Node {
    /// Open the database, dial both chains, and start all workers.
    pub async fn spawn(config: OracleNodeConfig) -> eyre::Result<Self> {
        let shutdown = CancellationToken::new();
        let fatal = CancellationToken::new();
        let mut workers = Vec::new();

        // Database first; everything else persists through it.
        let db = Database::new(&config.database.url).await?;
        Migrator::up(db.get_connection(), None).await?;

        // The oracle wallet.
        let key = std::fs::read_to_string(&config.settlement.key_file)?.trim().to_owned();
        let key = key.strip_prefix("0x").unwrap_or(&key);
        let signer = PrivateKeySigner::from_slice(&hex::decode(key)?)?;
        let owner = signer.address();

        // Both RPC clients carry a retry/backoff layer.
        let l1_client = RpcClient::builder()
            .layer(RetryBackoffLayer::new(RPC_RETRIES, RPC_INITIAL_BACKOFF_MS, RPC_COMPUTE_UNITS))
            .http(config.l1.rpc_url.parse()?);
        let l1_provider = ProviderBuilder::new().connect_client(l1_client);

        let settlement_client = RpcClient::builder()
            .layer(RetryBackoffLayer::new(RPC_RETRIES, RPC_INITIAL_BACKOFF_MS, RPC_COMPUTE_UNITS))
            .http(config.settlement.rpc_url.parse()?);
        // Nonces and fees are set explicitly by the transactor; the provider
        // only signs and estimates gas.
        let settlement_provider = ProviderBuilder::new()
            .disable_recommended_fillers()
            .fetch_chain_id()
            .with_gas_estimation()
            .wallet(signer)
            .connect_client(settlement_client);

        tracing::info!(target: "oracle::node", owner = %owner, "connected to settlement chain and L1");

        let transactor = Arc::new(
            Transactor::new(EthChainClient(settlement_provider.clone()), db.clone(), owner)
                .await?,
        );

        // In override mode the builder mapping is registered up front so the
        // listener can resolve the round-robin winners.
        let oracle_session = OracleSession::new(transactor.clone(), config.contracts.oracle);
        for winner in &config.l1.override_winners {
            let address = Address::from_str(winner)?;
            let opts = transactor.suggested_opts().await?;
            let txn = oracle_session.add_builder_address(opts, winner, address).await?;
            tracing::info!(target: "oracle::node", builder = %winner, hash = %txn.hash, "builder mapping set");
        }

        // Event manager with the updater's handlers.
        let event_manager = EventManager::new(
            EthLogClient(settlement_provider.clone()),
            db.clone(),
            vec![config.contracts.preconf],
        );
        let updater = Updater::new(EthBlockClient(l1_provider.clone()), db.clone());
        let (enc_handler, commit_handler) = updater.handlers();
        let enc_subscription = event_manager.subscribe(Arc::new(enc_handler));
        let commit_subscription = event_manager.subscribe(Arc::new(commit_handler));
        workers.push((
            "subscription_watch",
            spawn_subscription_watch(enc_subscription, commit_subscription, shutdown.child_token()),
        ));
        workers.push(("event_manager", event_manager.start(shutdown.child_token())));
        workers.push(("updater", updater.start(shutdown.child_token())));

        // L1 listener.
        let listener = L1Listener::new(
            EthL1Client(l1_provider),
            OracleSession::new(transactor.clone(), config.contracts.oracle),
            BlockTrackerRecorder::new(
                BlockTrackerSession::new(transactor.clone(), config.contracts.block_tracker),
                transactor.clone(),
            ),
            db.clone(),
            L1ListenerConfig {
                lag: config.l1.lag,
                laggerd: config.l1.laggerd,
                window_size: config.l1.window_size,
                override_winners: config.l1.override_winners.clone(),
            },
        );
        workers.push(("l1_listener", listener.start(shutdown.child_token())));

        // Settler. A fatal settler error propagates to process exit.
        let settler = Settler::new(
            OracleSession::new(transactor.clone(), config.contracts.oracle),
            transactor,
            db.clone(),
        );
        let settler_handle = settler.start(shutdown.child_token());
        let settler_fatal = fatal.clone();
        workers.push((
            "settler",
            tokio::spawn(async move {
                match settler_handle.await {
                    Ok(Ok(())) => {}
                    Ok(Err(err)) => {
                        tracing::error!(target: "oracle::node", ?err, "settler failed fatally");
                        settler_fatal.cancel();
                    }
                    Err(err) => {
                        tracing::error!(target: "oracle::node", ?err, "settler panicked");
                        settler_fatal.cancel();
                    }
                }
            }),
        ));

        // Metrics endpoint.
        let metrics_addr = SocketAddr::from(([0, 0, 0, 0], config.metrics.port));
        PrometheusBuilder::new().with_http_listener(metrics_addr).install()?;
        tracing::info!(target: "oracle::node", %metrics_addr, "metrics endpoint up");

        Ok(Self { shutdown, fatal, workers, db })
    }

    /// Block until a shutdown signal or a fatal settler failure, then wind
    /// everything down within the shutdown grace period, closing the
    /// database last.
    pub async fn run_until_shutdown(self) -> eyre::Result<()> {
        let fatal = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!(target: "oracle::node", "shutdown signal received");
                false
            }
            _ = self.fatal.cancelled() => true,
        };

        self.close().await?;
        if fatal {
            eyre::bail!("settler failed fatally");
        }
        Ok(())
    }

    async fn close(self) -> eyre::Result<()> {
        self.shutdown.cancel();

        let workers = self.workers;
        let wind_down = async move {
            for (worker, handle) in workers {
                if let Err(err) = handle.await {
                    tracing::error!(target: "oracle::node", worker, ?err, "worker exited abnormally");
                }
            }
        };
        if tokio::time::timeout(SHUTDOWN_GRACE, wind_down).await.is_err() {
            tracing::error!(target: "oracle::node", "timeout waiting for workers to close");
        } else {
            tracing::info!(target: "oracle::node", "all workers closed");
        }

        self.db.close().await?;
        Ok(())
    }
}

/// Surfaces transport faults from the updater's event subscriptions in the
/// logs; the event manager reconnects on its own and the store keeps
/// delivery idempotent.
fn spawn_subscription_watch(
    mut enc_subscription: Subscription,
    mut commit_subscription: Subscription,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                err = enc_subscription.recv_error() => match err {
                    Some(err) => tracing::error!(target: "oracle::node", ?err, "encrypted commitment subscription fault"),
                    None => break,
                },
                err = commit_subscription.recv_error() => match err {
                    Some(err) => tracing::error!(target: "oracle::node", ?err, "commitment subscription fault"),
                    None => break,
                },
            }
        }
    })
}
