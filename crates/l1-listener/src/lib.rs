//! The L1 listener walks L1 head, extracts the winning builder of each
//! confirmed block from the header extra-data, and registers winning-builder
//! windows both on-chain and in the store.

mod metrics;
pub use metrics::L1ListenerMetrics;

use alloy_primitives::Address;
use alloy_provider::Provider;
use alloy_rpc_types_eth::Header;
use preconf_oracle_db::{Database, DatabaseError, DatabaseOperations};
use preconf_oracle_primitives::Winner;
use preconf_oracle_transactor::{
    BlockTrackerSession, ChainClient, OracleSession, Transactor, TransactorError,
};
use std::{sync::Arc, time::Duration};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// The main loop interval when the listener is synced to the tip of the L1.
pub const SLOW_SYNC_INTERVAL: Duration = Duration::from_secs(2);

/// The error type for the L1 listener.
#[derive(Debug, thiserror::Error)]
pub enum L1ListenerError {
    /// An RPC error occurred.
    #[error("rpc error: {0}")]
    Rpc(#[from] alloy_transport::RpcError<alloy_transport::TransportErrorKind>),
    /// A transaction submission failed.
    #[error("transactor error: {0}")]
    Transactor(#[from] TransactorError),
    /// A database error occurred.
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),
    /// A block behind the confirmation lag was not returned by the L1.
    #[error("block {0} not found")]
    MissingBlock(u64),
}

/// The L1 access the listener needs.
#[async_trait::async_trait]
pub trait L1Client: Send + Sync {
    /// The current L1 head.
    async fn block_number(&self) -> Result<u64, L1ListenerError>;
    /// The header of the given block.
    async fn header_by_number(&self, block_number: u64) -> Result<Option<Header>, L1ListenerError>;
}

/// An [`L1Client`] over any alloy provider.
#[derive(Debug, Clone)]
pub struct EthL1Client<P>(pub P);

#[async_trait::async_trait]
impl<P: Provider> L1Client for EthL1Client<P> {
    async fn block_number(&self) -> Result<u64, L1ListenerError> {
        Ok(self.0.get_block_number().await?)
    }

    async fn header_by_number(&self, block_number: u64) -> Result<Option<Header>, L1ListenerError> {
        Ok(self.0.get_block_by_number(block_number.into()).await?.map(|block| block.header))
    }
}

/// Resolves builder tags to settlement-chain addresses.
#[async_trait::async_trait]
pub trait BuilderRegistry: Send + Sync {
    /// The settlement-chain address registered for the builder, `None` when
    /// unregistered.
    async fn builder_address(&self, builder_name: &str)
        -> Result<Option<Address>, L1ListenerError>;
}

#[async_trait::async_trait]
impl<C: ChainClient> BuilderRegistry for OracleSession<C> {
    async fn builder_address(
        &self,
        builder_name: &str,
    ) -> Result<Option<Address>, L1ListenerError> {
        Ok(self.get_builder_address(builder_name).await?)
    }
}

/// Records winning builders on the settlement chain.
#[async_trait::async_trait]
pub trait WinnerRecorder: Send + Sync {
    /// Record the winner of the given L1 block.
    async fn record_winner(&self, block_number: u64, builder_name: &str)
        -> Result<(), L1ListenerError>;
}

/// A [`WinnerRecorder`] submitting through the block tracker contract.
#[derive(Debug)]
pub struct BlockTrackerRecorder<C> {
    session: BlockTrackerSession<C>,
    transactor: Arc<Transactor<C>>,
}

impl<C: ChainClient> BlockTrackerRecorder<C> {
    /// Creates a new recorder over the block tracker session.
    pub fn new(session: BlockTrackerSession<C>, transactor: Arc<Transactor<C>>) -> Self {
        Self { session, transactor }
    }
}

#[async_trait::async_trait]
impl<C: ChainClient> WinnerRecorder for BlockTrackerRecorder<C> {
    async fn record_winner(
        &self,
        block_number: u64,
        builder_name: &str,
    ) -> Result<(), L1ListenerError> {
        let opts = self.transactor.suggested_opts().await?;
        let txn = self.session.record_l1_block(opts, block_number, builder_name).await?;
        tracing::debug!(target: "oracle::l1_listener", block_number, builder = builder_name, hash = %txn.hash, "winner recorded on-chain");
        Ok(())
    }
}

/// The configuration of the L1 listener.
#[derive(Debug, Clone)]
pub struct L1ListenerConfig {
    /// The confirmation lag behind L1 head.
    pub lag: u64,
    /// An additional offset subtracted from the observed head, used in
    /// testing to replay deterministic blocks.
    pub laggerd: u64,
    /// The number of L1 blocks per bidding window.
    pub window_size: u64,
    /// When non-empty, winners are assigned round-robin from this table
    /// instead of reading header extra-data.
    pub override_winners: Vec<String>,
}

impl Default for L1ListenerConfig {
    fn default() -> Self {
        Self { lag: 10, laggerd: 0, window_size: 10, override_winners: Vec::new() }
    }
}

/// The L1 listener. Walks the L1 block by block, staying `lag` blocks behind
/// the head, and registers the winning builder of each block.
#[derive(Debug)]
pub struct L1Listener<C, R, T> {
    client: C,
    registry: R,
    recorder: T,
    db: Database,
    config: L1ListenerConfig,
    cursor: Option<u64>,
    metrics: L1ListenerMetrics,
}

impl<C, R, T> L1Listener<C, R, T>
where
    C: L1Client + 'static,
    R: BuilderRegistry + 'static,
    T: WinnerRecorder + 'static,
{
    /// Creates a new listener.
    pub fn new(client: C, registry: R, recorder: T, db: Database, config: L1ListenerConfig) -> Self {
        Self {
            client,
            registry,
            recorder,
            db,
            config,
            cursor: None,
            metrics: L1ListenerMetrics::default(),
        }
    }

    /// Spawns the listener loop.
    pub fn start(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    async fn run(mut self, shutdown: CancellationToken) {
        let mut interval = tokio::time::interval(SLOW_SYNC_INTERVAL);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {}
            }
            // Errors leave the cursor in place; the failed block is retried
            // on the next tick.
            match self.step().await {
                Ok(()) => {}
                Err(L1ListenerError::Database(DatabaseError::WinnerConflict { block_number })) => {
                    tracing::error!(target: "oracle::l1_listener", block_number, "conflicting winner registration, data source inconsistent");
                }
                Err(err) => {
                    tracing::warn!(target: "oracle::l1_listener", ?err, "listener step failed, retrying");
                }
            }
        }
        tracing::info!(target: "oracle::l1_listener", "l1 listener stopped");
    }

    /// A step of work: advance from the cursor up to `head - lag`.
    async fn step(&mut self) -> Result<(), L1ListenerError> {
        let head = self.client.block_number().await?.saturating_sub(self.config.laggerd);
        let target = head.saturating_sub(self.config.lag);

        let cursor = match self.cursor {
            Some(cursor) => cursor,
            None => {
                let last_registered = self.db.last_registered_block().await?;
                let cursor = (last_registered.max(0) as u64).max(target);
                tracing::info!(target: "oracle::l1_listener", cursor, last_registered, "resuming from cursor");
                self.cursor = Some(cursor);
                cursor
            }
        };

        for block_number in (cursor + 1)..=target {
            self.process_block(block_number).await?;
            self.cursor = Some(block_number);
        }
        Ok(())
    }

    async fn process_block(&self, block_number: u64) -> Result<(), L1ListenerError> {
        let Some(builder_name) = self.builder_tag(block_number).await? else {
            return Ok(());
        };

        let Some(builder) = self.registry.builder_address(&builder_name).await? else {
            tracing::warn!(target: "oracle::l1_listener", block_number, builder = %builder_name, "builder not registered in oracle, skipping block");
            self.metrics.skipped_blocks.increment(1);
            return Ok(());
        };

        let window = block_number / self.config.window_size + 1;
        self.recorder.record_winner(block_number, &builder_name).await?;
        self.db
            .register_winner(Winner {
                block_number: block_number as i64,
                builder,
                window: window as i64,
            })
            .await?;

        self.metrics.winners_registered.increment(1);
        self.metrics.last_registered_block.set(block_number as f64);
        tracing::info!(target: "oracle::l1_listener", block_number, builder = %builder_name, window, "winner registered");
        Ok(())
    }

    /// The builder tag of the block: header extra-data interpreted as UTF-8,
    /// or a round-robin entry in override mode. Non-UTF-8 extra-data skips
    /// the block; no heuristic decoding.
    async fn builder_tag(&self, block_number: u64) -> Result<Option<String>, L1ListenerError> {
        if !self.config.override_winners.is_empty() {
            let index = block_number as usize % self.config.override_winners.len();
            return Ok(Some(self.config.override_winners[index].clone()));
        }

        let header = self
            .client
            .header_by_number(block_number)
            .await?
            .ok_or(L1ListenerError::MissingBlock(block_number))?;
        match std::str::from_utf8(&header.extra_data) {
            Ok(tag) => Ok(Some(tag.to_owned())),
            Err(_) => {
                tracing::warn!(target: "oracle::l1_listener", block_number, "non-utf8 extra data, skipping block");
                self.metrics.skipped_blocks.increment(1);
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{address, Bytes};
    use preconf_oracle_db::test_utils::setup_test_db;
    use std::{
        collections::HashMap,
        sync::{
            atomic::{AtomicU64, Ordering},
            Mutex,
        },
    };

    struct MockL1 {
        head: AtomicU64,
        extra: HashMap<u64, Bytes>,
    }

    #[async_trait::async_trait]
    impl L1Client for MockL1 {
        async fn block_number(&self) -> Result<u64, L1ListenerError> {
            Ok(self.head.load(Ordering::SeqCst))
        }

        async fn header_by_number(
            &self,
            block_number: u64,
        ) -> Result<Option<Header>, L1ListenerError> {
            let Some(extra) = self.extra.get(&block_number) else { return Ok(None) };
            let inner = alloy_consensus::Header {
                number: block_number,
                extra_data: extra.clone(),
                ..Default::default()
            };
            Ok(Some(Header { inner, ..Default::default() }))
        }
    }

    struct MockRegistry(HashMap<String, Address>);

    #[async_trait::async_trait]
    impl BuilderRegistry for MockRegistry {
        async fn builder_address(
            &self,
            builder_name: &str,
        ) -> Result<Option<Address>, L1ListenerError> {
            Ok(self.0.get(builder_name).copied())
        }
    }

    #[derive(Default)]
    struct MockRecorder(Mutex<Vec<(u64, String)>>);

    #[async_trait::async_trait]
    impl WinnerRecorder for MockRecorder {
        async fn record_winner(
            &self,
            block_number: u64,
            builder_name: &str,
        ) -> Result<(), L1ListenerError> {
            self.0.lock().unwrap().push((block_number, builder_name.to_owned()));
            Ok(())
        }
    }

    const BUILDER: Address = address!("000000000000000000000000000000000000abcd");

    fn config() -> L1ListenerConfig {
        L1ListenerConfig { lag: 2, laggerd: 0, window_size: 10, override_winners: Vec::new() }
    }

    #[tokio::test]
    async fn test_missing_block_leaves_cursor_in_place() {
        let db = setup_test_db().await;
        let client = MockL1 { head: AtomicU64::new(7), extra: HashMap::new() };
        let registry = MockRegistry(HashMap::new());
        let mut listener =
            L1Listener::new(client, registry, MockRecorder::default(), db, config());

        listener.step().await.unwrap(); // cursor = 5
        listener.client.head.store(8, Ordering::SeqCst);

        // Block 6 is not served by the mock; the step fails and the cursor
        // does not advance, so the block is retried on the next tick.
        assert!(listener.step().await.is_err());
        assert_eq!(listener.cursor, Some(5));
    }

    #[tokio::test]
    async fn test_processes_new_blocks_and_computes_window() {
        let db = setup_test_db().await;
        let client = MockL1 {
            head: AtomicU64::new(7),
            extra: HashMap::from([
                (6, Bytes::from_static(b"builder-a")),
                (7, Bytes::from_static(b"builder-a")),
            ]),
        };
        let registry = MockRegistry(HashMap::from([("builder-a".to_owned(), BUILDER)]));
        let recorder = MockRecorder::default();
        let mut listener = L1Listener::new(client, registry, recorder, db.clone(), config());

        listener.step().await.unwrap(); // cursor = 5
        listener.client.head.store(9, Ordering::SeqCst);
        listener.step().await.unwrap(); // processes 6 and 7

        let winner = db.get_winner(6).await.unwrap().unwrap();
        assert_eq!(winner.builder, BUILDER);
        assert_eq!(winner.window, 1);
        let winner = db.get_winner(7).await.unwrap().unwrap();
        assert_eq!(winner.window, 1);
        assert_eq!(listener.recorder.0.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_skips_unregistered_builder() {
        let db = setup_test_db().await;
        let client = MockL1 {
            head: AtomicU64::new(7),
            extra: HashMap::from([(6, Bytes::from_static(b"unknown-builder"))]),
        };
        let registry = MockRegistry(HashMap::new());
        let mut listener =
            L1Listener::new(client, registry, MockRecorder::default(), db.clone(), config());

        listener.step().await.unwrap();
        listener.client.head.store(8, Ordering::SeqCst);
        listener.step().await.unwrap();

        // The block is skipped with a warning, not retried.
        assert!(db.get_winner(6).await.unwrap().is_none());
        assert_eq!(listener.cursor, Some(6));
    }

    #[tokio::test]
    async fn test_skips_non_utf8_extra_data() {
        let db = setup_test_db().await;
        let client = MockL1 {
            head: AtomicU64::new(7),
            extra: HashMap::from([(6, Bytes::from_static(&[0xff, 0xfe, 0x80]))]),
        };
        let registry = MockRegistry(HashMap::new());
        let mut listener =
            L1Listener::new(client, registry, MockRecorder::default(), db.clone(), config());

        listener.step().await.unwrap();
        listener.client.head.store(8, Ordering::SeqCst);
        listener.step().await.unwrap();

        assert!(db.get_winner(6).await.unwrap().is_none());
        assert_eq!(listener.cursor, Some(6));
    }

    #[tokio::test]
    async fn test_override_winners_round_robin() {
        let db = setup_test_db().await;
        let client = MockL1 { head: AtomicU64::new(7), extra: HashMap::new() };
        let registry = MockRegistry(HashMap::from([
            ("builder-a".to_owned(), BUILDER),
            ("builder-b".to_owned(), address!("000000000000000000000000000000000000abdc")),
        ]));
        let recorder = MockRecorder::default();
        let mut listener = L1Listener::new(
            client,
            registry,
            recorder,
            db.clone(),
            L1ListenerConfig {
                override_winners: vec!["builder-a".to_owned(), "builder-b".to_owned()],
                ..config()
            },
        );

        listener.step().await.unwrap();
        listener.client.head.store(9, Ordering::SeqCst);
        listener.step().await.unwrap(); // processes 6 and 7

        let recorded = listener.recorder.0.lock().unwrap().clone();
        assert_eq!(
            recorded,
            vec![(6, "builder-a".to_owned()), (7, "builder-b".to_owned())]
        );
    }

    #[tokio::test]
    async fn test_resumes_from_last_registered_block() {
        let db = setup_test_db().await;
        db.register_winner(preconf_oracle_primitives::Winner {
            block_number: 20,
            builder: BUILDER,
            window: 3,
        })
        .await
        .unwrap();

        let client = MockL1 { head: AtomicU64::new(10), extra: HashMap::new() };
        let registry = MockRegistry(HashMap::new());
        let mut listener =
            L1Listener::new(client, registry, MockRecorder::default(), db, config());

        listener.step().await.unwrap();
        assert_eq!(listener.cursor, Some(20));
    }

    #[tokio::test]
    async fn test_laggerd_mode_offsets_head() {
        let db = setup_test_db().await;
        let client = MockL1 { head: AtomicU64::new(100), extra: HashMap::new() };
        let registry = MockRegistry(HashMap::new());
        let mut listener = L1Listener::new(
            client,
            registry,
            MockRecorder::default(),
            db,
            L1ListenerConfig { laggerd: 50, ..config() },
        );

        listener.step().await.unwrap();
        assert_eq!(listener.cursor, Some(48));
    }
}
