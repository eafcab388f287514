//! The settler drains the settlement queue, submits reward/slash and return
//! transactions with strictly monotonic nonces, and confirms inclusion by
//! watching the settlement-chain account nonce.

mod metrics;
pub use metrics::SettlerMetrics;

use alloy_primitives::B256;
use preconf_oracle_db::{Database, DatabaseError, DatabaseOperations};
use preconf_oracle_primitives::{ReturnBatch, Settlement, SettlementType};
use preconf_oracle_transactor::{
    ChainClient, OracleSession, SubmittedTxn, Transactor, TransactorError, TxnOpts,
};
use std::{
    collections::VecDeque,
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::{
    sync::Mutex,
    task::{JoinHandle, JoinSet},
};
use tokio_util::sync::CancellationToken;

/// The maximum number of submitted-but-unconfirmed transactions before
/// submission pauses.
pub const ALLOWED_PENDING_TXN_COUNT: u64 = 128;

/// The maximum number of bid identifiers unlocked in one transaction.
pub const RETURN_BATCH_SIZE: usize = 10;

/// The confirmer tick interval.
const CONFIRMER_INTERVAL: Duration = Duration::from_millis(500);

/// The delay before a failed executor re-subscribes, and before the task
/// group restarts after an error.
#[cfg(not(test))]
const RESTART_DELAY: Duration = Duration::from_secs(5);
/// The delay before a failed executor re-subscribes, and before the task
/// group restarts after an error.
#[cfg(test)]
const RESTART_DELAY: Duration = Duration::from_millis(50);

/// The number of task-group restarts within [`RESTART_WINDOW`] after which
/// the settler gives up and surfaces a fatal error.
const MAX_RESTARTS: usize = 5;

/// The accounting window for [`MAX_RESTARTS`].
const RESTART_WINDOW: Duration = Duration::from_secs(60);

/// The error type for the settler.
#[derive(Debug, thiserror::Error)]
pub enum SettlerError {
    /// A transaction submission failed.
    #[error("transactor error: {0}")]
    Transactor(#[from] TransactorError),
    /// A database error occurred.
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),
    /// Too many submitted transactions are awaiting confirmation.
    #[error("too many pending transactions: {0}")]
    TooManyPending(u64),
    /// The task group restarted too often within a minute.
    #[error("settler task group restarted too often")]
    TooManyRestarts,
}

/// The settlement-chain contract surface the settler drives.
#[async_trait::async_trait]
pub trait SettlementContract: Send + Sync {
    /// Settle a builder commitment.
    #[allow(clippy::too_many_arguments)]
    async fn process_builder_commitment(
        &self,
        opts: TxnOpts,
        commitment_index: B256,
        block_number: u64,
        builder: &str,
        is_slash: bool,
        decay_percentage: u64,
        window: u64,
    ) -> Result<SubmittedTxn, TransactorError>;

    /// Unlock the funds behind a batch of bids.
    async fn unlock_funds(
        &self,
        opts: TxnOpts,
        bid_ids: Vec<B256>,
    ) -> Result<SubmittedTxn, TransactorError>;
}

#[async_trait::async_trait]
impl<C: ChainClient> SettlementContract for OracleSession<C> {
    async fn process_builder_commitment(
        &self,
        opts: TxnOpts,
        commitment_index: B256,
        block_number: u64,
        builder: &str,
        is_slash: bool,
        decay_percentage: u64,
        window: u64,
    ) -> Result<SubmittedTxn, TransactorError> {
        Self::process_builder_commitment(
            self,
            opts,
            commitment_index,
            block_number,
            builder,
            is_slash,
            decay_percentage,
            window,
        )
        .await
    }

    async fn unlock_funds(
        &self,
        opts: TxnOpts,
        bid_ids: Vec<B256>,
    ) -> Result<SubmittedTxn, TransactorError> {
        Self::unlock_funds(self, opts, bid_ids).await
    }
}

/// The settler runs three supervised tasks: the settlement executor, the
/// return executor, and the confirmer. The first error cancels the group,
/// which restarts after [`RESTART_DELAY`]; persistent failures surface as
/// [`SettlerError::TooManyRestarts`].
#[derive(Debug)]
pub struct Settler<C, O> {
    oracle: O,
    transactor: Arc<Transactor<C>>,
    db: Database,
    /// Serializes nonce allocation across the two executors. The critical
    /// section spans the pending-count gate, the submission and the
    /// settlement-initiated write.
    tx_mtx: Mutex<()>,
    metrics: SettlerMetrics,
}

impl<C, O> Settler<C, O>
where
    C: ChainClient + 'static,
    O: SettlementContract + 'static,
{
    /// Creates a new settler.
    pub fn new(oracle: O, transactor: Arc<Transactor<C>>, db: Database) -> Self {
        Self { oracle, transactor, db, tx_mtx: Mutex::new(()), metrics: SettlerMetrics::default() }
    }

    /// Spawns the supervised task group.
    pub fn start(self, shutdown: CancellationToken) -> JoinHandle<Result<(), SettlerError>> {
        let settler = Arc::new(self);
        tokio::spawn(settler.supervise(shutdown))
    }

    async fn supervise(self: Arc<Self>, shutdown: CancellationToken) -> Result<(), SettlerError> {
        let mut restarts: VecDeque<Instant> = VecDeque::new();
        loop {
            if shutdown.is_cancelled() {
                return Ok(());
            }

            let group = shutdown.child_token();
            let mut tasks: JoinSet<(&'static str, Result<(), SettlerError>)> = JoinSet::new();
            {
                let settler = self.clone();
                let token = group.clone();
                tasks.spawn(async move {
                    ("settlement_executor", settler.settlement_executor(token).await)
                });
            }
            {
                let settler = self.clone();
                let token = group.clone();
                tasks.spawn(
                    async move { ("return_executor", settler.return_executor(token).await) },
                );
            }
            {
                let settler = self.clone();
                let token = group.clone();
                tasks.spawn(async move { ("confirmer", settler.confirmer(token).await) });
            }

            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok((_, Ok(()))) => {}
                    Ok((task, Err(err))) => {
                        tracing::error!(target: "oracle::settler", task, ?err, "settler task failed, cancelling group");
                        group.cancel();
                    }
                    Err(err) => {
                        tracing::error!(target: "oracle::settler", ?err, "settler task panicked, cancelling group");
                        group.cancel();
                    }
                }
            }

            if shutdown.is_cancelled() {
                tracing::info!(target: "oracle::settler", "settler stopped");
                return Ok(());
            }

            let now = Instant::now();
            restarts.push_back(now);
            while restarts.front().is_some_and(|at| now.duration_since(*at) > RESTART_WINDOW) {
                restarts.pop_front();
            }
            if restarts.len() >= MAX_RESTARTS {
                tracing::error!(target: "oracle::settler", restarts = restarts.len(), "settler restarting too often, giving up");
                return Err(SettlerError::TooManyRestarts);
            }

            tracing::warn!(target: "oracle::settler", "restarting settler tasks");
            tokio::select! {
                _ = shutdown.cancelled() => return Ok(()),
                _ = tokio::time::sleep(RESTART_DELAY) => {}
            }
        }
    }

    /// Task A: drain pending non-return settlements. On a processing error
    /// the subscription is dropped and re-established after a delay; the
    /// store redelivers everything still pending.
    async fn settlement_executor(
        self: Arc<Self>,
        shutdown: CancellationToken,
    ) -> Result<(), SettlerError> {
        loop {
            let mut settlements = self.db.subscribe_settlements(shutdown.child_token());
            let result: Result<(), SettlerError> = loop {
                tokio::select! {
                    _ = shutdown.cancelled() => return Ok(()),
                    settlement = settlements.recv() => match settlement {
                        None => break Ok(()),
                        Some(settlement) => {
                            if let Err(err) = self.process_settlement(&settlement).await {
                                break Err(err);
                            }
                        }
                    }
                }
            };
            if let Err(err) = result {
                tracing::error!(target: "oracle::settler", ?err, "failed to process builder commitment");
            }
            drop(settlements);
            tokio::select! {
                _ = shutdown.cancelled() => return Ok(()),
                _ = tokio::time::sleep(RESTART_DELAY) => {}
            }
        }
    }

    async fn process_settlement(&self, settlement: &Settlement) -> Result<(), SettlerError> {
        let _guard = self.tx_mtx.lock().await;

        let pending = self.db.pending_txn_count().await?;
        if pending > ALLOWED_PENDING_TXN_COUNT {
            return Err(SettlerError::TooManyPending(pending));
        }

        let opts = self.transactor.suggested_opts().await?;
        let txn = self
            .oracle
            .process_builder_commitment(
                opts,
                settlement.commitment_index,
                settlement.block_number as u64,
                &settlement.builder.to_string(),
                settlement.settlement_type == SettlementType::Slash,
                settlement.decay_percentage as u64,
                settlement.window as u64,
            )
            .await?;

        self.db
            .settlement_initiated(&[settlement.commitment_index], txn.hash, txn.nonce as i64)
            .await?;

        self.metrics.last_used_nonce.set(txn.nonce as f64);
        self.metrics.settlements_posted.increment(1);
        self.metrics.current_settlement_l1_block.set(settlement.block_number as f64);
        tracing::info!(
            target: "oracle::settler",
            block_number = settlement.block_number,
            tx_hash = %txn.hash,
            builder = %settlement.builder,
            settlement_type = %settlement.settlement_type,
            nonce = txn.nonce,
            "builder commitment processed"
        );
        Ok(())
    }

    /// Task B: drain return-type settlements in batches.
    async fn return_executor(
        self: Arc<Self>,
        shutdown: CancellationToken,
    ) -> Result<(), SettlerError> {
        loop {
            let mut returns = self.db.subscribe_returns(shutdown.child_token(), RETURN_BATCH_SIZE);
            let result: Result<(), SettlerError> = loop {
                tokio::select! {
                    _ = shutdown.cancelled() => return Ok(()),
                    batch = returns.recv() => match batch {
                        None => break Ok(()),
                        Some(batch) => {
                            if let Err(err) = self.process_returns(&batch).await {
                                break Err(err);
                            }
                        }
                    }
                }
            };
            if let Err(err) = result {
                tracing::error!(target: "oracle::settler", ?err, "failed to process return");
            }
            drop(returns);
            tokio::select! {
                _ = shutdown.cancelled() => return Ok(()),
                _ = tokio::time::sleep(RESTART_DELAY) => {}
            }
        }
    }

    async fn process_returns(&self, batch: &ReturnBatch) -> Result<(), SettlerError> {
        let _guard = self.tx_mtx.lock().await;

        let pending = self.db.pending_txn_count().await?;
        if pending > ALLOWED_PENDING_TXN_COUNT {
            return Err(SettlerError::TooManyPending(pending));
        }

        tracing::debug!(target: "oracle::settler", bid_ids = %batch, count = batch.bid_ids.len(), "processing return");

        let opts = self.transactor.suggested_opts().await?;
        let txn = self.oracle.unlock_funds(opts, batch.bid_ids.clone()).await?;

        self.db
            .settlement_initiated(&batch.commitment_indices, txn.hash, txn.nonce as i64)
            .await?;

        self.metrics.last_used_nonce.set(txn.nonce as f64);
        self.metrics.settlements_posted.increment(1);
        tracing::info!(
            target: "oracle::settler",
            tx_hash = %txn.hash,
            batch_size = batch.bid_ids.len(),
            nonce = txn.nonce,
            "builder return processed"
        );
        Ok(())
    }

    /// Task C: advance submitted settlements to confirmed by watching the
    /// account nonce at head.
    async fn confirmer(self: Arc<Self>, shutdown: CancellationToken) -> Result<(), SettlerError> {
        let mut interval = tokio::time::interval(CONFIRMER_INTERVAL);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut last_block = 0;
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return Ok(()),
                _ = interval.tick() => {}
            }
            if let Some(block_number) = self.confirm_once(last_block).await {
                last_block = block_number;
            }
        }
    }

    /// A confirmation pass; skipped when the head has not advanced. Errors
    /// are transient and logged.
    async fn confirm_once(&self, last_block: u64) -> Option<u64> {
        let head = match self.transactor.block_number().await {
            Ok(head) => head,
            Err(err) => {
                tracing::warn!(target: "oracle::settler", ?err, "failed to get block number");
                return None;
            }
        };
        if head <= last_block {
            return None;
        }

        let confirmed_nonce = match self.transactor.nonce_at(head).await {
            Ok(nonce) => nonce as i64,
            Err(err) => {
                tracing::warn!(target: "oracle::settler", ?err, "failed to get account nonce");
                return None;
            }
        };

        let count = match self.db.mark_settlement_complete(confirmed_nonce).await {
            Ok(count) => count,
            Err(err) => {
                tracing::warn!(target: "oracle::settler", ?err, "failed to mark settlements complete");
                return None;
            }
        };

        self.metrics.last_confirmed_nonce.set(confirmed_nonce as f64);
        self.metrics.last_confirmed_block.set(head as f64);
        self.metrics.settlements_confirmed.increment(count);
        if count > 0 {
            tracing::info!(target: "oracle::settler", count, confirmed_nonce, "marked settlements complete");
        }
        Some(head)
    }
}
