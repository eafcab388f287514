//! The updater consumes commitment events, matches them against L1 block
//! contents, computes decay, and enqueues settlements.

mod handlers;
pub use handlers::{CommitmentHandler, EncryptedCommitmentHandler};

mod metrics;
pub use metrics::UpdaterMetrics;

use alloy_primitives::B256;
use alloy_provider::Provider;
use alloy_rpc_types_eth::Block;
use preconf_oracle_contracts::PreconfManager;
use preconf_oracle_db::{Database, DatabaseError, DatabaseOperations};
use preconf_oracle_primitives::{
    EncryptedCommitment, Settlement, SettlementStatus, SettlementType,
};
use std::{collections::HashMap, time::Duration};
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;

/// The number of blocks a commitment waits for its winner registration
/// before it is dropped.
pub const COMMITMENT_WAIT_HORIZON: i64 = 256;

/// The retry interval for commitments waiting on winner registration.
#[cfg(not(test))]
const WAITLIST_RETRY_INTERVAL: Duration = Duration::from_secs(2);
/// The retry interval for commitments waiting on winner registration.
#[cfg(test)]
const WAITLIST_RETRY_INTERVAL: Duration = Duration::from_millis(50);

/// The buffer size of the handler-to-worker channels.
const CHANNEL_BUFFER: usize = 16;

/// The error type for the updater.
#[derive(Debug, thiserror::Error)]
pub enum UpdaterError {
    /// An RPC error occurred.
    #[error("rpc error: {0}")]
    Rpc(#[from] alloy_transport::RpcError<alloy_transport::TransportErrorKind>),
    /// A database error occurred.
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),
    /// The committed L1 block was not returned by the L1 client.
    #[error("block {0} not found")]
    MissingBlock(u64),
    /// The claimed transaction hashes did not parse.
    #[error("invalid txn hash in commitment: {0}")]
    InvalidTxnHash(String),
}

impl UpdaterError {
    /// Whether the commitment should be retried rather than dropped.
    const fn is_transient(&self) -> bool {
        matches!(self, Self::Rpc(_) | Self::Database(_) | Self::MissingBlock(_))
    }
}

/// The L1 access the updater needs.
#[async_trait::async_trait]
pub trait BlockClient: Send + Sync {
    /// The block with the given number, transaction hashes included.
    async fn block_by_number(&self, block_number: u64) -> Result<Option<Block>, UpdaterError>;
}

/// A [`BlockClient`] over any alloy provider.
#[derive(Debug, Clone)]
pub struct EthBlockClient<P>(pub P);

#[async_trait::async_trait]
impl<P: Provider> BlockClient for EthBlockClient<P> {
    async fn block_by_number(&self, block_number: u64) -> Result<Option<Block>, UpdaterError> {
        Ok(self.0.get_block_by_number(block_number.into()).await?)
    }
}

/// The updater wires two event handlers to two worker tasks: one persisting
/// encrypted commitments, one deriving settlements from plaintext
/// commitments.
#[derive(Debug)]
pub struct Updater<C> {
    l1: C,
    db: Database,
    enc_tx: mpsc::Sender<PreconfManager::EncryptedCommitmentStored>,
    enc_rx: mpsc::Receiver<PreconfManager::EncryptedCommitmentStored>,
    commit_tx: mpsc::Sender<PreconfManager::CommitmentStored>,
    commit_rx: mpsc::Receiver<PreconfManager::CommitmentStored>,
    metrics: UpdaterMetrics,
}

impl<C> Updater<C>
where
    C: BlockClient + 'static,
{
    /// Creates a new updater over the provided L1 client and store.
    pub fn new(l1: C, db: Database) -> Self {
        let (enc_tx, enc_rx) = mpsc::channel(CHANNEL_BUFFER);
        let (commit_tx, commit_rx) = mpsc::channel(CHANNEL_BUFFER);
        Self {
            l1,
            db,
            enc_tx,
            enc_rx,
            commit_tx,
            commit_rx,
            metrics: UpdaterMetrics::default(),
        }
    }

    /// The event handlers to register with the event manager.
    pub fn handlers(&self) -> (EncryptedCommitmentHandler, CommitmentHandler) {
        (
            EncryptedCommitmentHandler { sender: self.enc_tx.clone() },
            CommitmentHandler { sender: self.commit_tx.clone() },
        )
    }

    /// Spawns the two worker tasks.
    pub fn start(self, shutdown: CancellationToken) -> JoinHandle<()> {
        let Self { l1, db, enc_rx, commit_rx, metrics, .. } = self;
        let encrypted =
            EncryptedWorker { db: db.clone(), metrics: metrics.clone() };
        let commitments = CommitmentWorker { l1, db, waitlist: HashMap::new(), metrics };
        tokio::spawn(async move {
            let enc_task = tokio::spawn(encrypted.run(enc_rx, shutdown.clone()));
            let commit_task = tokio::spawn(commitments.run(commit_rx, shutdown));
            let _ = tokio::join!(enc_task, commit_task);
            tracing::info!(target: "oracle::updater", "updater stopped");
        })
    }
}

struct EncryptedWorker {
    db: Database,
    metrics: UpdaterMetrics,
}

impl EncryptedWorker {
    async fn run(
        self,
        mut rx: mpsc::Receiver<PreconfManager::EncryptedCommitmentStored>,
        shutdown: CancellationToken,
    ) {
        loop {
            let event = tokio::select! {
                _ = shutdown.cancelled() => break,
                event = rx.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };

            let commitment = EncryptedCommitment {
                commitment_index: event.commitmentIndex,
                committer: event.committer,
                digest: event.commitmentDigest,
                signature: event.commitmentSignature.to_vec(),
                committed_at_block: event.committedAt.saturating_to::<i64>(),
            };
            match self.db.add_encrypted_commitment(commitment).await {
                Ok(()) => self.metrics.encrypted_commitments_stored.increment(1),
                Err(err) => {
                    tracing::error!(target: "oracle::updater", ?err, commitment_index = %event.commitmentIndex, "failed to store encrypted commitment");
                }
            }
        }
    }
}

enum Outcome {
    Settled(SettlementType),
    AlreadySettled,
    Deferred,
}

struct CommitmentWorker<C> {
    l1: C,
    db: Database,
    /// Commitments waiting on winner registration or a transient failure,
    /// keyed by target L1 block.
    waitlist: HashMap<u64, Vec<PreconfManager::CommitmentStored>>,
    metrics: UpdaterMetrics,
}

impl<C: BlockClient> CommitmentWorker<C> {
    async fn run(
        mut self,
        mut rx: mpsc::Receiver<PreconfManager::CommitmentStored>,
        shutdown: CancellationToken,
    ) {
        let mut retry = tokio::time::interval(WAITLIST_RETRY_INTERVAL);
        retry.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                event = rx.recv() => match event {
                    Some(event) => self.handle_commitment(event).await,
                    None => break,
                },
                _ = retry.tick() => self.drain_waitlist().await,
            }
        }
    }

    async fn handle_commitment(&mut self, commitment: PreconfManager::CommitmentStored) {
        let commitment_index = commitment.commitmentIndex;
        let block_number = commitment.blockNumber.saturating_to::<u64>();
        match self.process_commitment(&commitment).await {
            Ok(Outcome::Settled(settlement_type)) => {
                self.metrics.commitments_processed.increment(1);
                match settlement_type {
                    SettlementType::Reward => self.metrics.rewards.increment(1),
                    SettlementType::Slash => self.metrics.slashes.increment(1),
                    SettlementType::Return => self.metrics.returns.increment(1),
                }
                tracing::info!(target: "oracle::updater", commitment_index = %commitment_index, block_number, settlement_type = %settlement_type, "settlement enqueued");
            }
            Ok(Outcome::AlreadySettled) => {
                tracing::debug!(target: "oracle::updater", commitment_index = %commitment_index, "commitment already settled");
            }
            Ok(Outcome::Deferred) => {
                tracing::debug!(target: "oracle::updater", commitment_index = %commitment_index, block_number, "no winner registered yet, deferring");
                self.waitlist.entry(block_number).or_default().push(commitment);
            }
            Err(err) if err.is_transient() => {
                tracing::warn!(target: "oracle::updater", ?err, commitment_index = %commitment_index, "transient failure, retrying commitment");
                self.waitlist.entry(block_number).or_default().push(commitment);
            }
            Err(err) => {
                self.metrics.commitments_dropped.increment(1);
                tracing::error!(target: "oracle::updater", ?err, commitment_index = %commitment_index, "dropping commitment");
            }
        }
    }

    async fn process_commitment(
        &self,
        commitment: &PreconfManager::CommitmentStored,
    ) -> Result<Outcome, UpdaterError> {
        let commitment_index = commitment.commitmentIndex;
        if self.db.is_settled(commitment_index).await? {
            return Ok(Outcome::AlreadySettled);
        }

        let block_number = commitment.blockNumber.saturating_to::<i64>();
        let Some(winner) = self.db.get_winner(block_number).await? else {
            return Ok(Outcome::Deferred);
        };

        // The encrypted commitment precedes the plaintext one but is never
        // required; a digest mismatch is logged and does not change the
        // decision.
        if let Some(encrypted) = self.db.get_encrypted_commitment(commitment_index).await? {
            if encrypted.digest != commitment.commitmentHash {
                tracing::warn!(target: "oracle::updater", commitment_index = %commitment_index, digest = %encrypted.digest, commitment_hash = %commitment.commitmentHash, "encrypted commitment digest mismatch");
            }
        }

        if winner.builder != commitment.committer {
            self.add_settlement(commitment, SettlementType::Return, 0, winner.window).await?;
            return Ok(Outcome::Settled(SettlementType::Return));
        }

        let block = self
            .l1
            .block_by_number(block_number as u64)
            .await?
            .ok_or(UpdaterError::MissingBlock(block_number as u64))?;

        let claimed = parse_txn_hashes(&commitment.txnHash)?;
        let block_hashes = block.transactions.hashes().collect::<Vec<_>>();
        let included = is_ordered_subsequence(&claimed, &block_hashes);

        let (settlement_type, decay) = if included {
            let decay = decay_percentage(
                block.header.timestamp,
                commitment.decayStartTimeStamp,
                commitment.decayEndTimeStamp,
            );
            (SettlementType::Reward, decay)
        } else {
            (SettlementType::Slash, 0)
        };

        self.add_settlement(commitment, settlement_type, decay, winner.window).await?;
        Ok(Outcome::Settled(settlement_type))
    }

    async fn add_settlement(
        &self,
        commitment: &PreconfManager::CommitmentStored,
        settlement_type: SettlementType,
        decay_percentage: i64,
        window: i64,
    ) -> Result<(), UpdaterError> {
        self.db
            .add_settlement(Settlement {
                commitment_index: commitment.commitmentIndex,
                transaction_hash: commitment.txnHash.clone(),
                block_number: commitment.blockNumber.saturating_to::<i64>(),
                builder: commitment.committer,
                amount: 0,
                bid_id: commitment.commitmentHash,
                settlement_type,
                decay_percentage,
                window,
                nonce: None,
                settlement_tx_hash: None,
                status: SettlementStatus::PendingSubmission,
            })
            .await?;
        Ok(())
    }

    /// Retry wait-listed commitments and discard entries whose winner never
    /// registered within the horizon.
    async fn drain_waitlist(&mut self) {
        if self.waitlist.is_empty() {
            return;
        }
        let last_registered = match self.db.last_registered_block().await {
            Ok(block) => block,
            Err(err) => {
                tracing::warn!(target: "oracle::updater", ?err, "failed to read winner registry");
                return;
            }
        };
        let horizon = last_registered.saturating_sub(COMMITMENT_WAIT_HORIZON);

        let blocks = self.waitlist.keys().copied().collect::<Vec<_>>();
        for block_number in blocks {
            if (block_number as i64) < horizon {
                let dropped = self.waitlist.remove(&block_number).unwrap_or_default();
                self.metrics.commitments_dropped.increment(dropped.len() as u64);
                tracing::error!(target: "oracle::updater", block_number, count = dropped.len(), "winner never registered within horizon, dropping commitments");
                continue;
            }
            let entries = self.waitlist.remove(&block_number).unwrap_or_default();
            for commitment in entries {
                self.handle_commitment(commitment).await;
            }
        }
    }
}

/// Parse the claimed transaction hashes of a commitment: a single hash, or a
/// comma-separated bundle.
fn parse_txn_hashes(txn_hashes: &str) -> Result<Vec<B256>, UpdaterError> {
    txn_hashes
        .split(',')
        .map(|hash| {
            let hash = hash.trim();
            let hash = hash.strip_prefix("0x").unwrap_or(hash);
            hash.parse::<B256>().map_err(|_| UpdaterError::InvalidTxnHash(hash.to_owned()))
        })
        .collect()
}

/// Whether the claimed hashes appear in the block in the exact relative
/// order given, as a contiguous or non-contiguous subsequence. Linear scan.
fn is_ordered_subsequence(claimed: &[B256], block: &[B256]) -> bool {
    let mut block = block.iter();
    claimed.iter().all(|hash| block.any(|tx| tx == hash))
}

/// The residual bid percentage at the block timestamp: 100 at or before
/// `decay_start`, 0 at or after `decay_end`, linearly interpolated between.
fn decay_percentage(block_timestamp: u64, decay_start: u64, decay_end: u64) -> i64 {
    if block_timestamp <= decay_start {
        return 100;
    }
    if block_timestamp >= decay_end {
        return 0;
    }
    (100 * (decay_end - block_timestamp) / (decay_end - decay_start)) as i64
}

#[cfg(test)]
mod tests;
