//! A serializing wrapper over a settlement-chain client that ensures exactly
//! one transaction per nonce is submitted, with a persisted nonce watermark
//! surviving restarts.

mod client;
pub use client::{ChainClient, EthChainClient};

mod error;
pub use error::TransactorError;

mod session;
pub use session::{BlockTrackerSession, OracleSession};

use alloy_network::TransactionBuilder;
use alloy_primitives::{Address, Bytes, B256};
use alloy_rpc_types_eth::TransactionRequest;
use preconf_oracle_db::{Database, DatabaseOperations};
use tokio::sync::Mutex;

/// Fee parameters for a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxnOpts {
    /// The maximum fee per gas.
    pub gas_fee_cap: u128,
    /// The maximum priority fee per gas.
    pub tip_cap: u128,
}

/// A submitted transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmittedTxn {
    /// The transaction hash.
    pub hash: B256,
    /// The nonce the transaction was submitted with.
    pub nonce: u64,
}

/// The transactor serializes transaction submission for the oracle wallet.
///
/// The nonce is chosen inside the submission lock as
/// `max(rpc pending nonce, watermark + 1)`, so a stale RPC pending nonce can
/// never reuse a nonce already recorded in the store.
#[derive(Debug)]
pub struct Transactor<C> {
    client: C,
    db: Database,
    owner: Address,
    last_submitted: Mutex<i64>,
}

impl<C: ChainClient> Transactor<C> {
    /// Creates a new transactor, loading the nonce watermark from the store.
    pub async fn new(client: C, db: Database, owner: Address) -> Result<Self, TransactorError> {
        let last_nonce = db.last_nonce().await?;
        tracing::info!(target: "oracle::transactor", owner = %owner, last_nonce, "transactor initialized");
        Ok(Self { client, db, owner, last_submitted: Mutex::new(last_nonce) })
    }

    /// The address transactions are sent from.
    pub fn owner(&self) -> Address {
        self.owner
    }

    /// The highest nonce submitted so far, `-1` when none.
    pub async fn last_submitted_nonce(&self) -> i64 {
        *self.last_submitted.lock().await
    }

    /// Suggested fee parameters: the tip cap as reported by the chain, and a
    /// fee cap of gas price plus tip.
    pub async fn suggested_opts(&self) -> Result<TxnOpts, TransactorError> {
        let tip_cap = self.client.max_priority_fee().await?;
        let gas_price = self.client.gas_price().await?;
        Ok(TxnOpts { gas_fee_cap: gas_price.saturating_add(tip_cap), tip_cap })
    }

    /// Submit a transaction with the next free nonce. The nonce read, the
    /// submission and the watermark write happen under the submission lock.
    pub async fn send(
        &self,
        request: TransactionRequest,
        opts: TxnOpts,
    ) -> Result<SubmittedTxn, TransactorError> {
        let mut last_submitted = self.last_submitted.lock().await;

        let pending = self.client.pending_nonce(self.owner).await?;
        let next = u64::try_from(*last_submitted + 1).unwrap_or_default();
        let nonce = pending.max(next);

        let request = request
            .with_from(self.owner)
            .with_nonce(nonce)
            .with_max_fee_per_gas(opts.gas_fee_cap)
            .with_max_priority_fee_per_gas(opts.tip_cap);
        let hash = self.client.send_transaction(request).await?;

        self.db.set_last_used_nonce(nonce as i64).await?;
        *last_submitted = nonce as i64;

        tracing::debug!(target: "oracle::transactor", %hash, nonce, "transaction submitted");
        Ok(SubmittedTxn { hash, nonce })
    }

    /// Pending nonce of the oracle wallet.
    pub async fn pending_nonce(&self) -> Result<u64, TransactorError> {
        self.client.pending_nonce(self.owner).await
    }

    /// Nonce of the oracle wallet at the given block.
    pub async fn nonce_at(&self, block_number: u64) -> Result<u64, TransactorError> {
        self.client.nonce_at(self.owner, block_number).await
    }

    /// Current settlement-chain head.
    pub async fn block_number(&self) -> Result<u64, TransactorError> {
        self.client.block_number().await
    }

    /// Execute a read-only contract call.
    pub async fn call(&self, request: TransactionRequest) -> Result<Bytes, TransactorError> {
        self.client.call(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;
    use preconf_oracle_db::test_utils::setup_test_db;
    use std::sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    };

    #[derive(Debug, Clone, Default)]
    struct MockChain {
        pending_nonce: Arc<AtomicU64>,
        sent: Arc<AtomicU64>,
    }

    #[async_trait::async_trait]
    impl ChainClient for MockChain {
        async fn pending_nonce(&self, _address: Address) -> Result<u64, TransactorError> {
            Ok(self.pending_nonce.load(Ordering::SeqCst))
        }

        async fn nonce_at(
            &self,
            _address: Address,
            _block_number: u64,
        ) -> Result<u64, TransactorError> {
            Ok(0)
        }

        async fn block_number(&self) -> Result<u64, TransactorError> {
            Ok(0)
        }

        async fn gas_price(&self) -> Result<u128, TransactorError> {
            Ok(1_000)
        }

        async fn max_priority_fee(&self) -> Result<u128, TransactorError> {
            Ok(500)
        }

        async fn call(&self, _request: TransactionRequest) -> Result<Bytes, TransactorError> {
            Ok(Bytes::new())
        }

        async fn send_transaction(
            &self,
            request: TransactionRequest,
        ) -> Result<B256, TransactorError> {
            self.sent.fetch_add(1, Ordering::SeqCst);
            let nonce = request.nonce.expect("nonce is always set");
            let mut hash = B256::ZERO;
            hash.0[31] = nonce as u8;
            Ok(hash)
        }
    }

    const OWNER: Address = address!("00000000000000000000000000000000000000ee");

    #[tokio::test]
    async fn test_nonces_are_strictly_monotonic() {
        let db = setup_test_db().await;
        let chain = MockChain::default();
        let transactor = Transactor::new(chain.clone(), db.clone(), OWNER).await.unwrap();
        let opts = transactor.suggested_opts().await.unwrap();

        for expected in 0..3 {
            let txn = transactor.send(TransactionRequest::default(), opts).await.unwrap();
            assert_eq!(txn.nonce, expected);
        }

        assert_eq!(transactor.last_submitted_nonce().await, 2);
        assert_eq!(db.last_nonce().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_watermark_survives_restart() {
        let db = setup_test_db().await;
        let chain = MockChain::default();

        let transactor = Transactor::new(chain.clone(), db.clone(), OWNER).await.unwrap();
        let opts = transactor.suggested_opts().await.unwrap();
        for _ in 0..3 {
            transactor.send(TransactionRequest::default(), opts).await.unwrap();
        }
        drop(transactor);

        // The RPC briefly reports a stale pending nonce after restart; the
        // watermark wins.
        chain.pending_nonce.store(1, Ordering::SeqCst);
        let transactor = Transactor::new(chain, db, OWNER).await.unwrap();
        let txn = transactor.send(TransactionRequest::default(), opts).await.unwrap();
        assert_eq!(txn.nonce, 3);
    }

    #[tokio::test]
    async fn test_rpc_pending_nonce_ahead_of_watermark_wins() {
        let db = setup_test_db().await;
        let chain = MockChain::default();
        chain.pending_nonce.store(7, Ordering::SeqCst);

        let transactor = Transactor::new(chain, db, OWNER).await.unwrap();
        let opts = transactor.suggested_opts().await.unwrap();
        let txn = transactor.send(TransactionRequest::default(), opts).await.unwrap();
        assert_eq!(txn.nonce, 7);
    }
}
