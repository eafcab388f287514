use crate::TransactorError;

use alloy_primitives::{Address, Bytes, B256};
use alloy_provider::Provider;
use alloy_rpc_types_eth::TransactionRequest;

/// The settlement-chain access the transactor and its callers need.
#[async_trait::async_trait]
pub trait ChainClient: Send + Sync {
    /// The pending nonce of the account.
    async fn pending_nonce(&self, address: Address) -> Result<u64, TransactorError>;
    /// The nonce of the account at the given block.
    async fn nonce_at(&self, address: Address, block_number: u64) -> Result<u64, TransactorError>;
    /// The current chain head.
    async fn block_number(&self) -> Result<u64, TransactorError>;
    /// The suggested gas price.
    async fn gas_price(&self) -> Result<u128, TransactorError>;
    /// The suggested priority fee.
    async fn max_priority_fee(&self) -> Result<u128, TransactorError>;
    /// Execute a read-only contract call.
    async fn call(&self, request: TransactionRequest) -> Result<Bytes, TransactorError>;
    /// Submit a signed transaction, returning its hash.
    async fn send_transaction(&self, request: TransactionRequest) -> Result<B256, TransactorError>;
}

/// A [`ChainClient`] over any alloy provider. Submission relies on the
/// provider's wallet filler for signing.
#[derive(Debug, Clone)]
pub struct EthChainClient<P>(pub P);

#[async_trait::async_trait]
impl<P: Provider> ChainClient for EthChainClient<P> {
    async fn pending_nonce(&self, address: Address) -> Result<u64, TransactorError> {
        Ok(self.0.get_transaction_count(address).pending().await?)
    }

    async fn nonce_at(&self, address: Address, block_number: u64) -> Result<u64, TransactorError> {
        Ok(self.0.get_transaction_count(address).number(block_number).await?)
    }

    async fn block_number(&self) -> Result<u64, TransactorError> {
        Ok(self.0.get_block_number().await?)
    }

    async fn gas_price(&self) -> Result<u128, TransactorError> {
        Ok(self.0.get_gas_price().await?)
    }

    async fn max_priority_fee(&self) -> Result<u128, TransactorError> {
        Ok(self.0.get_max_priority_fee_per_gas().await?)
    }

    async fn call(&self, request: TransactionRequest) -> Result<Bytes, TransactorError> {
        Ok(self.0.call(request).await?)
    }

    async fn send_transaction(&self, request: TransactionRequest) -> Result<B256, TransactorError> {
        Ok(*self.0.send_transaction(request).await?.tx_hash())
    }
}
