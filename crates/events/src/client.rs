use crate::EventManagerError;

use alloy_provider::Provider;
use alloy_rpc_types_eth::{Filter, Log};

/// The settlement-chain access the event manager needs.
#[async_trait::async_trait]
pub trait LogClient: Send + Sync {
    /// The current settlement-chain head.
    async fn block_number(&self) -> Result<u64, EventManagerError>;
    /// The logs matching the provided filter.
    async fn logs(&self, filter: &Filter) -> Result<Vec<Log>, EventManagerError>;
}

/// A [`LogClient`] over any alloy provider.
#[derive(Debug, Clone)]
pub struct EthLogClient<P>(pub P);

#[async_trait::async_trait]
impl<P: Provider> LogClient for EthLogClient<P> {
    async fn block_number(&self) -> Result<u64, EventManagerError> {
        Ok(self.0.get_block_number().await?)
    }

    async fn logs(&self, filter: &Filter) -> Result<Vec<Log>, EventManagerError> {
        Ok(self.0.get_logs(filter).await?)
    }
}
