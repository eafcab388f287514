use alloy_primitives::B256;
use alloy_rpc_types_eth::Log;
use alloy_sol_types::SolEvent;
use preconf_oracle_contracts::{try_decode_log, PreconfManager};
use preconf_oracle_events::{EventHandler, EventManagerError};
use tokio::sync::mpsc;

/// Forwards decoded `EncryptedCommitmentStored` events to the updater's
/// encrypted-commitment worker.
#[derive(Debug, Clone)]
pub struct EncryptedCommitmentHandler {
    pub(crate) sender: mpsc::Sender<PreconfManager::EncryptedCommitmentStored>,
}

#[async_trait::async_trait]
impl EventHandler for EncryptedCommitmentHandler {
    fn event_name(&self) -> &'static str {
        "EncryptedCommitmentStored"
    }

    fn signature_hash(&self) -> B256 {
        PreconfManager::EncryptedCommitmentStored::SIGNATURE_HASH
    }

    async fn handle(&self, log: &Log) -> Result<(), EventManagerError> {
        let decoded =
            try_decode_log::<PreconfManager::EncryptedCommitmentStored>(&log.inner)
                .ok_or(EventManagerError::DecodeLog("EncryptedCommitmentStored"))?;
        self.sender.send(decoded.data).await.map_err(|_| EventManagerError::ChannelClosed)
    }
}

/// Forwards decoded `CommitmentStored` events to the updater's commitment
/// worker.
#[derive(Debug, Clone)]
pub struct CommitmentHandler {
    pub(crate) sender: mpsc::Sender<PreconfManager::CommitmentStored>,
}

#[async_trait::async_trait]
impl EventHandler for CommitmentHandler {
    fn event_name(&self) -> &'static str {
        "CommitmentStored"
    }

    fn signature_hash(&self) -> B256 {
        PreconfManager::CommitmentStored::SIGNATURE_HASH
    }

    async fn handle(&self, log: &Log) -> Result<(), EventManagerError> {
        let decoded = try_decode_log::<PreconfManager::CommitmentStored>(&log.inner)
            .ok_or(EventManagerError::DecodeLog("CommitmentStored"))?;
        self.sender.send(decoded.data).await.map_err(|_| EventManagerError::ChannelClosed)
    }
}
