use preconf_oracle_db::DatabaseError;

/// The error type for transaction submission.
#[derive(Debug, thiserror::Error)]
pub enum TransactorError {
    /// An RPC error occurred.
    #[error("rpc error: {0}")]
    Rpc(#[from] alloy_transport::RpcError<alloy_transport::TransportErrorKind>),
    /// A database error occurred while persisting the nonce watermark.
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),
    /// A contract call returned data that did not decode.
    #[error("abi decoding error: {0}")]
    Abi(#[from] alloy_sol_types::Error),
}
