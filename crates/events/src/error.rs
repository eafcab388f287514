use preconf_oracle_db::DatabaseError;

/// The error type for the event manager and its handlers.
#[derive(Debug, thiserror::Error)]
pub enum EventManagerError {
    /// An RPC error occurred while fetching logs.
    #[error("rpc error: {0}")]
    Rpc(#[from] alloy_transport::RpcError<alloy_transport::TransportErrorKind>),
    /// A database error occurred while persisting progress.
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),
    /// A log did not decode as the event its topic announced.
    #[error("failed to decode {0} log")]
    DecodeLog(&'static str),
    /// A handler's downstream channel was closed.
    #[error("handler channel closed")]
    ChannelClosed,
    /// A transport fault, surfaced on subscription error channels.
    #[error("transport failure: {0}")]
    Transport(String),
}
