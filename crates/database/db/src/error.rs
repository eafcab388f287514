/// The error type for database operations.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    /// A database error occurred.
    #[error("database error: {0}")]
    Database(#[from] sea_orm::DbErr),
    /// A winner was registered twice for the same block with a different
    /// builder. This indicates a data-source inconsistency and is fatal.
    #[error("conflicting winner registration for block {block_number}")]
    WinnerConflict {
        /// The L1 block number the conflicting registration targets.
        block_number: i64,
    },
}
