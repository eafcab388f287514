use crate::{error::DatabaseError, DatabaseConnectionProvider};

use sea_orm::{Database as SeaOrmDatabase, DatabaseConnection};

/// The [`Database`] struct is responsible for interacting with the database.
///
/// It wraps a [`sea_orm::DatabaseConnection`] and implements
/// [`DatabaseConnectionProvider`] so that the operations defined in
/// [`crate::DatabaseOperations`] can be performed on it.
#[derive(Debug, Clone)]
pub struct Database {
    /// The underlying database connection.
    connection: DatabaseConnection,
    /// The temporary directory backing a test database. Held so the
    /// directory is removed once the last handle is dropped.
    #[cfg(any(test, feature = "test-utils"))]
    test_dir: Option<std::sync::Arc<tempfile::TempDir>>,
}

impl Database {
    /// Creates a new [`Database`] instance associated with the provided
    /// database URL.
    pub async fn new(database_url: &str) -> Result<Self, DatabaseError> {
        let connection = SeaOrmDatabase::connect(database_url).await?;
        Ok(Self::from(connection))
    }

    /// Creates a file-backed sqlite database inside the provided temporary
    /// directory, tying the directory's lifetime to the database.
    #[cfg(any(test, feature = "test-utils"))]
    pub async fn test(dir: tempfile::TempDir) -> Result<Self, DatabaseError> {
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("oracle.db").display());
        let mut db = Self::new(&url).await?;
        db.test_dir = Some(std::sync::Arc::new(dir));
        Ok(db)
    }

    /// Closes the underlying connection pool.
    pub async fn close(&self) -> Result<(), DatabaseError> {
        Ok(self.connection.clone().close().await?)
    }
}

impl DatabaseConnectionProvider for Database {
    type Connection = DatabaseConnection;

    fn get_connection(&self) -> &Self::Connection {
        &self.connection
    }
}

impl From<DatabaseConnection> for Database {
    fn from(connection: DatabaseConnection) -> Self {
        Self {
            connection,
            #[cfg(any(test, feature = "test-utils"))]
            test_dir: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{test_utils::setup_test_db, DatabaseError, DatabaseOperations};

    use alloy_primitives::{address, b256, Address, B256};
    use preconf_oracle_primitives::{
        EncryptedCommitment, Settlement, SettlementStatus, SettlementType, Winner,
    };

    fn winner(block_number: i64, builder: Address) -> Winner {
        Winner { block_number, builder, window: block_number / 10 + 1 }
    }

    fn settlement(index: B256, settlement_type: SettlementType) -> Settlement {
        Settlement {
            commitment_index: index,
            transaction_hash: "aa".repeat(32),
            block_number: 5,
            builder: address!("abcdabcdabcdabcdabcdabcdabcdabcdabcdabcd"),
            amount: 0,
            bid_id: index,
            settlement_type,
            decay_percentage: 50,
            window: 1,
            nonce: None,
            settlement_tx_hash: None,
            status: SettlementStatus::PendingSubmission,
        }
    }

    #[tokio::test]
    async fn test_register_winner_is_idempotent() {
        let db = setup_test_db().await;
        let builder = address!("abcdabcdabcdabcdabcdabcdabcdabcdabcdabcd");

        db.register_winner(winner(5, builder)).await.unwrap();
        db.register_winner(winner(5, builder)).await.unwrap();

        let registered = db.get_winner(5).await.unwrap().unwrap();
        assert_eq!(registered.builder, builder);
        assert_eq!(registered.window, 1);
    }

    #[tokio::test]
    async fn test_register_winner_rejects_conflicting_builder() {
        let db = setup_test_db().await;

        db.register_winner(winner(5, address!("abcdabcdabcdabcdabcdabcdabcdabcdabcdabcd")))
            .await
            .unwrap();
        let result = db
            .register_winner(winner(5, address!("1111111111111111111111111111111111111111")))
            .await;

        assert!(matches!(result, Err(DatabaseError::WinnerConflict { block_number: 5 })));
    }

    #[tokio::test]
    async fn test_last_registered_block() {
        let db = setup_test_db().await;
        assert_eq!(db.last_registered_block().await.unwrap(), 0);

        let builder = address!("abcdabcdabcdabcdabcdabcdabcdabcdabcdabcd");
        db.register_winner(winner(3, builder)).await.unwrap();
        db.register_winner(winner(7, builder)).await.unwrap();
        db.register_winner(winner(5, builder)).await.unwrap();

        assert_eq!(db.last_registered_block().await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_encrypted_commitment_round_trip() {
        let db = setup_test_db().await;
        let commitment = EncryptedCommitment {
            commitment_index: b256!(
                "0000000000000000000000000000000000000000000000000000000000000001"
            ),
            committer: address!("abcdabcdabcdabcdabcdabcdabcdabcdabcdabcd"),
            digest: b256!("0000000000000000000000000000000000000000000000000000000000000002"),
            signature: b"signature".to_vec(),
            committed_at_block: 12,
        };

        db.add_encrypted_commitment(commitment.clone()).await.unwrap();
        // Duplicate delivery from the chain is expected and ignored.
        db.add_encrypted_commitment(commitment.clone()).await.unwrap();

        let stored =
            db.get_encrypted_commitment(commitment.commitment_index).await.unwrap().unwrap();
        assert_eq!(stored, commitment);
    }

    #[tokio::test]
    async fn test_add_settlement_is_idempotent() {
        let db = setup_test_db().await;
        let index = b256!("0000000000000000000000000000000000000000000000000000000000000001");

        assert!(!db.is_settled(index).await.unwrap());
        db.add_settlement(settlement(index, SettlementType::Reward)).await.unwrap();
        db.add_settlement(settlement(index, SettlementType::Reward)).await.unwrap();
        assert!(db.is_settled(index).await.unwrap());

        let pending = db.pending_settlements_after(0, 10, false).await.unwrap();
        assert_eq!(pending.len(), 1);
    }

    #[tokio::test]
    async fn test_settlement_lifecycle() {
        let db = setup_test_db().await;
        let first = b256!("0000000000000000000000000000000000000000000000000000000000000001");
        let second = b256!("0000000000000000000000000000000000000000000000000000000000000002");
        let tx_hash = b256!("00000000000000000000000000000000000000000000000000000000000000aa");

        db.add_settlement(settlement(first, SettlementType::Reward)).await.unwrap();
        db.add_settlement(settlement(second, SettlementType::Slash)).await.unwrap();

        db.settlement_initiated(&[first], tx_hash, 0).await.unwrap();
        db.settlement_initiated(&[second], tx_hash, 1).await.unwrap();
        assert_eq!(db.pending_txn_count().await.unwrap(), 2);

        // Only the first nonce is confirmed.
        assert_eq!(db.mark_settlement_complete(0).await.unwrap(), 1);
        assert_eq!(db.pending_txn_count().await.unwrap(), 1);

        // Confirmation is monotone; re-marking does nothing.
        assert_eq!(db.mark_settlement_complete(0).await.unwrap(), 0);
        assert_eq!(db.mark_settlement_complete(1).await.unwrap(), 1);
        assert_eq!(db.pending_txn_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_nonce_watermark() {
        let db = setup_test_db().await;
        assert_eq!(db.last_nonce().await.unwrap(), -1);

        db.set_last_used_nonce(0).await.unwrap();
        assert_eq!(db.last_nonce().await.unwrap(), 0);

        db.set_last_used_nonce(7).await.unwrap();
        assert_eq!(db.last_nonce().await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_settlement_progress() {
        let db = setup_test_db().await;
        assert_eq!(db.settlement_progress().await.unwrap(), None);

        db.set_settlement_progress(1234).await.unwrap();
        assert_eq!(db.settlement_progress().await.unwrap(), Some(1234));
    }
}
