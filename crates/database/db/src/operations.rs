use super::{models, DatabaseError};
use crate::DatabaseConnectionProvider;

use alloy_primitives::B256;
use preconf_oracle_primitives::{EncryptedCommitment, Settlement, SettlementStatus, Winner};
use sea_orm::{
    sea_query::{Expr, OnConflict},
    ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect,
};

/// The [`DatabaseOperations`] trait provides methods for interacting with the
/// database.
#[async_trait::async_trait]
pub trait DatabaseOperations: DatabaseConnectionProvider {
    /// Register the winning builder of an L1 block. Idempotent on the block
    /// number; a second registration with a different builder is rejected as
    /// a [`DatabaseError::WinnerConflict`].
    async fn register_winner(&self, winner: Winner) -> Result<(), DatabaseError> {
        tracing::trace!(target: "oracle::db", block_number = winner.block_number, builder = %winner.builder, "registering winner");
        if let Some(existing) =
            models::winner::Entity::find_by_id(winner.block_number).one(self.get_connection()).await?
        {
            if existing.builder != winner.builder.as_slice() {
                return Err(DatabaseError::WinnerConflict { block_number: winner.block_number });
            }
            return Ok(());
        }

        let winner: models::winner::ActiveModel = winner.into();
        models::winner::Entity::insert(winner)
            .on_conflict(
                OnConflict::column(models::winner::Column::BlockNumber).do_nothing().to_owned(),
            )
            .exec_without_returning(self.get_connection())
            .await?;
        Ok(())
    }

    /// Get the registered winner of an L1 block.
    async fn get_winner(&self, block_number: i64) -> Result<Option<Winner>, DatabaseError> {
        Ok(models::winner::Entity::find_by_id(block_number)
            .one(self.get_connection())
            .await
            .map(|model| model.map(Into::into))?)
    }

    /// The highest L1 block number with a registered winner, `0` when the
    /// registry is empty. Used by the L1 listener to resume on startup.
    async fn last_registered_block(&self) -> Result<i64, DatabaseError> {
        Ok(models::winner::Entity::find()
            .order_by_desc(models::winner::Column::BlockNumber)
            .one(self.get_connection())
            .await
            .map(|model| model.map(|winner| winner.block_number).unwrap_or_default())?)
    }

    /// Insert an encrypted commitment. Idempotent on the commitment index.
    async fn add_encrypted_commitment(
        &self,
        commitment: EncryptedCommitment,
    ) -> Result<(), DatabaseError> {
        tracing::trace!(target: "oracle::db", commitment_index = %commitment.commitment_index, "storing encrypted commitment");
        let commitment: models::encrypted_commitment::ActiveModel = commitment.into();
        models::encrypted_commitment::Entity::insert(commitment)
            .on_conflict(
                OnConflict::column(models::encrypted_commitment::Column::CommitmentIndex)
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(self.get_connection())
            .await?;
        Ok(())
    }

    /// Get the encrypted commitment stored for the provided index.
    async fn get_encrypted_commitment(
        &self,
        commitment_index: B256,
    ) -> Result<Option<EncryptedCommitment>, DatabaseError> {
        Ok(models::encrypted_commitment::Entity::find_by_id(commitment_index.to_vec())
            .one(self.get_connection())
            .await
            .map(|model| model.map(Into::into))?)
    }

    /// Whether a settlement row exists for the provided commitment index.
    async fn is_settled(&self, commitment_index: B256) -> Result<bool, DatabaseError> {
        Ok(models::settlement::Entity::find()
            .filter(
                models::settlement::Column::CommitmentIndex.eq(commitment_index.to_vec()),
            )
            .count(self.get_connection())
            .await? >
            0)
    }

    /// Insert a settlement in pending-submission state. Idempotent on the
    /// commitment index.
    async fn add_settlement(&self, settlement: Settlement) -> Result<(), DatabaseError> {
        tracing::trace!(
            target: "oracle::db",
            commitment_index = %settlement.commitment_index,
            settlement_type = %settlement.settlement_type,
            block_number = settlement.block_number,
            "adding settlement"
        );
        let settlement: models::settlement::ActiveModel = settlement.into();
        models::settlement::Entity::insert(settlement)
            .on_conflict(
                OnConflict::column(models::settlement::Column::CommitmentIndex)
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(self.get_connection())
            .await?;
        Ok(())
    }

    /// Transition the provided settlements to submitted, recording the
    /// transaction hash and nonce used.
    async fn settlement_initiated(
        &self,
        commitment_indices: &[B256],
        tx_hash: B256,
        nonce: i64,
    ) -> Result<(), DatabaseError> {
        tracing::trace!(target: "oracle::db", count = commitment_indices.len(), %tx_hash, nonce, "settlement initiated");
        models::settlement::Entity::update_many()
            .col_expr(
                models::settlement::Column::Status,
                Expr::value(SettlementStatus::Submitted.as_str()),
            )
            .col_expr(models::settlement::Column::Nonce, Expr::value(Some(nonce)))
            .col_expr(
                models::settlement::Column::SettlementTxHash,
                Expr::value(Some(tx_hash.to_vec())),
            )
            .filter(
                models::settlement::Column::CommitmentIndex
                    .is_in(commitment_indices.iter().map(|index| index.to_vec())),
            )
            .exec(self.get_connection())
            .await?;
        Ok(())
    }

    /// Transition all submitted settlements with a nonce at or below the
    /// provided confirmed nonce to confirmed. Returns the number of rows
    /// transitioned.
    async fn mark_settlement_complete(&self, confirmed_nonce: i64) -> Result<u64, DatabaseError> {
        let result = models::settlement::Entity::update_many()
            .col_expr(
                models::settlement::Column::Status,
                Expr::value(SettlementStatus::Confirmed.as_str()),
            )
            .filter(
                models::settlement::Column::Status
                    .eq(SettlementStatus::Submitted.as_str())
                    .and(models::settlement::Column::Nonce.lte(confirmed_nonce)),
            )
            .exec(self.get_connection())
            .await?;
        Ok(result.rows_affected)
    }

    /// The number of settlements submitted but not yet confirmed.
    async fn pending_txn_count(&self) -> Result<u64, DatabaseError> {
        Ok(models::settlement::Entity::find()
            .filter(models::settlement::Column::Status.eq(SettlementStatus::Submitted.as_str()))
            .count(self.get_connection())
            .await?)
    }

    /// The highest transaction nonce the oracle wallet has submitted, `-1`
    /// when none was recorded.
    async fn last_nonce(&self) -> Result<i64, DatabaseError> {
        Ok(models::metadata::Entity::find_by_id(models::metadata::LAST_USED_NONCE_KEY.to_owned())
            .one(self.get_connection())
            .await?
            .map(|entry| entry.value.parse().expect("data persisted in database is valid"))
            .unwrap_or(-1))
    }

    /// Advance the nonce watermark. Monotonic; called by the transactor after
    /// every successful submission.
    async fn set_last_used_nonce(&self, nonce: i64) -> Result<(), DatabaseError> {
        self.set_metadata(models::metadata::LAST_USED_NONCE_KEY, nonce.to_string()).await
    }

    /// The last settlement-chain block processed by the event manager.
    async fn settlement_progress(&self) -> Result<Option<u64>, DatabaseError> {
        Ok(models::metadata::Entity::find_by_id(
            models::metadata::SETTLEMENT_PROGRESS_KEY.to_owned(),
        )
        .one(self.get_connection())
        .await?
        .map(|entry| entry.value.parse().expect("data persisted in database is valid")))
    }

    /// Persist the last settlement-chain block processed by the event
    /// manager.
    async fn set_settlement_progress(&self, block_number: u64) -> Result<(), DatabaseError> {
        self.set_metadata(models::metadata::SETTLEMENT_PROGRESS_KEY, block_number.to_string())
            .await
    }

    /// Upsert a metadata entry.
    async fn set_metadata(&self, key: &str, value: String) -> Result<(), DatabaseError> {
        let entry = models::metadata::ActiveModel {
            key: sea_orm::ActiveValue::Set(key.to_owned()),
            value: sea_orm::ActiveValue::Set(value),
        };
        models::metadata::Entity::insert(entry)
            .on_conflict(
                OnConflict::column(models::metadata::Column::Key)
                    .update_column(models::metadata::Column::Value)
                    .to_owned(),
            )
            .exec_without_returning(self.get_connection())
            .await?;
        Ok(())
    }

    /// Fetch pending settlements past the provided subscription cursor in
    /// insertion order, either return-type rows only or everything else.
    async fn pending_settlements_after(
        &self,
        cursor: i64,
        limit: u64,
        returns_only: bool,
    ) -> Result<Vec<(i64, Settlement)>, DatabaseError> {
        let type_filter = if returns_only {
            models::settlement::Column::SettlementType
                .eq(preconf_oracle_primitives::SettlementType::Return.as_str())
        } else {
            models::settlement::Column::SettlementType
                .ne(preconf_oracle_primitives::SettlementType::Return.as_str())
        };

        Ok(models::settlement::Entity::find()
            .filter(
                models::settlement::Column::Status
                    .eq(SettlementStatus::PendingSubmission.as_str())
                    .and(models::settlement::Column::Id.gt(cursor))
                    .and(type_filter),
            )
            .order_by_asc(models::settlement::Column::Id)
            .limit(limit)
            .all(self.get_connection())
            .await?
            .into_iter()
            .map(|model| (model.id, model.into()))
            .collect())
    }
}

impl DatabaseOperations for crate::Database {}
