use sea_orm_migration::{prelude::*, schema::*};

const HASH_LENGTH: u32 = 32;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Settlements::Table)
                    .if_not_exists()
                    .col(pk_auto(Settlements::Id))
                    .col(binary_len(Settlements::CommitmentIndex, HASH_LENGTH))
                    .col(string(Settlements::TransactionHash))
                    .col(big_integer(Settlements::BlockNumber))
                    .col(binary(Settlements::Builder))
                    .col(big_integer(Settlements::Amount))
                    .col(binary_len(Settlements::BidId, HASH_LENGTH))
                    .col(string(Settlements::SettlementType))
                    .col(big_integer(Settlements::DecayPercentage))
                    .col(big_integer(Settlements::Window))
                    .col(big_integer_null(Settlements::Nonce))
                    .col(binary_len_null(Settlements::SettlementTxHash, HASH_LENGTH))
                    .col(string(Settlements::Status))
                    .to_owned(),
            )
            .await?;

        // The commitment index is the idempotency key; the auto-increment id
        // only orders subscription delivery.
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .unique()
                    .name("idx_settlements_commitment_index")
                    .table(Settlements::Table)
                    .col(Settlements::CommitmentIndex)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.drop_table(Table::drop().table(Settlements::Table).to_owned()).await
    }
}

#[derive(DeriveIden)]
enum Settlements {
    Table,
    Id,
    CommitmentIndex,
    TransactionHash,
    BlockNumber,
    Builder,
    Amount,
    BidId,
    SettlementType,
    DecayPercentage,
    Window,
    Nonce,
    SettlementTxHash,
    Status,
}
