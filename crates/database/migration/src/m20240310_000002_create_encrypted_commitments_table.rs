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
                    .table(EncryptedCommitments::Table)
                    .if_not_exists()
                    .col(binary_len(EncryptedCommitments::CommitmentIndex, HASH_LENGTH).primary_key())
                    .col(binary(EncryptedCommitments::Committer))
                    .col(binary_len(EncryptedCommitments::Digest, HASH_LENGTH))
                    .col(binary(EncryptedCommitments::Signature))
                    .col(big_integer(EncryptedCommitments::CommittedAtBlock))
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.drop_table(Table::drop().table(EncryptedCommitments::Table).to_owned()).await
    }
}

#[derive(DeriveIden)]
enum EncryptedCommitments {
    Table,
    CommitmentIndex,
    Committer,
    Digest,
    Signature,
    CommittedAtBlock,
}
