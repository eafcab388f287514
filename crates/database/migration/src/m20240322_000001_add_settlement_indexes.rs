use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_settlements_block_number")
                    .table(Settlements::Table)
                    .col(Settlements::BlockNumber)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_settlements_status_block_number")
                    .table(Settlements::Table)
                    .col(Settlements::Status)
                    .col(Settlements::BlockNumber)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("idx_settlements_status_block_number").to_owned())
            .await?;
        manager.drop_index(Index::drop().name("idx_settlements_block_number").to_owned()).await
    }
}

#[derive(DeriveIden)]
enum Settlements {
    Table,
    BlockNumber,
    Status,
}
