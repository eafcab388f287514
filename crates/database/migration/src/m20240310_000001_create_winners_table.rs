use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Winners::Table)
                    .if_not_exists()
                    .col(big_integer(Winners::BlockNumber).primary_key())
                    .col(binary(Winners::Builder))
                    .col(big_integer(Winners::Window))
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.drop_table(Table::drop().table(Winners::Table).to_owned()).await
    }
}

#[derive(DeriveIden)]
enum Winners {
    Table,
    BlockNumber,
    Builder,
    Window,
}
