//! Schema migrations for the preconf oracle database.

pub use sea_orm_migration::prelude::*;

mod m20240310_000001_create_winners_table;
mod m20240310_000002_create_encrypted_commitments_table;
mod m20240310_000003_create_settlements_table;
mod m20240310_000004_create_metadata_table;
mod m20240322_000001_add_settlement_indexes;

/// The migrator for the oracle schema.
#[derive(Debug)]
pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240310_000001_create_winners_table::Migration),
            Box::new(m20240310_000002_create_encrypted_commitments_table::Migration),
            Box::new(m20240310_000003_create_settlements_table::Migration),
            Box::new(m20240310_000004_create_metadata_table::Migration),
            Box::new(m20240322_000001_add_settlement_indexes::Migration),
        ]
    }
}
