use sea_orm::entity::prelude::*;

/// The metadata key holding the highest transaction nonce submitted by the
/// oracle wallet.
pub(crate) const LAST_USED_NONCE_KEY: &str = "last_used_nonce";

/// The metadata key holding the last settlement-chain block processed by the
/// event manager.
pub(crate) const SETTLEMENT_PROGRESS_KEY: &str = "settlement_last_block";

/// A database model that represents a key/value metadata entry.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "metadata")]
pub struct Model {
    /// The metadata key.
    #[sea_orm(primary_key, auto_increment = false)]
    pub key: String,
    /// The metadata value.
    pub value: String,
}

/// The relation for the metadata model.
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

/// The active model behavior for the metadata model.
impl ActiveModelBehavior for ActiveModel {}
