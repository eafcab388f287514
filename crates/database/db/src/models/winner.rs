use alloy_primitives::Address;
use preconf_oracle_primitives::Winner;
use sea_orm::{entity::prelude::*, ActiveValue};

/// A database model that represents the winning builder of an L1 block.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "winners")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub block_number: i64,
    pub builder: Vec<u8>,
    pub window: i64,
}

/// The relation for the winner model.
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

/// The active model behavior for the winner model.
impl ActiveModelBehavior for ActiveModel {}

impl From<Winner> for ActiveModel {
    fn from(winner: Winner) -> Self {
        Self {
            block_number: ActiveValue::Set(winner.block_number),
            builder: ActiveValue::Set(winner.builder.to_vec()),
            window: ActiveValue::Set(winner.window),
        }
    }
}

impl From<Model> for Winner {
    fn from(value: Model) -> Self {
        Self {
            block_number: value.block_number,
            builder: Address::from_slice(&value.builder),
            window: value.window,
        }
    }
}
