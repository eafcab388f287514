use alloy_primitives::{Address, B256};
use preconf_oracle_primitives::{Settlement, SettlementStatus, SettlementType};
use sea_orm::{entity::prelude::*, ActiveValue};

/// A database model that represents a settlement decision.
///
/// The auto-increment `id` orders subscription delivery; `commitment_index`
/// carries a unique index and is the idempotency key.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "settlements")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub commitment_index: Vec<u8>,
    pub transaction_hash: String,
    pub block_number: i64,
    pub builder: Vec<u8>,
    pub amount: i64,
    pub bid_id: Vec<u8>,
    pub settlement_type: String,
    pub decay_percentage: i64,
    pub window: i64,
    pub nonce: Option<i64>,
    pub settlement_tx_hash: Option<Vec<u8>>,
    pub status: String,
}

/// The relation for the settlement model.
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

/// The active model behavior for the settlement model.
impl ActiveModelBehavior for ActiveModel {}

impl From<Settlement> for ActiveModel {
    fn from(settlement: Settlement) -> Self {
        Self {
            id: ActiveValue::NotSet,
            commitment_index: ActiveValue::Set(settlement.commitment_index.to_vec()),
            transaction_hash: ActiveValue::Set(settlement.transaction_hash),
            block_number: ActiveValue::Set(settlement.block_number),
            builder: ActiveValue::Set(settlement.builder.to_vec()),
            amount: ActiveValue::Set(
                settlement.amount.try_into().expect("amount should fit in i64"),
            ),
            bid_id: ActiveValue::Set(settlement.bid_id.to_vec()),
            settlement_type: ActiveValue::Set(settlement.settlement_type.as_str().to_owned()),
            decay_percentage: ActiveValue::Set(settlement.decay_percentage),
            window: ActiveValue::Set(settlement.window),
            nonce: ActiveValue::Set(settlement.nonce),
            settlement_tx_hash: ActiveValue::Set(
                settlement.settlement_tx_hash.map(|hash| hash.to_vec()),
            ),
            status: ActiveValue::Set(settlement.status.as_str().to_owned()),
        }
    }
}

impl From<Model> for Settlement {
    fn from(value: Model) -> Self {
        Self {
            commitment_index: B256::from_slice(&value.commitment_index),
            transaction_hash: value.transaction_hash,
            block_number: value.block_number,
            builder: Address::from_slice(&value.builder),
            amount: value.amount as u64,
            bid_id: B256::from_slice(&value.bid_id),
            settlement_type: value
                .settlement_type
                .parse::<SettlementType>()
                .expect("data persisted in database is valid"),
            decay_percentage: value.decay_percentage,
            window: value.window,
            nonce: value.nonce,
            settlement_tx_hash: value.settlement_tx_hash.map(|hash| B256::from_slice(&hash)),
            status: value
                .status
                .parse::<SettlementStatus>()
                .expect("data persisted in database is valid"),
        }
    }
}
