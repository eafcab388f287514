use alloy_primitives::{Address, B256};
use preconf_oracle_primitives::EncryptedCommitment;
use sea_orm::{entity::prelude::*, ActiveValue};

/// A database model that represents an encrypted commitment.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "encrypted_commitments")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub commitment_index: Vec<u8>,
    pub committer: Vec<u8>,
    pub digest: Vec<u8>,
    pub signature: Vec<u8>,
    pub committed_at_block: i64,
}

/// The relation for the encrypted commitment model.
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

/// The active model behavior for the encrypted commitment model.
impl ActiveModelBehavior for ActiveModel {}

impl From<EncryptedCommitment> for ActiveModel {
    fn from(commitment: EncryptedCommitment) -> Self {
        Self {
            commitment_index: ActiveValue::Set(commitment.commitment_index.to_vec()),
            committer: ActiveValue::Set(commitment.committer.to_vec()),
            digest: ActiveValue::Set(commitment.digest.to_vec()),
            signature: ActiveValue::Set(commitment.signature),
            committed_at_block: ActiveValue::Set(commitment.committed_at_block),
        }
    }
}

impl From<Model> for EncryptedCommitment {
    fn from(value: Model) -> Self {
        Self {
            commitment_index: B256::from_slice(&value.commitment_index),
            committer: Address::from_slice(&value.committer),
            digest: B256::from_slice(&value.digest),
            signature: value.signature,
            committed_at_block: value.committed_at_block,
        }
    }
}
