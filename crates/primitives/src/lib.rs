//! Primitive types for the preconf oracle.

pub use commitment::EncryptedCommitment;
mod commitment;

pub use settlement::{ReturnBatch, Settlement, SettlementStatus, SettlementType, UnknownVariant};
mod settlement;

pub use winner::Winner;
mod winner;
