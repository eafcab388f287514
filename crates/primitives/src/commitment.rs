use alloy_primitives::{Address, B256};

/// An encrypted commitment observed on the settlement chain. The digest is
/// revealed later by the matching plaintext commitment; the signature is
/// stored opaquely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedCommitment {
    /// The commitment index, unique across the commitment store.
    pub commitment_index: B256,
    /// The address of the committing builder.
    pub committer: Address,
    /// The commitment digest.
    pub digest: B256,
    /// The commitment signature, stored opaquely.
    pub signature: Vec<u8>,
    /// The settlement-chain block the commitment was stored at.
    pub committed_at_block: i64,
}
