use alloy_primitives::{Address, B256};

/// The on-chain action the oracle owes for a commitment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlementType {
    /// The commitment was honored: the claimed transactions appear in the L1
    /// block in the claimed order.
    Reward,
    /// The commitment was broken.
    Slash,
    /// The committer is not the registered winner of the block; the bid is
    /// returned to the bidder.
    Return,
}

impl SettlementType {
    /// The stable string representation persisted in the database.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Reward => "reward",
            Self::Slash => "slash",
            Self::Return => "return",
        }
    }
}

impl std::str::FromStr for SettlementType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "reward" => Ok(Self::Reward),
            "slash" => Ok(Self::Slash),
            "return" => Ok(Self::Return),
            _ => Err(UnknownVariant(s.to_owned())),
        }
    }
}

impl std::fmt::Display for SettlementType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The submission state of a settlement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlementStatus {
    /// Enqueued by the updater, not yet submitted.
    PendingSubmission,
    /// Submitted on-chain with a recorded nonce, awaiting confirmation.
    Submitted,
    /// The settlement-chain nonce advanced past the recorded nonce.
    Confirmed,
}

impl SettlementStatus {
    /// The stable string representation persisted in the database.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::PendingSubmission => "pending_submission",
            Self::Submitted => "submitted",
            Self::Confirmed => "confirmed",
        }
    }
}

impl std::str::FromStr for SettlementStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending_submission" => Ok(Self::PendingSubmission),
            "submitted" => Ok(Self::Submitted),
            "confirmed" => Ok(Self::Confirmed),
            _ => Err(UnknownVariant(s.to_owned())),
        }
    }
}

impl std::fmt::Display for SettlementStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An unknown enum string was read back from persistence.
#[derive(Debug, thiserror::Error)]
#[error("unknown variant: {0}")]
pub struct UnknownVariant(pub String);

/// A settlement decision derived from one commitment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settlement {
    /// The commitment index the settlement was derived from.
    pub commitment_index: B256,
    /// The claimed transaction hashes, comma separated for bundles.
    pub transaction_hash: String,
    /// The L1 block number the commitment targets.
    pub block_number: i64,
    /// The committing builder.
    pub builder: Address,
    /// The settlement amount.
    pub amount: u64,
    /// The bid identifier used to unlock funds for returns.
    pub bid_id: B256,
    /// The settlement decision.
    pub settlement_type: SettlementType,
    /// Residual bid percentage after decay, in `0..=100`.
    pub decay_percentage: i64,
    /// The bidding window of the target block.
    pub window: i64,
    /// The transaction nonce used for submission, if submitted.
    pub nonce: Option<i64>,
    /// The hash of the settlement transaction, if submitted.
    pub settlement_tx_hash: Option<B256>,
    /// The submission state.
    pub status: SettlementStatus,
}

/// A batch of return-type settlements unlocked in a single transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReturnBatch {
    /// The commitment indices backing the batch, in insertion order.
    pub commitment_indices: Vec<B256>,
    /// The bid identifiers passed to the funds unlock.
    pub bid_ids: Vec<B256>,
}

impl std::fmt::Display for ReturnBatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ids = self.bid_ids.iter().map(|id| id.to_string()).collect::<Vec<_>>();
        f.write_str(&ids.join(","))
    }
}
