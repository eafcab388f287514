use alloy_primitives::Address;

/// The builder that won an L1 block, registered by the L1 listener once the
/// block is behind the confirmation lag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Winner {
    /// The L1 block number the builder won.
    pub block_number: i64,
    /// The settlement-chain address of the winning builder.
    pub builder: Address,
    /// The bidding window the block belongs to.
    pub window: i64,
}

impl std::fmt::Display for Winner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Winner {{ block_number: {}, builder: {}, window: {} }}",
            self.block_number, self.builder, self.window
        )
    }
}
