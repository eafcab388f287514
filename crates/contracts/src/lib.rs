//! Solidity ABI bindings for the settlement-chain contracts the oracle
//! interacts with.

use alloy_primitives::Log;
use alloy_sol_types::{sol, SolEvent};

sol! {
    /// The oracle contract, settling builder commitments and unlocking
    /// bidder funds.
    contract Oracle {
        function processBuilderCommitmentForBlockNumber(
            bytes32 commitmentIndex,
            uint256 blockNumber,
            string builder,
            bool isSlash,
            uint256 decayPct,
            uint256 window
        ) external;

        function unlockFunds(bytes32[] bidIDs) external;

        function addBuilderAddress(string builderName, address builderAddress) external;

        function getBuilderAddress(string builderName) external view returns (address);
    }

    /// The block tracker contract, recording the winning builder of each L1
    /// block.
    contract BlockTracker {
        function recordL1Block(uint256 blockNumber, string builderName) external;
    }

    /// The commitment store contract. Only its events are consumed.
    contract PreconfManager {
        #[derive(Debug)]
        event EncryptedCommitmentStored(
            bytes32 indexed commitmentIndex,
            address committer,
            bytes32 commitmentDigest,
            bytes commitmentSignature,
            uint256 committedAt
        );

        #[derive(Debug)]
        event CommitmentStored(
            bytes32 indexed commitmentIndex,
            address bidder,
            address committer,
            uint256 bid,
            uint256 blockNumber,
            bytes32 bidHash,
            uint64 decayStartTimeStamp,
            uint64 decayEndTimeStamp,
            string txnHash,
            bytes32 commitmentHash,
            bytes bidSignature,
            bytes commitmentSignature,
            uint256 committedAt,
            bytes sharedSecretKey
        );
    }
}

/// Tries to decode the provided log into the event type T.
pub fn try_decode_log<T: SolEvent>(log: &Log) -> Option<Log<T>> {
    T::decode_log(log).ok()
}
