use crate::{ChainClient, SubmittedTxn, Transactor, TransactorError, TxnOpts};

use alloy_network::TransactionBuilder;
use alloy_primitives::{Address, B256, U256};
use alloy_rpc_types_eth::TransactionRequest;
use alloy_sol_types::SolCall;
use preconf_oracle_contracts::{BlockTracker, Oracle};
use std::sync::Arc;

/// A binding to the Oracle contract, submitting through the shared
/// [`Transactor`].
#[derive(Debug)]
pub struct OracleSession<C> {
    transactor: Arc<Transactor<C>>,
    address: Address,
}

impl<C: ChainClient> OracleSession<C> {
    /// Creates a new session for the contract at `address`.
    pub fn new(transactor: Arc<Transactor<C>>, address: Address) -> Self {
        Self { transactor, address }
    }

    /// Settle a builder commitment.
    #[allow(clippy::too_many_arguments)]
    pub async fn process_builder_commitment(
        &self,
        opts: TxnOpts,
        commitment_index: B256,
        block_number: u64,
        builder: &str,
        is_slash: bool,
        decay_percentage: u64,
        window: u64,
    ) -> Result<SubmittedTxn, TransactorError> {
        let call = Oracle::processBuilderCommitmentForBlockNumberCall {
            commitmentIndex: commitment_index,
            blockNumber: U256::from(block_number),
            builder: builder.to_owned(),
            isSlash: is_slash,
            decayPct: U256::from(decay_percentage),
            window: U256::from(window),
        };
        self.submit(call.abi_encode(), opts).await
    }

    /// Unlock the funds behind a batch of bids.
    pub async fn unlock_funds(
        &self,
        opts: TxnOpts,
        bid_ids: Vec<B256>,
    ) -> Result<SubmittedTxn, TransactorError> {
        let call = Oracle::unlockFundsCall { bidIDs: bid_ids };
        self.submit(call.abi_encode(), opts).await
    }

    /// Register a builder name to settlement-chain address mapping.
    pub async fn add_builder_address(
        &self,
        opts: TxnOpts,
        builder_name: &str,
        builder_address: Address,
    ) -> Result<SubmittedTxn, TransactorError> {
        let call = Oracle::addBuilderAddressCall {
            builderName: builder_name.to_owned(),
            builderAddress: builder_address,
        };
        self.submit(call.abi_encode(), opts).await
    }

    /// Resolve a builder name to its settlement-chain address. Returns
    /// `None` for unregistered builders (the contract returns the zero
    /// address).
    pub async fn get_builder_address(
        &self,
        builder_name: &str,
    ) -> Result<Option<Address>, TransactorError> {
        let call = Oracle::getBuilderAddressCall { builderName: builder_name.to_owned() };
        let request = TransactionRequest::default()
            .with_to(self.address)
            .with_input(call.abi_encode());
        let data = self.transactor.call(request).await?;
        let address = Oracle::getBuilderAddressCall::abi_decode_returns(&data)?;
        Ok((!address.is_zero()).then_some(address))
    }

    async fn submit(
        &self,
        calldata: Vec<u8>,
        opts: TxnOpts,
    ) -> Result<SubmittedTxn, TransactorError> {
        let request =
            TransactionRequest::default().with_to(self.address).with_input(calldata);
        self.transactor.send(request, opts).await
    }
}

/// A binding to the BlockTracker contract.
#[derive(Debug)]
pub struct BlockTrackerSession<C> {
    transactor: Arc<Transactor<C>>,
    address: Address,
}

impl<C: ChainClient> BlockTrackerSession<C> {
    /// Creates a new session for the contract at `address`.
    pub fn new(transactor: Arc<Transactor<C>>, address: Address) -> Self {
        Self { transactor, address }
    }

    /// Record the winning builder of an L1 block.
    pub async fn record_l1_block(
        &self,
        opts: TxnOpts,
        block_number: u64,
        builder_name: &str,
    ) -> Result<SubmittedTxn, TransactorError> {
        let call = BlockTracker::recordL1BlockCall {
            blockNumber: U256::from(block_number),
            builderName: builder_name.to_owned(),
        };
        let request = TransactionRequest::default()
            .with_to(self.address)
            .with_input(call.abi_encode());
        self.transactor.send(request, opts).await
    }
}
