use super::*;

use alloy_primitives::{address, Address, Bytes, U256};
use alloy_rpc_types_eth::{BlockTransactions, Header, Log};
use alloy_sol_types::SolEvent;
use preconf_oracle_db::test_utils::setup_test_db;
use preconf_oracle_events::EventHandler;
use preconf_oracle_primitives::Winner;
use std::collections::HashMap;

const BUILDER: Address = address!("000000000000000000000000000000000000abcd");
const OTHER_BUILDER: Address = address!("000000000000000000000000000000000000abdc");

const DECAY_START: u64 = 1_615_195_200_000;
const DECAY_MID: u64 = 1_615_195_202_500;
const DECAY_END: u64 = 1_615_195_205_000;

struct MockBlockClient {
    blocks: HashMap<u64, Block>,
}

#[async_trait::async_trait]
impl BlockClient for MockBlockClient {
    async fn block_by_number(&self, block_number: u64) -> Result<Option<Block>, UpdaterError> {
        Ok(self.blocks.get(&block_number).cloned())
    }
}

fn tx_hash(byte: u8) -> B256 {
    let mut hash = B256::ZERO;
    hash.0[0] = byte;
    hash
}

fn block(number: u64, timestamp: u64, hashes: Vec<B256>) -> Block {
    Block {
        header: Header {
            inner: alloy_consensus::Header { number, timestamp, ..Default::default() },
            ..Default::default()
        },
        transactions: BlockTransactions::Hashes(hashes),
        ..Default::default()
    }
}

fn index(byte: u8) -> B256 {
    let mut index = B256::ZERO;
    index.0[31] = byte;
    index
}

fn commitment(
    idx: u8,
    committer: Address,
    txn_hash: String,
    block_number: u64,
) -> PreconfManager::CommitmentStored {
    PreconfManager::CommitmentStored {
        commitmentIndex: index(idx),
        bidder: address!("1111111111111111111111111111111111111111"),
        committer,
        bid: U256::from(100u64),
        blockNumber: U256::from(block_number),
        bidHash: index(idx),
        decayStartTimeStamp: DECAY_START,
        decayEndTimeStamp: DECAY_END,
        txnHash: txn_hash,
        commitmentHash: index(idx),
        bidSignature: Bytes::from_static(b"bid signature"),
        commitmentSignature: Bytes::from_static(b"commitment signature"),
        committedAt: U256::from(1u64),
        sharedSecretKey: Bytes::from_static(b"secret"),
    }
}

fn hash_string(hash: B256) -> String {
    // Commitments carry hashes without the 0x prefix.
    format!("{hash:x}")
}

async fn worker_with_block(
    db: Database,
    block: Block,
) -> CommitmentWorker<MockBlockClient> {
    CommitmentWorker {
        l1: MockBlockClient { blocks: HashMap::from([(block.header.number, block)]) },
        db,
        waitlist: HashMap::new(),
        metrics: UpdaterMetrics::default(),
    }
}

async fn settlements(db: &Database) -> Vec<Settlement> {
    let mut all = db.pending_settlements_after(0, 100, false).await.unwrap();
    all.extend(db.pending_settlements_after(0, 100, true).await.unwrap());
    all.sort_by_key(|(id, _)| *id);
    all.into_iter().map(|(_, settlement)| settlement).collect()
}

#[tokio::test]
async fn test_simple_reward_with_decay() {
    let db = setup_test_db().await;
    db.register_winner(Winner { block_number: 5, builder: BUILDER, window: 1 }).await.unwrap();

    let claimed = tx_hash(1);
    let mut worker =
        worker_with_block(db.clone(), block(5, DECAY_MID, vec![claimed, tx_hash(2)])).await;
    worker.handle_commitment(commitment(1, BUILDER, hash_string(claimed), 5)).await;

    let settled = settlements(&db).await;
    assert_eq!(settled.len(), 1);
    let settlement = &settled[0];
    assert_eq!(settlement.settlement_type, SettlementType::Reward);
    assert_eq!(settlement.decay_percentage, 50);
    assert_eq!(settlement.amount, 0);
    assert_eq!(settlement.window, 1);
    assert_eq!(settlement.builder, BUILDER);
    assert_eq!(settlement.transaction_hash, hash_string(claimed));
}

#[tokio::test]
async fn test_slash_when_transaction_missing() {
    let db = setup_test_db().await;
    db.register_winner(Winner { block_number: 5, builder: BUILDER, window: 1 }).await.unwrap();

    let mut worker =
        worker_with_block(db.clone(), block(5, DECAY_MID, vec![tx_hash(2), tx_hash(3)])).await;
    worker.handle_commitment(commitment(1, BUILDER, hash_string(tx_hash(1)), 5)).await;

    let settled = settlements(&db).await;
    assert_eq!(settled.len(), 1);
    assert_eq!(settled[0].settlement_type, SettlementType::Slash);
    assert_eq!(settled[0].decay_percentage, 0);
}

#[tokio::test]
async fn test_return_when_committer_is_not_winner() {
    let db = setup_test_db().await;
    db.register_winner(Winner { block_number: 5, builder: BUILDER, window: 1 }).await.unwrap();

    let claimed = tx_hash(1);
    let mut worker = worker_with_block(db.clone(), block(5, DECAY_MID, vec![claimed])).await;
    worker.handle_commitment(commitment(1, OTHER_BUILDER, hash_string(claimed), 5)).await;

    let settled = settlements(&db).await;
    assert_eq!(settled.len(), 1);
    assert_eq!(settled[0].settlement_type, SettlementType::Return);
    assert_eq!(settled[0].builder, OTHER_BUILDER);

    // Returns flow only through the return stream.
    assert!(db.pending_settlements_after(0, 100, false).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_bundle_reward_in_claimed_order() {
    let db = setup_test_db().await;
    db.register_winner(Winner { block_number: 5, builder: BUILDER, window: 1 }).await.unwrap();

    let block_txs = vec![tx_hash(1), tx_hash(3), tx_hash(4), tx_hash(5), tx_hash(6), tx_hash(7)];
    let bundle = [tx_hash(3), tx_hash(5), tx_hash(7)]
        .iter()
        .map(|hash| hash_string(*hash))
        .collect::<Vec<_>>()
        .join(",");

    let mut worker = worker_with_block(db.clone(), block(5, DECAY_MID, block_txs)).await;
    worker.handle_commitment(commitment(1, BUILDER, bundle, 5)).await;

    let settled = settlements(&db).await;
    assert_eq!(settled[0].settlement_type, SettlementType::Reward);
    assert_eq!(settled[0].decay_percentage, 50);
}

#[tokio::test]
async fn test_bundle_slash_on_reordered_hashes() {
    let db = setup_test_db().await;
    db.register_winner(Winner { block_number: 5, builder: BUILDER, window: 1 }).await.unwrap();

    let block_txs = vec![tx_hash(1), tx_hash(3), tx_hash(4), tx_hash(5), tx_hash(6), tx_hash(7)];
    // H7 appears after H3 in the block, not before.
    let bundle = format!("{},{}", hash_string(tx_hash(7)), hash_string(tx_hash(3)));

    let mut worker = worker_with_block(db.clone(), block(5, DECAY_MID, block_txs)).await;
    worker.handle_commitment(commitment(1, BUILDER, bundle, 5)).await;

    let settled = settlements(&db).await;
    assert_eq!(settled[0].settlement_type, SettlementType::Slash);
    assert_eq!(settled[0].decay_percentage, 0);
}

#[tokio::test]
async fn test_duplicate_commitment_produces_one_settlement() {
    let db = setup_test_db().await;
    db.register_winner(Winner { block_number: 5, builder: BUILDER, window: 1 }).await.unwrap();

    let claimed = tx_hash(1);
    let mut worker = worker_with_block(db.clone(), block(5, DECAY_MID, vec![claimed])).await;
    let event = commitment(1, BUILDER, hash_string(claimed), 5);
    worker.handle_commitment(event.clone()).await;
    worker.handle_commitment(event).await;

    assert_eq!(settlements(&db).await.len(), 1);
}

#[tokio::test]
async fn test_commitment_waits_for_winner_registration() {
    let db = setup_test_db().await;
    let claimed = tx_hash(1);
    let mut worker = worker_with_block(db.clone(), block(5, DECAY_MID, vec![claimed])).await;

    worker.handle_commitment(commitment(1, BUILDER, hash_string(claimed), 5)).await;
    assert!(settlements(&db).await.is_empty());
    assert_eq!(worker.waitlist.len(), 1);

    // The winner registration becomes visible before the commitment is
    // processed.
    db.register_winner(Winner { block_number: 5, builder: BUILDER, window: 1 }).await.unwrap();
    worker.drain_waitlist().await;

    let settled = settlements(&db).await;
    assert_eq!(settled.len(), 1);
    assert_eq!(settled[0].settlement_type, SettlementType::Reward);
    assert!(worker.waitlist.is_empty());
}

#[tokio::test]
async fn test_waitlist_discards_past_horizon() {
    let db = setup_test_db().await;
    db.register_winner(Winner { block_number: 400, builder: BUILDER, window: 41 }).await.unwrap();

    let mut worker = worker_with_block(db.clone(), block(5, DECAY_MID, vec![])).await;
    worker.handle_commitment(commitment(1, BUILDER, hash_string(tx_hash(1)), 5)).await;
    assert_eq!(worker.waitlist.len(), 1);

    worker.drain_waitlist().await;
    assert!(worker.waitlist.is_empty());
    assert!(!db.is_settled(index(1)).await.unwrap());
}

#[tokio::test]
async fn test_encrypted_commitment_digest_mismatch_does_not_change_decision() {
    let db = setup_test_db().await;
    db.register_winner(Winner { block_number: 5, builder: BUILDER, window: 1 }).await.unwrap();
    db.add_encrypted_commitment(EncryptedCommitment {
        commitment_index: index(1),
        committer: BUILDER,
        digest: index(99),
        signature: b"signature".to_vec(),
        committed_at_block: 0,
    })
    .await
    .unwrap();

    let claimed = tx_hash(1);
    let mut worker = worker_with_block(db.clone(), block(5, DECAY_MID, vec![claimed])).await;
    worker.handle_commitment(commitment(1, BUILDER, hash_string(claimed), 5)).await;

    let settled = settlements(&db).await;
    assert_eq!(settled[0].settlement_type, SettlementType::Reward);
}

#[tokio::test]
async fn test_full_pipeline_through_handlers() {
    let db = setup_test_db().await;
    db.register_winner(Winner { block_number: 5, builder: BUILDER, window: 1 }).await.unwrap();

    let claimed = tx_hash(1);
    let updater = Updater::new(
        MockBlockClient {
            blocks: HashMap::from([(5, block(5, DECAY_MID, vec![claimed]))]),
        },
        db.clone(),
    );
    let (enc_handler, commit_handler) = updater.handlers();
    let shutdown = tokio_util::sync::CancellationToken::new();
    let handle = updater.start(shutdown.child_token());

    let enc_event = PreconfManager::EncryptedCommitmentStored {
        commitmentIndex: index(1),
        committer: BUILDER,
        commitmentDigest: index(1),
        commitmentSignature: Bytes::from_static(b"commitment signature"),
        committedAt: U256::from(1u64),
    };
    let log = Log {
        inner: alloy_primitives::Log { address: Address::ZERO, data: enc_event.encode_log_data() },
        ..Default::default()
    };
    enc_handler.handle(&log).await.unwrap();

    let event = commitment(1, BUILDER, hash_string(claimed), 5);
    let log = Log {
        inner: alloy_primitives::Log { address: Address::ZERO, data: event.encode_log_data() },
        ..Default::default()
    };
    commit_handler.handle(&log).await.unwrap();

    // The workers consume asynchronously; poll the store.
    let mut settled = false;
    for _ in 0..100 {
        if db.is_settled(index(1)).await.unwrap() {
            settled = true;
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert!(settled, "commitment was not settled through the pipeline");
    assert!(db.get_encrypted_commitment(index(1)).await.unwrap().is_some());

    shutdown.cancel();
    handle.await.unwrap();
}

#[test]
fn test_decay_percentage_bounds() {
    assert_eq!(decay_percentage(DECAY_START - 1, DECAY_START, DECAY_END), 100);
    assert_eq!(decay_percentage(DECAY_START, DECAY_START, DECAY_END), 100);
    assert_eq!(decay_percentage(DECAY_MID, DECAY_START, DECAY_END), 50);
    assert_eq!(decay_percentage(DECAY_END, DECAY_START, DECAY_END), 0);
    assert_eq!(decay_percentage(DECAY_END + 1, DECAY_START, DECAY_END), 0);
    // A degenerate window never divides by zero.
    assert_eq!(decay_percentage(5, 10, 10), 100);
    assert_eq!(decay_percentage(10, 10, 10), 100);
    assert_eq!(decay_percentage(11, 10, 10), 0);
}

#[test]
fn test_ordered_subsequence() {
    let block = [tx_hash(1), tx_hash(3), tx_hash(4), tx_hash(5)];
    assert!(is_ordered_subsequence(&[tx_hash(1)], &block));
    assert!(is_ordered_subsequence(&[tx_hash(1), tx_hash(4)], &block));
    assert!(is_ordered_subsequence(&[tx_hash(1), tx_hash(3), tx_hash(4), tx_hash(5)], &block));
    assert!(!is_ordered_subsequence(&[tx_hash(4), tx_hash(1)], &block));
    assert!(!is_ordered_subsequence(&[tx_hash(1), tx_hash(2)], &block));
    assert!(!is_ordered_subsequence(&[tx_hash(1), tx_hash(1)], &block));
}

#[test]
fn test_parse_txn_hashes() {
    let single = parse_txn_hashes(&hash_string(tx_hash(1))).unwrap();
    assert_eq!(single, vec![tx_hash(1)]);

    let bundle_text = format!("0x{},{}", hash_string(tx_hash(1)), hash_string(tx_hash(2)));
    let bundle = parse_txn_hashes(&bundle_text).unwrap();
    assert_eq!(bundle, vec![tx_hash(1), tx_hash(2)]);

    assert!(parse_txn_hashes("not-a-hash").is_err());
    assert!(parse_txn_hashes("").is_err());
}
