// End-to-end node flows against the in-memory store: genesis boot, simple
// transfers with and without mining rewards, and nonce-ordered admission.

use minichain::genesis::Allocations;
use minichain::mempool::AdmissionError;
use minichain::node::{Node, NodeConfig};
use minichain::types::Transaction;

const ALICE: &str = "a11ce000";
const BOB: &str = "b0b00000";

fn test_config() -> NodeConfig {
    NodeConfig {
        difficulty_bits: 0,
        max_tx_per_block: 16,
        max_pow_tries: 1_000,
        genesis_allocations: Allocations::from([
            (ALICE.to_string(), 1_000_000i64),
            (BOB.to_string(), 500_000i64),
        ]),
        miner_address: None,
        block_reward_minor: 0,
        min_fee_minor: 1,
    }
}

fn transfer(from: &str, to: &str, amount: i64, fee: i64, nonce: u64) -> Transaction {
    Transaction::builder()
        .from(from)
        .to(to)
        .amount_minor(amount)
        .fee_minor(fee)
        .nonce(nonce)
        .signature(vec![7u8; 64])
        .build()
        .unwrap()
}

#[test]
fn genesis_only_boot() {
    let node = Node::in_memory(test_config());
    node.start().unwrap();

    let head = node.chain().get_head().unwrap().expect("head after start");
    assert_eq!(node.chain().get_height(&head).unwrap(), Some(0));
    assert_eq!(node.chain().size().unwrap(), 1);
    assert_eq!(node.state().get_balance(ALICE), 1_000_000);
    assert_eq!(node.state().get_balance(BOB), 500_000);
}

#[test]
fn start_is_idempotent() {
    let node = Node::in_memory(test_config());
    node.start().unwrap();
    node.start().unwrap();
    assert_eq!(node.chain().size().unwrap(), 1);
    assert_eq!(node.state().get_balance(ALICE), 1_000_000);
}

#[test]
fn no_empty_blocks_after_genesis() {
    let node = Node::in_memory(test_config());
    node.start().unwrap();
    assert_eq!(node.tick().unwrap(), None);
    let head = node.chain().get_head().unwrap().unwrap();
    assert_eq!(node.chain().get_height(&head).unwrap(), Some(0));
}

#[test]
fn simple_transfer() {
    let node = Node::in_memory(test_config());
    node.start().unwrap();

    node.mempool().add(transfer(ALICE, BOB, 100, 1, 0)).unwrap();
    let head = node.tick().unwrap().expect("block produced");

    assert_eq!(node.chain().get_height(&head).unwrap(), Some(1));
    assert_eq!(node.state().get_balance(ALICE), 999_899);
    assert_eq!(node.state().get_balance(BOB), 500_100);
    assert_eq!(node.state().get_nonce(ALICE), 1);
    assert_eq!(node.mempool().size(), 0);

    let block = node.chain().get_block(&head).unwrap().unwrap();
    assert_eq!(block.transactions.len(), 1);
    assert_eq!(block.transactions[0].amount_minor, 100);
}

#[test]
fn transfer_with_miner_reward() {
    let config = test_config().with_miner(ALICE, 50);
    let node = Node::in_memory(config);
    node.start().unwrap();

    node.mempool().add(transfer(ALICE, BOB, 100, 1, 0)).unwrap();
    node.tick().unwrap().expect("block produced");

    // alice pays 101, then collects base reward 50 plus her own fee back.
    assert_eq!(node.state().get_balance(ALICE), 999_950);
    assert_eq!(node.state().get_balance(BOB), 500_100);
}

#[test]
fn nonce_ordering_and_replacement() {
    let node = Node::in_memory(test_config());
    node.start().unwrap();

    let err = node.mempool().add(transfer(ALICE, BOB, 10, 1, 1)).unwrap_err();
    assert_eq!(err, AdmissionError::BadNonce { expected: 0, got: 1 });

    node.mempool().add(transfer(ALICE, BOB, 10, 1, 0)).unwrap();
    // Same (from, nonce) replaces the pending entry.
    node.mempool().add(transfer(ALICE, BOB, 25, 1, 0)).unwrap();
    assert_eq!(node.mempool().size(), 1);

    node.tick().unwrap().expect("block produced");
    assert_eq!(node.state().get_balance(BOB), 500_025);
    assert_eq!(node.state().get_nonce(ALICE), 1);
}

#[test]
fn sequential_transfers_across_ticks() {
    let node = Node::in_memory(test_config());
    node.start().unwrap();

    node.mempool().add(transfer(ALICE, BOB, 100, 1, 0)).unwrap();
    node.tick().unwrap().expect("block 1");
    node.mempool().add(transfer(ALICE, BOB, 200, 1, 1)).unwrap();
    let head = node.tick().unwrap().expect("block 2");

    assert_eq!(node.chain().get_height(&head).unwrap(), Some(2));
    assert_eq!(node.state().get_balance(ALICE), 999_698);
    assert_eq!(node.state().get_balance(BOB), 500_300);
    assert_eq!(node.state().get_nonce(ALICE), 2);

    let ordered = node.chain().blocks_in_order().unwrap();
    let heights: Vec<u64> = ordered.iter().map(|b| b.header.height).collect();
    assert_eq!(heights, vec![0, 1, 2]);
}

#[test]
fn mining_exhaustion_requeues_transactions() {
    let mut config = test_config();
    config.difficulty_bits = 256;
    config.max_pow_tries = 10;
    let node = Node::in_memory(config);
    node.start().unwrap();

    node.mempool().add(transfer(ALICE, BOB, 100, 1, 0)).unwrap();
    assert_eq!(node.tick().unwrap(), None);

    // Nothing changed and the tx is back in the pool.
    assert_eq!(node.mempool().size(), 1);
    assert_eq!(node.state().get_balance(ALICE), 1_000_000);
    let head = node.chain().get_head().unwrap().unwrap();
    assert_eq!(node.chain().get_height(&head).unwrap(), Some(0));
}
