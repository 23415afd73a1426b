//! Integration tests for blocks, Merkle commitments and ledger integrity

use floodchain::blockchain::{create_block, Block, Blockchain};
use floodchain::merkle::build_tree;
use floodchain::miner::meets_difficulty;
use floodchain::transaction::batch;

const DIFFICULTY: usize = 3;

fn mined_chain(batches: &[[&str; 4]]) -> Result<Blockchain, Box<dyn std::error::Error>> {
    let mut chain = Blockchain::new();
    let mut prev = String::new();
    for txs in batches {
        let block = create_block(prev, batch(*txs), DIFFICULTY)?;
        prev = block.current_block_hash.clone();
        chain.add_block(block);
    }
    Ok(chain)
}

#[test]
fn test_two_block_chain_detects_tampering() -> Result<(), Box<dyn std::error::Error>> {
    let mut chain = mined_chain(&[
        ["Huzaifa", "Hamza", "Ahmed", "Daniyal"],
        ["frustrated", "happy", "mad", "sad"],
    ])?;

    assert_eq!(chain.len(), 2);
    assert!(chain.validity_check());
    for block in chain.iter() {
        assert!(meets_difficulty(&block.current_block_hash, DIFFICULTY));
    }

    chain.change_block(0, batch(["meowww", "woffff", "krrrrr", "shhhhh"]))?;
    assert!(!chain.validity_check());

    // The edited block commits to its new transactions.
    let edited = chain.head().unwrap();
    let tree = build_tree(&edited.transactions)?;
    assert_eq!(tree.hash, edited.merkle_root);
    assert_eq!(tree.leaf_count(), 4);
    assert_eq!(tree.depth(), 3);

    Ok(())
}

#[test]
fn test_longer_chain_stays_valid() -> Result<(), Box<dyn std::error::Error>> {
    let chain = mined_chain(&[
        ["a1", "a2", "a3", "a4"],
        ["b1", "b2", "b3", "b4"],
        ["c1", "c2", "c3", "c4"],
        ["d1", "d2", "d3", "d4"],
    ])?;

    assert!(chain.validity_check());
    let hashes = chain.hashes();
    for (i, block) in chain.iter().enumerate().skip(1) {
        assert_eq!(block.prev_block_hash, hashes[i - 1]);
    }
    assert_eq!(chain.tail().unwrap().current_block_hash, hashes[3]);
    Ok(())
}

#[test]
fn test_genesis_then_mined_block() -> Result<(), Box<dyn std::error::Error>> {
    let genesis = Block::genesis();
    let mut chain = Blockchain::with_genesis(genesis.clone());
    let block = create_block(genesis.current_block_hash.clone(), batch(["x", "y", "z"]), 2)?;
    chain.try_add_block(block)?;

    assert!(chain.validity_check());
    assert_eq!(chain.len(), 2);
    Ok(())
}

#[test]
fn test_block_round_trips_through_json() -> Result<(), Box<dyn std::error::Error>> {
    let block = create_block("prev", batch(["1500USD Sent", "1600USD Sent"]), 2)?;
    let json = serde_json::to_string(&block)?;
    let back: Block = serde_json::from_str(&json)?;

    assert_eq!(back, block);
    assert!(back.is_hash_consistent());
    Ok(())
}
