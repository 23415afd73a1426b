use crate::blockchain::core::validation::{check_linkage, validate_block, verify_block_hash};
use crate::crypto::{sha256_hex_concat, HexHash};
use crate::error::ChainError;
use crate::merkle::merkle_root;
use crate::miner::Miner;
use crate::transaction::Transaction;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub prev_block_hash: HexHash,
    pub current_block_hash: HexHash,
    /// Unix seconds.
    pub timestamp: i64,
    pub nonce: u64,
    pub merkle_root: HexHash,
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// Creates an unmined block on top of `prev_block_hash`, stamped with the current time.
    pub fn new(prev_block_hash: impl Into<HexHash>, transactions: Vec<Transaction>) -> Self {
        Self::with_timestamp(
            prev_block_hash,
            chrono::Utc::now().timestamp(),
            transactions,
        )
    }

    pub fn with_timestamp(
        prev_block_hash: impl Into<HexHash>,
        timestamp: i64,
        transactions: Vec<Transaction>,
    ) -> Self {
        let mut block = Block {
            prev_block_hash: prev_block_hash.into(),
            current_block_hash: HexHash::new(),
            timestamp,
            nonce: 0,
            merkle_root: Block::commitment(&transactions),
            transactions,
        };
        block.current_block_hash = block.calculate_hash();
        block
    }

    /// The first block of every ledger: no parent, no transactions, not mined.
    pub fn genesis() -> Self {
        Self::new(HexHash::new(), Vec::new())
    }

    /// Merkle root of `transactions`, or the empty string for an empty set.
    pub fn commitment(transactions: &[Transaction]) -> HexHash {
        merkle_root(transactions).unwrap_or_default()
    }

    /// Hash over the canonical encoding: previous hash, decimal timestamp,
    /// decimal nonce, Merkle root, then every payload in order.
    pub fn calculate_hash(&self) -> HexHash {
        let timestamp = self.timestamp.to_string();
        let nonce = self.nonce.to_string();
        let header = [
            self.prev_block_hash.as_str(),
            timestamp.as_str(),
            nonce.as_str(),
            self.merkle_root.as_str(),
        ];
        sha256_hex_concat(
            header
                .into_iter()
                .chain(self.transactions.iter().map(Transaction::data)),
        )
    }

    /// Recomputes and stores `current_block_hash`.
    pub fn seal(&mut self) {
        self.current_block_hash = self.calculate_hash();
    }

    pub fn is_hash_consistent(&self) -> bool {
        self.current_block_hash == self.calculate_hash()
    }

    pub fn contains(&self, tx: &Transaction) -> bool {
        self.transactions.contains(tx)
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    /// Replaces the transactions in place and re-hashes this block only.
    /// Neighbors are not re-linked, so a chain holding this block stops validating.
    pub fn change_block(&mut self, transactions: Vec<Transaction>) {
        self.merkle_root = Block::commitment(&transactions);
        self.transactions = transactions;
        self.seal();
    }
}

/// Builds a block on `prev_block_hash` and mines it at `difficulty`.
///
/// Mining is unbounded (see [`Miner::mine`]); keep `difficulty` low outside tests.
pub fn create_block(
    prev_block_hash: impl Into<HexHash>,
    transactions: Vec<Transaction>,
    difficulty: usize,
) -> Result<Block, ChainError> {
    let miner = Miner::new(difficulty)?;
    Ok(miner.mine(Block::new(prev_block_hash, transactions)))
}

/// Append-only ordered sequence of blocks.
#[derive(Debug, Clone, Default)]
pub struct Blockchain {
    blocks: Vec<Block>,
}

impl Blockchain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_genesis(genesis: Block) -> Self {
        Self {
            blocks: vec![genesis],
        }
    }

    /// Appends without validation; the first block becomes the head.
    pub fn add_block(&mut self, block: Block) {
        self.blocks.push(block);
    }

    /// Appends only if `block` is hash-consistent and links to the current tail.
    pub fn try_add_block(&mut self, block: Block) -> Result<(), ChainError> {
        validate_block(&block)?;
        if let Some(tail) = self.tail() {
            check_linkage(tail, &block)?;
        }
        self.blocks.push(block);
        Ok(())
    }

    /// True when every adjacent pair is linked and every block re-hashes to its stored hash.
    /// Never mutates the chain.
    pub fn validity_check(&self) -> bool {
        if self.blocks.iter().any(|b| verify_block_hash(b).is_err()) {
            return false;
        }
        self.blocks
            .windows(2)
            .all(|pair| check_linkage(&pair[0], &pair[1]).is_ok())
    }

    /// Rewrites the transactions of the block at `index` in place; see [`Block::change_block`].
    pub fn change_block(
        &mut self,
        index: usize,
        transactions: Vec<Transaction>,
    ) -> Result<(), ChainError> {
        let block = self
            .blocks
            .get_mut(index)
            .ok_or(ChainError::BlockNotFound(index))?;
        block.change_block(transactions);
        Ok(())
    }

    pub fn head(&self) -> Option<&Block> {
        self.blocks.first()
    }

    pub fn tail(&self) -> Option<&Block> {
        self.blocks.last()
    }

    pub fn tip_hash(&self) -> Option<&str> {
        self.tail().map(|b| b.current_block_hash.as_str())
    }

    pub fn get(&self, index: usize) -> Option<&Block> {
        self.blocks.get(index)
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Block> {
        self.blocks.iter()
    }

    pub fn hashes(&self) -> Vec<HexHash> {
        self.blocks
            .iter()
            .map(|b| b.current_block_hash.clone())
            .collect()
    }

    pub fn contains_block(&self, hash: &str) -> bool {
        self.blocks.iter().any(|b| b.current_block_hash == hash)
    }

    /// True if `tx` was already committed in any block.
    pub fn contains_transaction(&self, tx: &Transaction) -> bool {
        self.blocks.iter().any(|b| b.contains(tx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::batch;

    const DIFFICULTY: usize = 2;

    fn build_chain(rounds: usize) -> Blockchain {
        let mut chain = Blockchain::with_genesis(Block::genesis());
        for round in 0..rounds {
            let prev = chain.tip_hash().unwrap().to_string();
            let txs = batch((0..4).map(|i| format!("round {} tx {}", round, i)));
            chain.add_block(create_block(prev, txs, DIFFICULTY).unwrap());
        }
        chain
    }

    #[test]
    fn test_hash_is_pure() {
        let block = Block::with_timestamp("prev", 1_700_000_000, batch(["a", "b"]));
        assert_eq!(block.calculate_hash(), block.calculate_hash());
        assert!(block.is_hash_consistent());
    }

    #[test]
    fn test_canonical_encoding() {
        let block = Block::with_timestamp("ab", 17, batch(["x", "y"]));
        let expected = sha256_hex_concat([
            "ab",
            "17",
            "0",
            block.merkle_root.as_str(),
            "x",
            "y",
        ]);
        assert_eq!(block.current_block_hash, expected);
    }

    #[test]
    fn test_every_field_is_committed() {
        let base = Block::with_timestamp("prev", 100, batch(["a"]));

        let mut other = base.clone();
        other.nonce += 1;
        assert_ne!(other.calculate_hash(), base.current_block_hash);

        let mut other = base.clone();
        other.timestamp += 1;
        assert_ne!(other.calculate_hash(), base.current_block_hash);

        let mut other = base.clone();
        other.transactions.push(Transaction::from("b"));
        assert_ne!(other.calculate_hash(), base.current_block_hash);
    }

    #[test]
    fn test_genesis_has_empty_commitment() {
        let genesis = Block::genesis();
        assert!(genesis.prev_block_hash.is_empty());
        assert!(genesis.merkle_root.is_empty());
        assert_eq!(genesis.nonce, 0);
        assert!(genesis.is_hash_consistent());
    }

    #[test]
    fn test_fresh_chain_is_valid() {
        let chain = build_chain(3);
        assert_eq!(chain.len(), 4);
        assert!(chain.validity_check());
        assert_eq!(chain.head().unwrap().prev_block_hash, "");
    }

    #[test]
    fn test_change_block_breaks_validity() {
        let mut chain = build_chain(2);
        chain
            .change_block(1, batch(["meowww", "woffff", "krrrrr", "shhhhh"]))
            .unwrap();

        // The edited block is self-consistent, only the link to its successor breaks.
        assert!(chain.get(1).unwrap().is_hash_consistent());
        assert!(!chain.validity_check());
    }

    #[test]
    fn test_tampering_without_rehash_is_detected() {
        let mut chain = build_chain(1);
        let mut tampered = chain.get(1).unwrap().clone();
        tampered.transactions[0] = Transaction::from("forged");
        chain.blocks[1] = tampered;

        assert!(!chain.validity_check());
    }

    #[test]
    fn test_change_block_out_of_range() {
        let mut chain = build_chain(0);
        assert_eq!(
            chain.change_block(5, batch(["a"])),
            Err(ChainError::BlockNotFound(5))
        );
    }

    #[test]
    fn test_try_add_block_rejects_broken_link() {
        let mut chain = build_chain(0);
        let orphan = create_block("not-the-tip", batch(["a"]), 1).unwrap();
        assert_eq!(
            chain.try_add_block(orphan),
            Err(ChainError::InvalidBlockLinkage)
        );
        assert_eq!(chain.len(), 1);

        let prev = chain.tip_hash().unwrap().to_string();
        let linked = create_block(prev, batch(["a"]), 1).unwrap();
        assert!(chain.try_add_block(linked).is_ok());
        assert!(chain.contains_transaction(&Transaction::from("a")));
    }
}
