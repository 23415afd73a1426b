//! Merkle commitment over an ordered transaction set.
//!
//! Behavior:
//! - Leaves are `sha256(payload)` in input order.
//! - Parents are `sha256(left.hash ++ right.hash)` over the hex strings.
//! - An odd node at the end of a level is paired with itself, never dropped.
//! - An empty transaction set has no root and is rejected.
//!
//! The tree is transient: it is built for one commitment and then dropped.

use crate::crypto::{sha256_hex_concat, HexHash};
use crate::error::ChainError;
use crate::transaction::Transaction;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerkleNode {
    pub hash: HexHash,
    pub left: Option<Box<MerkleNode>>,
    /// `None` on an internal node means the left child was paired with itself.
    pub right: Option<Box<MerkleNode>>,
}

impl MerkleNode {
    pub fn leaf(tx: &Transaction) -> Self {
        Self {
            hash: tx.hash(),
            left: None,
            right: None,
        }
    }

    fn parent(left: MerkleNode, right: Option<MerkleNode>) -> Self {
        let hash = {
            let right_hash = right.as_ref().map_or(&left.hash, |r| &r.hash);
            hash_pair(&left.hash, right_hash)
        };
        Self {
            hash,
            left: Some(Box::new(left)),
            right: right.map(Box::new),
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.left.is_none()
    }

    pub fn leaf_count(&self) -> usize {
        match (&self.left, &self.right) {
            (None, _) => 1,
            (Some(l), None) => l.leaf_count(),
            (Some(l), Some(r)) => l.leaf_count() + r.leaf_count(),
        }
    }

    /// Number of levels including the leaves.
    pub fn depth(&self) -> usize {
        1 + self.left.as_ref().map_or(0, |l| l.depth())
    }

    /// Hashes per level, root first. A node paired with itself appears once.
    pub fn levels(&self) -> Vec<Vec<&str>> {
        let mut levels = Vec::new();
        let mut current = vec![self];
        while !current.is_empty() {
            levels.push(current.iter().map(|n| n.hash.as_str()).collect());
            current = current
                .iter()
                .flat_map(|n| n.left.iter().chain(n.right.iter()))
                .map(|child| &**child)
                .collect();
        }
        levels
    }
}

pub(crate) fn hash_pair(left: &str, right: &str) -> HexHash {
    sha256_hex_concat([left, right])
}

/// Builds the full tree for `transactions`.
pub fn build_tree(transactions: &[Transaction]) -> Result<MerkleNode, ChainError> {
    if transactions.is_empty() {
        return Err(ChainError::EmptyTransactions);
    }

    let mut nodes: Vec<MerkleNode> = transactions.iter().map(MerkleNode::leaf).collect();

    while nodes.len() > 1 {
        let mut level = Vec::with_capacity(nodes.len().div_ceil(2));
        let mut iter = nodes.into_iter();
        while let Some(left) = iter.next() {
            level.push(MerkleNode::parent(left, iter.next()));
        }
        nodes = level;
    }

    nodes.pop().ok_or(ChainError::EmptyTransactions)
}

/// Computes the Merkle root hash of `transactions`.
pub fn merkle_root(transactions: &[Transaction]) -> Result<HexHash, ChainError> {
    build_tree(transactions).map(|root| root.hash)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::sha256_hex;
    use crate::transaction::batch;

    #[test]
    fn test_empty_is_rejected() {
        assert_eq!(merkle_root(&[]), Err(ChainError::EmptyTransactions));
    }

    #[test]
    fn test_single_leaf_is_root() {
        let txs = batch(["only"]);
        let root = build_tree(&txs).unwrap();
        assert!(root.is_leaf());
        assert_eq!(root.hash, sha256_hex("only"));
    }

    #[test]
    fn test_even_leaves_match_manual_reduction() {
        let txs = batch(["a", "b", "c", "d"]);
        let (a, b, c, d) = (
            sha256_hex("a"),
            sha256_hex("b"),
            sha256_hex("c"),
            sha256_hex("d"),
        );
        let expected = hash_pair(&hash_pair(&a, &b), &hash_pair(&c, &d));
        assert_eq!(merkle_root(&txs).unwrap(), expected);
    }

    #[test]
    fn test_odd_count_duplicates_last_node() {
        let txs = batch(["A", "B", "C"]);
        let (ha, hb, hc) = (sha256_hex("A"), sha256_hex("B"), sha256_hex("C"));

        let left = hash_pair(&ha, &hb);
        let right = hash_pair(&hc, &hc);
        let root = build_tree(&txs).unwrap();

        assert_eq!(root.levels()[1], vec![left.as_str(), right.as_str()]);
        assert_eq!(root.hash, hash_pair(&left, &right));
        // Dropping C would leave `left` as the root.
        assert_ne!(root.hash, left);
    }

    #[test]
    fn test_deterministic_and_order_sensitive() {
        let txs = batch(["1500USD Sent", "1600USD Sent", "1700USD Sent"]);
        assert_eq!(merkle_root(&txs).unwrap(), merkle_root(&txs).unwrap());

        let reversed: Vec<_> = txs.iter().rev().cloned().collect();
        assert_ne!(merkle_root(&txs).unwrap(), merkle_root(&reversed).unwrap());
    }

    #[test]
    fn test_tree_shape() {
        let txs = batch(["1", "2", "3", "4", "5"]);
        let root = build_tree(&txs).unwrap();
        assert_eq!(root.leaf_count(), 5);
        assert_eq!(root.depth(), 4);
        assert_eq!(root.levels().last().unwrap().len(), 5);
    }
}
