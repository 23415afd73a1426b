use crate::blockchain::core::chain::Block;
use crate::error::ChainError;

/// Recomputes the block hash and compares it with the stored one.
pub fn verify_block_hash(block: &Block) -> Result<(), ChainError> {
    let actual = block.calculate_hash();
    if actual != block.current_block_hash {
        return Err(ChainError::HashMismatch {
            expected: block.current_block_hash.clone(),
            actual,
        });
    }
    Ok(())
}

pub fn verify_merkle_root(block: &Block) -> Result<(), ChainError> {
    if Block::commitment(&block.transactions) != block.merkle_root {
        return Err(ChainError::InvalidMerkleRoot);
    }
    Ok(())
}

/// Structural checks applied to every block taken off the wire.
pub fn validate_block(block: &Block) -> Result<(), ChainError> {
    verify_block_hash(block)?;
    verify_merkle_root(block)
}

pub fn check_linkage(current: &Block, next: &Block) -> Result<(), ChainError> {
    if current.current_block_hash != next.prev_block_hash {
        return Err(ChainError::InvalidBlockLinkage);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::batch;

    #[test]
    fn test_hash_mismatch_reports_both_hashes() {
        let mut block = Block::with_timestamp("p", 1, batch(["a"]));
        let stored = block.current_block_hash.clone();
        block.nonce = 42;

        match verify_block_hash(&block) {
            Err(ChainError::HashMismatch { expected, actual }) => {
                assert_eq!(expected, stored);
                assert_eq!(actual, block.calculate_hash());
            }
            other => panic!("expected hash mismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_merkle_root_must_match_transactions() {
        let mut block = Block::with_timestamp("p", 1, batch(["a", "b"]));
        block.merkle_root = Block::commitment(&batch(["a"]));
        block.seal();

        assert!(verify_block_hash(&block).is_ok());
        assert_eq!(validate_block(&block), Err(ChainError::InvalidMerkleRoot));
    }
}
