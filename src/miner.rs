//! Proof-of-work mining.
//!
//! A block is mined when the last `difficulty` hex characters of its hash are all `'0'`.
//! The whole trailing window is re-examined on every attempt.

use crate::blockchain::Block;
use crate::crypto::HEX_HASH_LEN;
use crate::error::ChainError;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

pub const DEFAULT_DIFFICULTY: usize = 4;

/// Attempts between checks of the abort flag.
const ABORT_CHECK_INTERVAL: u64 = 1024;

/// True if all of the trailing `difficulty` characters of `hash` are `'0'`.
pub fn meets_difficulty(hash: &str, difficulty: usize) -> bool {
    let bytes = hash.as_bytes();
    if difficulty > bytes.len() {
        return false;
    }
    bytes[bytes.len() - difficulty..].iter().all(|&c| c == b'0')
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Miner {
    difficulty: usize,
}

impl Default for Miner {
    fn default() -> Self {
        Self {
            difficulty: DEFAULT_DIFFICULTY,
        }
    }
}

impl Miner {
    pub fn new(difficulty: usize) -> Result<Self, ChainError> {
        if difficulty == 0 || difficulty > HEX_HASH_LEN {
            return Err(ChainError::InvalidDifficulty(difficulty));
        }
        Ok(Self { difficulty })
    }

    pub fn difficulty(&self) -> usize {
        self.difficulty
    }

    pub fn is_mined(&self, block: &Block) -> bool {
        meets_difficulty(&block.current_block_hash, self.difficulty)
    }

    /// Searches nonces from zero until the block hash meets the difficulty.
    ///
    /// There is no bound on the search: at high difficulties this does not return in
    /// practice. Use [`Miner::mine_until`] when the caller must be able to give up.
    pub fn mine(&self, mut block: Block) -> Block {
        block.nonce = 0;
        block.seal();
        while !self.is_mined(&block) {
            block.nonce += 1;
            block.seal();
        }
        block
    }

    /// Like [`Miner::mine`], but gives up and returns `None` once `abort` is raised.
    pub fn mine_until(&self, mut block: Block, abort: &AtomicBool) -> Option<Block> {
        block.nonce = 0;
        block.seal();

        while !self.is_mined(&block) {
            if block.nonce % ABORT_CHECK_INTERVAL == 0 && abort.load(Ordering::Relaxed) {
                debug!(nonce = block.nonce, "mining aborted");
                return None;
            }
            block.nonce += 1;
            block.seal();
        }

        debug!(
            nonce = block.nonce,
            hash = %block.current_block_hash,
            "block mined"
        );
        Some(block)
    }
}
