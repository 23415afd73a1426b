//! Error types for Floodchain

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    /// Listen, dial or accept failure, including timeouts.
    ConnectionError(String),
    /// Malformed, oversized or untagged wire message.
    DecodeError(String),
    /// Stored block hash disagrees with the recomputed one.
    HashMismatch { expected: String, actual: String },
    InvalidMerkleRoot,
    InvalidBlockLinkage,
    EmptyTransactions,
    InvalidDifficulty(usize),
    BlockNotFound(usize),
    ConfigError(String),
    IoError(String),
}

impl fmt::Display for ChainError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ChainError::ConnectionError(msg) => write!(f, "Connection error: {}", msg),
            ChainError::DecodeError(msg) => write!(f, "Decode error: {}", msg),
            ChainError::HashMismatch { expected, actual } => write!(
                f,
                "Block hash mismatch: stored {}, recomputed {}",
                expected, actual
            ),
            ChainError::InvalidMerkleRoot => write!(f, "Invalid Merkle root"),
            ChainError::InvalidBlockLinkage => write!(f, "Invalid block linkage"),
            ChainError::EmptyTransactions => {
                write!(f, "Cannot commit to an empty transaction set")
            }
            ChainError::InvalidDifficulty(k) => {
                write!(f, "Invalid mining difficulty {} (expected 1..=64)", k)
            }
            ChainError::BlockNotFound(index) => write!(f, "No block at index {}", index),
            ChainError::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
            ChainError::IoError(msg) => write!(f, "IO error: {}", msg),
        }
    }
}

impl std::error::Error for ChainError {}

impl From<std::io::Error> for ChainError {
    fn from(err: std::io::Error) -> Self {
        ChainError::IoError(err.to_string())
    }
}

impl From<serde_json::Error> for ChainError {
    fn from(err: serde_json::Error) -> Self {
        ChainError::DecodeError(err.to_string())
    }
}

impl From<toml::de::Error> for ChainError {
    fn from(err: toml::de::Error) -> Self {
        ChainError::ConfigError(err.to_string())
    }
}

/// Convenience alias used across the crate
pub type Result<T> = std::result::Result<T, ChainError>;
