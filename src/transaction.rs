//! Transaction type: an immutable opaque payload.

use crate::crypto::{sha256_hex, HexHash};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Transactions are compared, deduplicated and hashed by payload alone.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Transaction {
    data: String,
}

impl Transaction {
    pub fn new(data: impl Into<String>) -> Self {
        Self { data: data.into() }
    }

    pub fn data(&self) -> &str {
        &self.data
    }

    /// Merkle leaf hash of this transaction.
    pub fn hash(&self) -> HexHash {
        sha256_hex(&self.data)
    }
}

impl From<&str> for Transaction {
    fn from(data: &str) -> Self {
        Transaction::new(data)
    }
}

impl From<String> for Transaction {
    fn from(data: String) -> Self {
        Transaction::new(data)
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.data)
    }
}

/// Builds a batch from payload strings, preserving order.
pub fn batch<I, S>(payloads: I) -> Vec<Transaction>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    payloads.into_iter().map(Transaction::new).collect()
}
