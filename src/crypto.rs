//! Hashing primitives for Floodchain

use sha2::{Digest, Sha256};

/// Lowercase hex SHA-256 digest, the hash representation used everywhere in the chain.
pub type HexHash = String;

/// Length of a [`HexHash`] in characters.
pub const HEX_HASH_LEN: usize = 64;

pub fn sha256_hex(data: impl AsRef<[u8]>) -> HexHash {
    let mut hasher = Sha256::new();
    hasher.update(data.as_ref());
    hex::encode(hasher.finalize())
}

/// Hashes the concatenation of the given parts without building an intermediate string.
pub fn sha256_hex_concat<I, T>(parts: I) -> HexHash
where
    I: IntoIterator<Item = T>,
    T: AsRef<[u8]>,
{
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_ref());
    }
    hex::encode(hasher.finalize())
}
