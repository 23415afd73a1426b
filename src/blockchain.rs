// Thin re-export module: implementation is in `blockchain/core.rs`, split into
// block/ledger structure and integrity validation.

pub mod core;
pub use core::*;
