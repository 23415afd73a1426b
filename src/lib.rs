//! Floodchain - a peer-to-peer ledger simulator
//!
//! Independent nodes join a network, gossip transactions, batch them into
//! candidate blocks, run a proof-of-work search and flood mined blocks.
//!
//! # Architecture
//!
//! ## Core Blockchain
//! - [`blockchain`] - Block structure, hash integrity and the append-only ledger
//! - [`transaction`] - Opaque transaction payloads
//! - [`merkle`] - Merkle commitment over a transaction set
//!
//! ## Consensus
//! - [`miner`] - Proof-of-work mining
//!
//! ## Networking
//! - [`registry`] - Identity and address allocation
//! - [`network`] - Tagged wire envelopes and best-effort delivery
//! - [`node`] - Gossip node protocol
//! - [`simulation`] - In-process network driver
//!
//! ## Configuration & Utilities
//! - [`config`] - Configuration management
//! - [`crypto`] - Hashing primitives
//! - [`error`] - Error types

#![forbid(unsafe_code)]

// ============================================================================
// Core Blockchain
// ============================================================================
pub mod blockchain;
pub mod merkle;
pub mod transaction;

// ============================================================================
// Consensus & Mining
// ============================================================================
pub mod miner;

// ============================================================================
// Networking
// ============================================================================
pub mod network;
pub mod node;
pub mod registry;
pub mod simulation;

// ============================================================================
// Configuration & Utilities
// ============================================================================
pub mod config;
pub mod crypto;
pub mod error;

pub use blockchain::{Block, Blockchain};
pub use error::{ChainError, Result};
pub use node::{Node, NodeState};
pub use transaction::Transaction;
