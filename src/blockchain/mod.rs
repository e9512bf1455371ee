// Ledger engine module
//
// This module contains the core ledger implementation including:
// - Block structure and hashing
// - Proof of work miner
// - Ed25519 block signing
// - The hash-linked chain with validation and lookup

pub mod block;
pub mod chain;
pub mod crypto;
pub mod pow;

// Re-export main components for easier access
pub use block::{Block, GENESIS_PREV_HASH};
pub use chain::{Blockchain, BlockchainError, ChainStatus, ChainViolation, ViolationKind};
pub use crypto::{generate_standalone_key_pair, CryptoError, KeyPair};
pub use pow::{CancelToken, MiningError, MiningLimits};
