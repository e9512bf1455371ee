//! In-memory, tamper-evident ledger of hash-linked blocks with optional proof
//! of work and Ed25519 signatures, plus a thin HTTP surface over it.

pub mod api;
pub mod blockchain;
pub mod config;

pub use blockchain::{Block, Blockchain, BlockchainError};
pub use config::{LedgerConfig, ServerConfig};
