use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use log::{debug, info, warn};
use thiserror::Error;

use super::block::{Block, GENESIS_PREV_HASH};
use super::crypto::{self, CryptoError, KeyPair};
use super::pow::{self, CancelToken, MiningError};
use crate::config::LedgerConfig;

/// Errors that can occur during ledger operations
#[derive(Debug, Error)]
pub enum BlockchainError {
    #[error("Mining error: {0}")]
    MiningError(#[from] MiningError),

    #[error("Crypto error: {0}")]
    CryptoError(#[from] CryptoError),

    #[error("Block not found: {0}")]
    BlockNotFound(u64),
}

/// The reason a block fails validation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViolationKind {
    /// Stored hash differs from the recomputed hash
    HashMismatch,

    /// `prev_link_hash` differs from the predecessor's hash
    BrokenLink,

    /// Hash lacks the leading zeros required by the block's difficulty
    InsufficientProof,

    /// Signature missing or not valid for the hash and embedded key
    InvalidSignature,
}

/// First failing block found by a chain scan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainViolation {
    pub index: u64,
    pub kind: ViolationKind,
}

impl fmt::Display for ChainViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self.kind {
            ViolationKind::HashMismatch => "stored hash does not match its contents",
            ViolationKind::BrokenLink => "previous hash does not match the preceding block",
            ViolationKind::InsufficientProof => "hash does not meet its proof of work target",
            ViolationKind::InvalidSignature => "signature is missing or invalid",
        };
        write!(f, "Chain integrity broken at block {}: {}", self.index, reason)
    }
}

/// Blocks and their per-block validity taken under one read lock
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainStatus {
    pub blocks: Vec<Block>,
    pub validity: Vec<bool>,
}

impl ChainStatus {
    pub fn is_valid(&self) -> bool {
        self.validity.iter().all(|valid| *valid)
    }

    pub fn first_invalid_index(&self) -> Option<u64> {
        self.validity
            .iter()
            .position(|valid| !valid)
            .map(|pos| self.blocks[pos].index())
    }
}

/// Represents the ledger
///
/// Cloning yields another handle onto the same chain. Appends and edits are
/// serialised through a writer lock held for the whole build, mine and sign
/// sequence; readers only wait for the final push.
#[derive(Debug, Clone)]
pub struct Blockchain {
    /// The chain of blocks
    chain: Arc<RwLock<Vec<Block>>>,

    /// Held by the single active writer
    writer: Arc<Mutex<()>>,

    /// Ledger signing key
    keys: Arc<KeyPair>,

    config: Arc<LedgerConfig>,

    /// Interrupts the miner of the append in progress
    cancel: CancelToken,
}

impl Default for Blockchain {
    fn default() -> Self {
        Self::new()
    }
}

impl Blockchain {
    /// Creates a new ledger with the default configuration
    pub fn new() -> Self {
        Self::with_config(LedgerConfig::default())
    }

    /// Creates a new ledger with a freshly generated key pair and a genesis
    /// block
    ///
    /// The genesis block is mined to the configured difficulty without the
    /// configured mining caps, and signed when signing is enabled.
    pub fn with_config(config: LedgerConfig) -> Self {
        let keys = KeyPair::generate();

        let mut genesis = Block::new(0, config.genesis_payload.clone(), GENESIS_PREV_HASH);
        pow::mine_unbounded(&mut genesis, config.difficulty);
        if config.signing_enabled {
            keys.sign_block(&mut genesis);
        }

        info!(
            "Created genesis block {} (difficulty {}, signing {})",
            genesis.hash(),
            config.difficulty,
            if config.signing_enabled { "on" } else { "off" }
        );

        Blockchain {
            chain: Arc::new(RwLock::new(vec![genesis])),
            writer: Arc::new(Mutex::new(())),
            keys: Arc::new(keys),
            config: Arc::new(config),
            cancel: CancelToken::new(),
        }
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn difficulty(&self) -> usize {
        self.config.difficulty
    }

    /// Base64 public key of the ledger signer
    pub fn public_key(&self) -> String {
        self.keys.public_key_base64()
    }

    /// Token that interrupts the miner of the append currently running
    ///
    /// The token is cleared when the next append starts.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Appends a block carrying `payload`, mined and signed as configured
    ///
    /// The existing chain is not validated first.
    ///
    /// # Returns
    ///
    /// The mining duration in milliseconds, 0 when mining is disabled
    pub fn append(&self, payload: &str) -> Result<u64, BlockchainError> {
        self.append_block(payload).map(|block| block.mining_duration_ms())
    }

    /// Same as [`Blockchain::append`] but returns the appended block
    pub fn append_block(&self, payload: &str) -> Result<Block, BlockchainError> {
        let signer = self.config.signing_enabled.then(|| self.keys.as_ref());
        self.push_new_block(payload, signer)
    }

    /// Appends a block signed with a caller supplied base64 private key
    /// instead of the ledger key
    pub fn append_with_key(&self, payload: &str, private_key_base64: &str) -> Result<Block, BlockchainError> {
        let keys = KeyPair::from_private_key_base64(private_key_base64)?;
        self.push_new_block(payload, Some(&keys))
    }

    fn push_new_block(&self, payload: &str, signer: Option<&KeyPair>) -> Result<Block, BlockchainError> {
        let _writer = self.lock_writer();
        self.cancel.reset();

        let (index, prev_hash) = {
            let chain = self.read_chain();
            let prev_hash = chain
                .last()
                .map(|block| block.hash().to_string())
                .unwrap_or_else(|| GENESIS_PREV_HASH.to_string());
            (chain.len() as u64, prev_hash)
        };

        let mut block = Block::new(index, payload, prev_hash);

        let limits = self.config.mining_limits().with_cancel(self.cancel.clone());
        let duration_ms = pow::mine(&mut block, self.difficulty(), &limits)?;

        if let Some(keys) = signer {
            keys.sign_block(&mut block);
        }

        self.write_chain().push(block.clone());

        info!(
            "Appended block {} at difficulty {} in {} ms",
            index,
            self.difficulty(),
            duration_ms
        );

        Ok(block)
    }

    /// Overwrites the payload and signature of an existing block and
    /// recomputes its hash, without re-mining or re-signing
    ///
    /// Used to demonstrate that validation catches edited blocks.
    pub fn tamper_block(
        &self,
        index: u64,
        payload: &str,
        signature: Option<String>,
    ) -> Result<Block, BlockchainError> {
        let _writer = self.lock_writer();
        let mut chain = self.write_chain();

        let block = chain
            .iter_mut()
            .find(|block| block.index() == index)
            .ok_or(BlockchainError::BlockNotFound(index))?;

        block.tamper(payload, signature);
        warn!("Block {} was edited out of band, new hash {}", index, block.hash());

        Ok(block.clone())
    }

    /// Validates the chain
    ///
    /// # Returns
    ///
    /// true if every block passes its checks, false otherwise
    pub fn is_valid(&self) -> bool {
        self.first_violation().is_none()
    }

    /// Index of the first block that fails validation, if any
    pub fn first_invalid_index(&self) -> Option<u64> {
        self.first_violation().map(|violation| violation.index)
    }

    /// First failing block and the reason it fails
    pub fn first_violation(&self) -> Option<ChainViolation> {
        let chain = self.read_chain();

        chain.iter().enumerate().find_map(|(i, block)| {
            let previous = i.checked_sub(1).map(|p| &chain[p]);
            self.check_block(block, previous).err().map(|kind| {
                debug!("Block {} failed validation: {:?}", block.index(), kind);
                ChainViolation {
                    index: block.index(),
                    kind,
                }
            })
        })
    }

    /// Per-block validity, in chain order
    pub fn validity_map(&self) -> Vec<bool> {
        self.validity_of(&self.read_chain())
    }

    /// Snapshot of the chain together with its per-block validity
    pub fn status(&self) -> ChainStatus {
        let chain = self.read_chain();

        ChainStatus {
            validity: self.validity_of(&chain),
            blocks: chain.clone(),
        }
    }

    fn validity_of(&self, chain: &[Block]) -> Vec<bool> {
        chain
            .iter()
            .enumerate()
            .map(|(i, block)| {
                let previous = i.checked_sub(1).map(|p| &chain[p]);
                self.check_block(block, previous).is_ok()
            })
            .collect()
    }

    /// Human readable description of the first violation
    pub fn integrity_message(&self) -> Option<String> {
        self.first_violation().map(|violation| violation.to_string())
    }

    fn check_block(&self, block: &Block, previous: Option<&Block>) -> Result<(), ViolationKind> {
        if !block.is_hash_consistent() {
            return Err(ViolationKind::HashMismatch);
        }

        if let Some(previous) = previous {
            if block.prev_link_hash() != previous.hash() {
                return Err(ViolationKind::BrokenLink);
            }
        }

        if !pow::has_valid_proof(block) {
            return Err(ViolationKind::InsufficientProof);
        }

        if self.config.signing_enabled && !crypto::verify_block(block) {
            return Err(ViolationKind::InvalidSignature);
        }

        Ok(())
    }

    /// Looks a block up by index when `query` parses as a non-negative
    /// integer, otherwise by case-insensitive hash
    pub fn find_block(&self, query: &str) -> Option<Block> {
        let query = query.trim();
        let chain = self.read_chain();

        let found = match query.parse::<u64>() {
            Ok(index) => chain.iter().find(|block| block.index() == index),
            Err(_) => chain
                .iter()
                .find(|block| block.hash().eq_ignore_ascii_case(query)),
        };

        found.cloned()
    }

    pub fn get_block(&self, index: u64) -> Option<Block> {
        self.read_chain()
            .iter()
            .find(|block| block.index() == index)
            .cloned()
    }

    /// Gets the last block in the chain
    pub fn last_block(&self) -> Option<Block> {
        self.read_chain().last().cloned()
    }

    /// Snapshot of the entire chain
    pub fn get_chain(&self) -> Vec<Block> {
        self.read_chain().clone()
    }

    pub fn len(&self) -> usize {
        self.read_chain().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read_chain().is_empty()
    }

    // A panic while holding a lock cannot leave the Vec half-updated, so
    // poisoned locks are recovered.
    fn lock_writer(&self) -> MutexGuard<'_, ()> {
        self.writer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn read_chain(&self) -> RwLockReadGuard<'_, Vec<Block>> {
        self.chain.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_chain(&self) -> RwLockWriteGuard<'_, Vec<Block>> {
        self.chain.write().unwrap_or_else(PoisonError::into_inner)
    }
}
