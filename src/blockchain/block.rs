use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use utoipa::ToSchema;

/// Link value carried by the genesis block in place of a predecessor hash
pub const GENESIS_PREV_HASH: &str = "0";

/// Represents a block in the ledger
///
/// Fields are only readable from outside the crate. A block is sealed on
/// construction, may then be mined and signed by the ledger, and after that
/// the only way to change it is [`Block::tamper`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Block {
    /// Position of the block in the chain, genesis is 0
    index: u64,

    /// Caller supplied payload
    payload: String,

    /// Hash of the previous block, or `"0"` for genesis
    prev_link_hash: String,

    /// Creation time, captured once
    #[schema(value_type = String, example = "2023-01-01T12:00:00.000000000Z")]
    timestamp: DateTime<Utc>,

    /// Uppercase hex SHA-256 digest of the hashed fields
    hash: String,

    /// Proof of work counter
    nonce: u64,

    /// Required number of leading `'0'` characters in `hash`
    difficulty: usize,

    /// Wall-clock time spent mining, not hashed
    mining_duration_ms: u64,

    /// Base64 Ed25519 signature over the UTF-8 bytes of `hash`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    signature: Option<String>,

    /// Base64 Ed25519 public key that produced `signature`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    signer_public_key: Option<String>,
}

impl Block {
    /// Creates a new sealed block timestamped now
    ///
    /// # Arguments
    ///
    /// * `index` - The index of the block in the chain
    /// * `payload` - The data carried by the block
    /// * `prev_link_hash` - The hash of the previous block
    pub fn new(index: u64, payload: impl Into<String>, prev_link_hash: impl Into<String>) -> Self {
        Self::with_timestamp(index, payload, prev_link_hash, Utc::now())
    }

    /// Creates a new sealed block with an explicit timestamp
    pub fn with_timestamp(
        index: u64,
        payload: impl Into<String>,
        prev_link_hash: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let mut block = Block {
            index,
            payload: payload.into(),
            prev_link_hash: prev_link_hash.into(),
            timestamp,
            hash: String::new(),
            nonce: 0,
            difficulty: 0,
            mining_duration_ms: 0,
            signature: None,
            signer_public_key: None,
        };

        block.seal();
        block
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }

    pub fn prev_link_hash(&self) -> &str {
        &self.prev_link_hash
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// The stored hash. Never trust it without [`Block::is_hash_consistent`].
    pub fn hash(&self) -> &str {
        &self.hash
    }

    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    pub fn difficulty(&self) -> usize {
        self.difficulty
    }

    pub fn mining_duration_ms(&self) -> u64 {
        self.mining_duration_ms
    }

    pub fn signature(&self) -> Option<&str> {
        self.signature.as_deref()
    }

    pub fn signer_public_key(&self) -> Option<&str> {
        self.signer_public_key.as_deref()
    }

    /// Canonical text of the timestamp as it enters the hash
    pub fn timestamp_string(&self) -> String {
        self.timestamp().to_rfc3339_opts(SecondsFormat::Nanos, true)
    }

    /// Calculates the hash of the block from its current field values
    ///
    /// The hashed fields are rendered as a JSON array in the order
    /// `index, payload, prev_link_hash, timestamp, nonce, difficulty`, which
    /// keeps field boundaries unambiguous whatever the payload contains.
    ///
    /// # Returns
    ///
    /// The SHA-256 digest as a 64 character uppercase hexadecimal string
    pub fn compute_hash(&self) -> String {
        let material = serde_json::json!([
            self.index,
            self.payload,
            self.prev_link_hash,
            self.timestamp_string(),
            self.nonce,
            self.difficulty,
        ]);

        let mut hasher = Sha256::new();
        hasher.update(material.to_string().as_bytes());
        hex::encode_upper(hasher.finalize())
    }

    /// Whether the stored hash matches a fresh recomputation
    pub fn is_hash_consistent(&self) -> bool {
        self.hash == self.compute_hash()
    }

    /// Overwrites the payload and signature, then recomputes the hash
    ///
    /// The block is neither re-mined nor re-signed, so a chain containing a
    /// tampered block fails validation. This is the only public mutation of a
    /// block after it has been built.
    pub fn tamper(&mut self, payload: impl Into<String>, signature: Option<String>) {
        self.payload = payload.into();
        self.signature = signature;
        self.seal();
    }

    /// Replaces the payload without resealing, leaving a stale hash
    #[cfg(test)]
    pub(crate) fn overwrite_payload_unsealed(&mut self, payload: &str) {
        self.payload = payload.to_string();
    }

    pub(crate) fn seal(&mut self) {
        self.hash = self.compute_hash();
    }

    pub(crate) fn set_difficulty(&mut self, difficulty: usize) {
        self.difficulty = difficulty;
    }

    pub(crate) fn bump_nonce(&mut self) {
        self.nonce = self.nonce.wrapping_add(1);
    }

    pub(crate) fn set_mining_duration_ms(&mut self, ms: u64) {
        self.mining_duration_ms = ms;
    }

    pub(crate) fn attach_signature(&mut self, signature: String, public_key: String) {
        self.signature = Some(signature);
        self.signer_public_key = Some(public_key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_new_block() {
        let block = Block::new(1, "hello", "previous_hash");

        assert_eq!(block.index(), 1);
        assert_eq!(block.payload(), "hello");
        assert_eq!(block.prev_link_hash(), "previous_hash");
        assert_eq!(block.nonce(), 0);
        assert_eq!(block.difficulty(), 0);
        assert!(block.signature().is_none());
        assert!(block.is_hash_consistent());
    }

    #[test]
    fn test_timestamp_is_captured_at_construction() {
        let before = Utc::now();
        let block = Block::new(1, "hello", "previous_hash");
        let after = Utc::now();

        assert!(block.timestamp() >= before && block.timestamp() <= after);
        assert!(block.timestamp_string().ends_with('Z'));
    }

    #[test]
    fn test_compute_hash_format() {
        let block = Block::new(1, "hello", "previous_hash");
        let hash = block.compute_hash();

        assert_eq!(hash.len(), 64); // SHA-256 hash is 64 characters in hex
        assert!(hash.chars().all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c)));
    }

    #[test]
    fn test_hash_is_deterministic() {
        let a = Block::with_timestamp(3, "data", "ABC", fixed_time());
        let b = Block::with_timestamp(3, "data", "ABC", fixed_time());

        assert_eq!(a.compute_hash(), a.compute_hash());
        assert_eq!(a.hash(), b.hash());
    }

    #[test]
    fn test_hash_changes_with_payload() {
        let a = Block::with_timestamp(3, "data", "ABC", fixed_time());
        let b = Block::with_timestamp(3, "date", "ABC", fixed_time());

        assert_ne!(a.hash(), b.hash());
    }

    #[test]
    fn test_field_boundaries_are_unambiguous() {
        let a = Block::with_timestamp(1, "ab", "c", fixed_time());
        let b = Block::with_timestamp(1, "a", "bc", fixed_time());

        assert_ne!(a.hash(), b.hash());
    }

    #[test]
    fn test_timestamp_round_trips_through_serde() {
        let block = Block::new(0, "genesis", GENESIS_PREV_HASH);
        let json = serde_json::to_string(&block).unwrap();
        let restored: Block = serde_json::from_str(&json).unwrap();

        assert_eq!(restored, block);
        assert!(restored.is_hash_consistent());
    }

    #[test]
    fn test_tamper_recomputes_hash_only() {
        let mut block = Block::with_timestamp(2, "original", "ABC", fixed_time());
        block.set_difficulty(1);
        block.bump_nonce();
        block.seal();
        let before = block.hash().to_string();

        block.tamper("forged", Some("bogus".to_string()));

        assert_eq!(block.payload(), "forged");
        assert_eq!(block.signature(), Some("bogus"));
        assert_eq!(block.nonce(), 1);
        assert_ne!(block.hash(), before);
        assert!(block.is_hash_consistent());
    }

    #[test]
    fn test_stale_hash_is_detected() {
        let mut block = Block::with_timestamp(2, "original", "ABC", fixed_time());
        block.payload = "changed behind the seal".to_string();

        assert!(!block.is_hash_consistent());
    }
}
