use base64::{engine::general_purpose::STANDARD, Engine as _};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use log::debug;
use rand::rngs::OsRng;
use thiserror::Error;

use std::fmt;

use super::block::Block;

/// Errors that can occur during cryptographic operations
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Invalid private key: {0}")]
    InvalidPrivateKey(String),

    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    #[error("Decoding error: {0}")]
    DecodingError(#[from] base64::DecodeError),
}

/// Ed25519 key pair used to sign blocks
///
/// The private half never leaves the process. The public half is copied onto
/// every block it signs so each block can be verified on its own.
#[derive(Clone)]
pub struct KeyPair {
    signing_key: SigningKey,
    verifying_key: VerifyingKey,
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public_key", &self.public_key_base64())
            .finish()
    }
}

impl KeyPair {
    /// Creates a new key pair from the OS random number generator
    pub fn generate() -> Self {
        let mut csprng = OsRng;
        let signing_key = SigningKey::generate(&mut csprng);
        let verifying_key = signing_key.verifying_key();

        KeyPair {
            signing_key,
            verifying_key,
        }
    }

    /// Imports a key pair from a base64 encoded 32 byte secret seed
    pub fn from_private_key_base64(encoded: &str) -> Result<Self, CryptoError> {
        let bytes = STANDARD.decode(encoded.trim())?;

        let seed: [u8; 32] = bytes.try_into().map_err(|bytes: Vec<u8>| {
            CryptoError::InvalidPrivateKey(format!("expected 32 bytes, got {}", bytes.len()))
        })?;

        let signing_key = SigningKey::from_bytes(&seed);
        let verifying_key = signing_key.verifying_key();

        Ok(KeyPair {
            signing_key,
            verifying_key,
        })
    }

    /// Base64 encoded 32 byte secret seed
    pub fn private_key_base64(&self) -> String {
        STANDARD.encode(self.signing_key.to_bytes())
    }

    /// Base64 encoded 32 byte public key, the form stored on blocks
    pub fn public_key_base64(&self) -> String {
        STANDARD.encode(self.verifying_key.as_bytes())
    }

    /// Signs the UTF-8 bytes of the block hash and attaches the base64
    /// signature and public key to the block
    pub fn sign_block(&self, block: &mut Block) {
        let signature = self.signing_key.sign(block.hash().as_bytes());
        block.attach_signature(STANDARD.encode(signature.to_bytes()), self.public_key_base64());
    }
}

/// Verifies a block's signature against its embedded public key
///
/// Returns false when the block is unsigned or when the key or signature is
/// malformed; verification never fails with an error.
pub fn verify_block(block: &Block) -> bool {
    let (Some(signature), Some(public_key)) = (block.signature(), block.signer_public_key()) else {
        return false;
    };

    if signature.trim().is_empty() {
        return false;
    }

    match verify_signature(block.hash().as_bytes(), signature, public_key) {
        Ok(valid) => valid,
        Err(err) => {
            debug!("Signature check on block {} failed: {}", block.index(), err);
            false
        }
    }
}

/// Verifies a base64 signature over `message` with a base64 public key
///
/// # Returns
///
/// `Ok(false)` for a well formed signature that does not match, an error
/// when the key or signature cannot be decoded
pub fn verify_signature(message: &[u8], signature: &str, public_key: &str) -> Result<bool, CryptoError> {
    let key_bytes: [u8; 32] = STANDARD
        .decode(public_key)?
        .try_into()
        .map_err(|_| CryptoError::InvalidPublicKey("expected 32 bytes".to_string()))?;
    let verifying_key = VerifyingKey::from_bytes(&key_bytes)
        .map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))?;

    let signature_bytes: [u8; 64] = STANDARD
        .decode(signature)?
        .try_into()
        .map_err(|_| CryptoError::InvalidSignature("expected 64 bytes".to_string()))?;
    let signature = Signature::from_bytes(&signature_bytes);

    Ok(verifying_key.verify(message, &signature).is_ok())
}

/// Generates a key pair unrelated to any ledger and returns its private key
/// in the base64 form accepted by [`KeyPair::from_private_key_base64`]
pub fn generate_standalone_key_pair() -> String {
    KeyPair::generate().private_key_base64()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_and_verify_block() {
        let keys = KeyPair::generate();
        let mut block = Block::new(1, "payload", "previous_hash");

        keys.sign_block(&mut block);

        assert!(block.signature().is_some());
        assert_eq!(block.signer_public_key(), Some(keys.public_key_base64().as_str()));
        assert!(verify_block(&block));
    }

    #[test]
    fn test_unsigned_block_does_not_verify() {
        let block = Block::new(1, "payload", "previous_hash");
        assert!(!verify_block(&block));
    }

    #[test]
    fn test_tampered_hash_does_not_verify() {
        let keys = KeyPair::generate();
        let mut block = Block::new(1, "payload", "previous_hash");
        keys.sign_block(&mut block);
        let signature = block.signature().map(str::to_string);

        // Same signature, but the hash now covers a different payload
        block.tamper("forged", signature);

        assert!(!verify_block(&block));
    }

    #[test]
    fn test_payload_edit_without_rehash_is_caught_by_hash_check() {
        let keys = KeyPair::generate();
        let mut block = Block::new(1, "payload", "previous_hash");
        keys.sign_block(&mut block);

        block.overwrite_payload_unsealed("forged");

        // The signature still covers the stored hash, only recomputation fails
        assert!(verify_block(&block));
        assert!(!block.is_hash_consistent());
    }

    #[test]
    fn test_malformed_signature_does_not_verify() {
        let keys = KeyPair::generate();
        let mut block = Block::new(1, "payload", "previous_hash");
        keys.sign_block(&mut block);

        block.tamper("payload", Some("not base64!!".to_string()));
        assert!(!verify_block(&block));

        block.tamper("payload", Some(STANDARD.encode([1u8; 10])));
        assert!(!verify_block(&block));

        block.tamper("payload", Some("   ".to_string()));
        assert!(!verify_block(&block));
    }

    #[test]
    fn test_signature_from_other_key_does_not_verify() {
        let keys = KeyPair::generate();
        let other = KeyPair::generate();
        let mut block = Block::new(1, "payload", "previous_hash");
        keys.sign_block(&mut block);

        let forged = other.signing_key.sign(block.hash().as_bytes());
        let result = verify_signature(
            block.hash().as_bytes(),
            &STANDARD.encode(forged.to_bytes()),
            &keys.public_key_base64(),
        )
        .unwrap();

        assert!(!result);
    }

    #[test]
    fn test_verify_signature_rejects_malformed_key() {
        let err = verify_signature(b"message", &STANDARD.encode([0u8; 64]), "%%%").unwrap_err();
        assert!(matches!(err, CryptoError::DecodingError(_)));

        let err = verify_signature(b"message", &STANDARD.encode([0u8; 64]), &STANDARD.encode([0u8; 5]))
            .unwrap_err();
        assert!(matches!(err, CryptoError::InvalidPublicKey(_)));
    }

    #[test]
    fn test_private_key_round_trip() {
        let encoded = generate_standalone_key_pair();
        let keys = KeyPair::from_private_key_base64(&encoded).unwrap();

        assert_eq!(keys.private_key_base64(), encoded);
    }

    #[test]
    fn test_malformed_private_key_is_rejected() {
        assert!(matches!(
            KeyPair::from_private_key_base64("not base64!!"),
            Err(CryptoError::DecodingError(_))
        ));
        assert!(matches!(
            KeyPair::from_private_key_base64(&STANDARD.encode([7u8; 16])),
            Err(CryptoError::InvalidPrivateKey(_))
        ));
    }
}
