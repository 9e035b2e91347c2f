//! Signature scheme
//!
//! A closed set of supported schemes behind one enum, so callers pick a
//! scheme by name and never touch curve types directly. Ed25519 is the only
//! scheme today; adding another means adding a variant here and nothing
//! else changes for callers.
//!
//! Messages are protocol hashes: hex-encoded SHA3-256 digests. The scheme
//! signs the decoded digest bytes, and signatures travel as hex strings.

use crate::error::{Result, ShardboxError};
use crate::hash;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};

/// A hex-encoded keypair
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct KeyPair {
    pub public_key: String,
    pub private_key: String,
}

/// Supported signature schemes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignatureScheme {
    Ed25519,
}

impl Default for SignatureScheme {
    fn default() -> Self {
        SignatureScheme::Ed25519
    }
}

impl SignatureScheme {
    /// Generate a fresh random keypair
    pub fn generate_keys(&self) -> Result<KeyPair> {
        match self {
            SignatureScheme::Ed25519 => {
                let signing = SigningKey::generate(&mut OsRng);
                Ok(keypair_from_signing(&signing))
            }
        }
    }

    /// Deterministically derive a keypair from a mnemonic phrase
    pub fn recover_keys(&self, mnemonic: &str) -> Result<KeyPair> {
        if mnemonic.trim().is_empty() {
            return Err(ShardboxError::SignatureFailed(
                "empty mnemonic".to_string(),
            ));
        }
        match self {
            SignatureScheme::Ed25519 => {
                let digest = hash::hash_str(mnemonic);
                let seed = decode_32(&digest)?;
                let signing = SigningKey::from_bytes(&seed);
                Ok(keypair_from_signing(&signing))
            }
        }
    }

    /// Sign a hex-encoded hash with a hex-encoded private key
    ///
    /// Accepts either a 32-byte seed or the 64-byte seed-plus-public-key
    /// form some wallets store.
    pub fn sign(&self, private_key: &str, hash_hex: &str) -> Result<String> {
        match self {
            SignatureScheme::Ed25519 => {
                let signing = parse_private_key(private_key)?;
                let message = decode_hash(hash_hex)?;
                let sig = signing.sign(&message);
                Ok(hex::encode(sig.to_bytes()))
            }
        }
    }

    /// Verify a hex signature over a hex-encoded hash
    pub fn verify(&self, public_key: &str, signature: &str, hash_hex: &str) -> Result<bool> {
        match self {
            SignatureScheme::Ed25519 => {
                let key_bytes = decode_32(public_key)?;
                let verifying = VerifyingKey::from_bytes(&key_bytes)
                    .map_err(|e| ShardboxError::SignatureFailed(e.to_string()))?;
                let sig_bytes = hex::decode(signature)
                    .map_err(|e| ShardboxError::SignatureFailed(e.to_string()))?;
                let sig = Signature::from_slice(&sig_bytes)
                    .map_err(|e| ShardboxError::SignatureFailed(e.to_string()))?;
                let message = decode_hash(hash_hex)?;
                Ok(verifying.verify(&message, &sig).is_ok())
            }
        }
    }

    /// Combine two partial signatures over the same hash into one
    ///
    /// Split-key wallets need an additive scheme; ed25519 has none, so this
    /// reports the scheme's limitation instead of guessing.
    pub fn add_signature(&self, _sig1: &str, _sig2: &str, _hash_hex: &str) -> Result<String> {
        match self {
            SignatureScheme::Ed25519 => Err(ShardboxError::SignatureFailed(
                "ed25519 does not support signature aggregation".to_string(),
            )),
        }
    }
}

fn keypair_from_signing(signing: &SigningKey) -> KeyPair {
    KeyPair {
        public_key: hex::encode(signing.verifying_key().to_bytes()),
        private_key: hex::encode(signing.to_bytes()),
    }
}

fn parse_private_key(private_key: &str) -> Result<SigningKey> {
    let bytes =
        hex::decode(private_key).map_err(|e| ShardboxError::SignatureFailed(e.to_string()))?;
    let seed: [u8; 32] = match bytes.len() {
        32 => bytes
            .try_into()
            .map_err(|_| ShardboxError::SignatureFailed("bad seed".to_string()))?,
        // seed || public_key form
        64 => bytes[..32]
            .try_into()
            .map_err(|_| ShardboxError::SignatureFailed("bad seed".to_string()))?,
        n => {
            return Err(ShardboxError::SignatureFailed(format!(
                "private key must be 32 or 64 bytes, got {}",
                n
            )))
        }
    };
    Ok(SigningKey::from_bytes(&seed))
}

fn decode_32(hex_str: &str) -> Result<[u8; 32]> {
    let bytes = hex::decode(hex_str).map_err(|e| ShardboxError::SignatureFailed(e.to_string()))?;
    bytes.try_into().map_err(|_| {
        ShardboxError::SignatureFailed("expected a 32-byte hex value".to_string())
    })
}

fn decode_hash(hash_hex: &str) -> Result<Vec<u8>> {
    hex::decode(hash_hex)
        .map_err(|e| ShardboxError::SignatureFailed(format!("hash is not hex: {}", e)))
}
