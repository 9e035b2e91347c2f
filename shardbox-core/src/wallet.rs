//! Client wallet
//!
//! The wallet file carries the client identity used to sign markers:
//! `client_id` is the SHA3-256 of the primary public key, `client_key` the
//! hex public key itself, and `keys` holds one or more keypairs (the first
//! is the signing key).

use crate::error::{Result, ShardboxError};
use crate::hash;
use crate::signature::{KeyPair, SignatureScheme};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wallet {
    pub client_id: String,
    pub client_key: String,
    pub keys: Vec<KeyPair>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mnemonic: Option<String>,
    pub version: String,
    pub date_created: String,
    #[serde(default)]
    pub scheme: SignatureScheme,
}

pub const WALLET_VERSION: &str = "1.0";

impl Wallet {
    /// Create a wallet with a fresh random keypair
    pub fn create(scheme: SignatureScheme) -> Result<Self> {
        let keys = scheme.generate_keys()?;
        Ok(Self::from_keypair(scheme, keys, None))
    }

    /// Recover a wallet deterministically from a mnemonic phrase
    pub fn recover(scheme: SignatureScheme, mnemonic: &str) -> Result<Self> {
        let keys = scheme.recover_keys(mnemonic)?;
        Ok(Self::from_keypair(scheme, keys, Some(mnemonic.to_string())))
    }

    fn from_keypair(scheme: SignatureScheme, keys: KeyPair, mnemonic: Option<String>) -> Self {
        let client_id = client_id_for_key(&keys.public_key);
        Self {
            client_id,
            client_key: keys.public_key.clone(),
            keys: vec![keys],
            mnemonic,
            version: WALLET_VERSION.to_string(),
            date_created: chrono::Utc::now().to_rfc3339(),
            scheme,
        }
    }

    pub fn from_json(data: &str) -> Result<Self> {
        let wallet: Wallet = serde_json::from_str(data)?;
        if wallet.keys.is_empty() {
            return Err(ShardboxError::Configuration(
                "wallet has no keys".to_string(),
            ));
        }
        Ok(wallet)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// The signing keypair
    pub fn primary_key(&self) -> Result<&KeyPair> {
        self.keys
            .first()
            .ok_or_else(|| ShardboxError::Configuration("wallet has no keys".to_string()))
    }

    /// Sign a hex-encoded hash with the primary key
    pub fn sign(&self, hash_hex: &str) -> Result<String> {
        let key = self.primary_key()?;
        self.scheme.sign(&key.private_key, hash_hex)
    }

    /// Verify a signature against this wallet's public key
    pub fn verify(&self, signature: &str, hash_hex: &str) -> Result<bool> {
        self.scheme.verify(&self.client_key, signature, hash_hex)
    }
}

/// Client id derived from a hex public key
pub fn client_id_for_key(public_key: &str) -> String {
    match hex::decode(public_key) {
        Ok(bytes) => hash::hash_bytes(&bytes),
        Err(_) => hash::hash_str(public_key),
    }
}
