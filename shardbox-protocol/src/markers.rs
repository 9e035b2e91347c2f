//! Signed markers
//!
//! Every mutation or read against a storage peer is accompanied by a small
//! signed tuple. Each marker serialises its fields into a canonical
//! `":"`-joined hash-data string, hashes it with the repo-wide SHA3-256,
//! and signs that hash with the client wallet. Markers are never mutated
//! after signing.
//!
//! Wire format is JSON with the field names below; signatures are hex.

use serde::{Deserialize, Serialize};
use shardbox_core::error::{Result, ShardboxError};
use shardbox_core::hash::hash_str;
use shardbox_core::signature::SignatureScheme;
use shardbox_core::wallet::Wallet;

/// Current UNIX timestamp in seconds
pub fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Authorizes one block read from one blobber.
///
/// `counter` strictly increases per (client, blobber); a peer rejects any
/// marker whose counter does not exceed the last one it accepted.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ReadMarker {
    pub client_id: String,
    pub client_public_key: String,
    pub blobber_id: String,
    pub allocation_id: String,
    pub owner_id: String,
    pub timestamp: i64,
    pub counter: u64,
    #[serde(default)]
    pub signature: String,
}

impl ReadMarker {
    pub fn hash_data(&self) -> String {
        format!(
            "{}:{}:{}:{}:{}:{}:{}",
            self.allocation_id,
            self.blobber_id,
            self.client_id,
            self.client_public_key,
            self.owner_id,
            self.counter,
            self.timestamp
        )
    }

    pub fn hash(&self) -> String {
        hash_str(&self.hash_data())
    }

    pub fn sign(&mut self, wallet: &Wallet) -> Result<()> {
        self.signature = wallet.sign(&self.hash())?;
        Ok(())
    }

    pub fn verify(&self, scheme: SignatureScheme, public_key: &str) -> Result<bool> {
        scheme.verify(public_key, &self.signature, &self.hash())
    }

    /// Check that `other` belongs to the same client and carries a valid
    /// signature. Used when re-issuing markers across peers.
    pub fn validate_with_other(&self, scheme: SignatureScheme, other: &ReadMarker) -> Result<()> {
        if self.client_public_key != other.client_public_key {
            return Err(ShardboxError::Unauthorized(
                "read markers signed by different clients".to_string(),
            ));
        }
        if !other.verify(scheme, &other.client_public_key)? {
            return Err(ShardboxError::SignatureFailed(
                "read marker signature invalid".to_string(),
            ));
        }
        Ok(())
    }
}

/// Advances one blobber's allocation root from `prev_allocation_root` to
/// `allocation_root` at commit time.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WriteMarker {
    pub prev_allocation_root: String,
    pub allocation_root: String,
    pub allocation_id: String,
    pub blobber_id: String,
    pub client_id: String,
    pub size: i64,
    pub timestamp: i64,
    #[serde(default)]
    pub signature: String,
}

impl WriteMarker {
    pub fn hash_data(&self) -> String {
        format!(
            "{}:{}:{}:{}:{}:{}:{}",
            self.prev_allocation_root,
            self.allocation_root,
            self.allocation_id,
            self.blobber_id,
            self.client_id,
            self.size,
            self.timestamp
        )
    }

    pub fn hash(&self) -> String {
        hash_str(&self.hash_data())
    }

    pub fn sign(&mut self, wallet: &Wallet) -> Result<()> {
        self.signature = wallet.sign(&self.hash())?;
        Ok(())
    }

    pub fn verify(&self, scheme: SignatureScheme, public_key: &str) -> Result<bool> {
        scheme.verify(public_key, &self.signature, &self.hash())
    }
}

/// Authorizes deletion of one file reference on one blobber.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DeleteToken {
    pub file_ref_hash: String,
    pub file_path_hash: String,
    pub allocation_id: String,
    pub blobber_id: String,
    pub client_id: String,
    pub size: i64,
    pub timestamp: i64,
    #[serde(default)]
    pub signature: String,
}

impl DeleteToken {
    pub fn hash_data(&self) -> String {
        format!(
            "{}:{}:{}:{}:{}:{}:{}",
            self.file_ref_hash,
            self.file_path_hash,
            self.allocation_id,
            self.blobber_id,
            self.client_id,
            self.size,
            self.timestamp
        )
    }

    pub fn hash(&self) -> String {
        hash_str(&self.hash_data())
    }

    pub fn sign(&mut self, wallet: &Wallet) -> Result<()> {
        self.signature = wallet.sign(&self.hash())?;
        Ok(())
    }

    pub fn verify(&self, scheme: SignatureScheme, public_key: &str) -> Result<bool> {
        scheme.verify(public_key, &self.signature, &self.hash())
    }
}

/// A time-bounded capability granting a third party read access to a path.
///
/// Travels as base64(JSON); `expiration` and `available_after` are UNIX
/// seconds.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AuthTicket {
    pub allocation_id: String,
    pub client_id: String,
    pub owner_id: String,
    pub file_path_hash: String,
    pub file_name: String,
    pub reference_type: String,
    #[serde(default)]
    pub re_encryption_key: String,
    pub expiration: i64,
    #[serde(default)]
    pub available_after: i64,
    pub timestamp: i64,
    pub actual_file_hash: String,
    #[serde(default)]
    pub encrypted: bool,
    #[serde(default)]
    pub signature: String,
}

impl AuthTicket {
    pub fn hash_data(&self) -> String {
        format!(
            "{}:{}:{}:{}:{}:{}:{}:{}:{}:{}:{}:{}",
            self.allocation_id,
            self.client_id,
            self.owner_id,
            self.file_path_hash,
            self.file_name,
            self.reference_type,
            self.re_encryption_key,
            self.expiration,
            self.available_after,
            self.timestamp,
            self.actual_file_hash,
            self.encrypted
        )
    }

    pub fn hash(&self) -> String {
        hash_str(&self.hash_data())
    }

    pub fn sign(&mut self, wallet: &Wallet) -> Result<()> {
        self.signature = wallet.sign(&self.hash())?;
        Ok(())
    }

    pub fn verify(&self, scheme: SignatureScheme, public_key: &str) -> Result<bool> {
        scheme.verify(public_key, &self.signature, &self.hash())
    }

    /// Whether the ticket grants access at the given time
    pub fn is_active_at(&self, ts: i64) -> bool {
        ts >= self.available_after && (self.expiration == 0 || ts < self.expiration)
    }

    pub fn to_base64(&self) -> Result<String> {
        use base64::Engine;
        let json = serde_json::to_string(self)?;
        Ok(base64::engine::general_purpose::STANDARD.encode(json))
    }

    pub fn from_base64(data: &str) -> Result<Self> {
        use base64::Engine;
        let raw = base64::engine::general_purpose::STANDARD
            .decode(data.trim())
            .map_err(|e| ShardboxError::Serialization(format!("auth ticket: {}", e)))?;
        let json = String::from_utf8(raw)
            .map_err(|e| ShardboxError::Serialization(format!("auth ticket: {}", e)))?;
        Ok(serde_json::from_str(&json)?)
    }
}

/// Declares the tree version a client last observed on a blobber.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct VersionMarker {
    pub allocation_id: String,
    pub client_id: String,
    pub blobber_id: String,
    pub version: i64,
    pub timestamp: i64,
    #[serde(default)]
    pub signature: String,
}

impl VersionMarker {
    pub fn hash_data(&self) -> String {
        format!(
            "{}:{}:{}:{}:{}",
            self.allocation_id, self.client_id, self.blobber_id, self.version, self.timestamp
        )
    }

    pub fn hash(&self) -> String {
        hash_str(&self.hash_data())
    }

    pub fn sign(&mut self, wallet: &Wallet) -> Result<()> {
        self.signature = wallet.sign(&self.hash())?;
        Ok(())
    }

    pub fn verify(&self, scheme: SignatureScheme, public_key: &str) -> Result<bool> {
        scheme.verify(public_key, &self.signature, &self.hash())
    }
}
