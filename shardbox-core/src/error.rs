//! Error types for Shardbox
//!
//! Provides a unified error type for all client operations. Every variant
//! carries a stable machine-readable code (see [`ShardboxError::code`]) so
//! embedders can branch on failures without string matching.

use thiserror::Error;

/// Result type alias for Shardbox operations
pub type Result<T> = std::result::Result<T, ShardboxError>;

/// Unified error type for Shardbox
#[derive(Error, Debug)]
pub enum ShardboxError {
    // ===== Erasure Coding Errors =====
    #[error("Shard split error: {0}")]
    EcSplit(String),

    #[error("Shard reconstruction error: {0}")]
    EcReconstruct(String),

    #[error("Shard verification error: {0}")]
    EcVerify(String),

    #[error("Shard join error: {0}")]
    EcJoin(String),

    // ===== Network / Peer Errors =====
    #[error("Network error: {0}")]
    Network(String),

    #[error("Server rejected request: status {status}: {message}")]
    ServerRejected { status: u16, message: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Consensus not met: rate {rate:.2}%, required {required:.2}%")]
    NoConsensus { rate: f32, required: f32 },

    // ===== Integrity Errors =====
    #[error("Integrity check failed: {0}")]
    Integrity(String),

    // ===== Session State Errors =====
    #[error("Pending commit conflict: {0}")]
    PendingCommitConflict(String),

    #[error("File already exists: {0}")]
    FileExists(String),

    #[error("Operation cancelled")]
    Cancelled,

    // ===== Cryptography Errors =====
    #[error("Signature operation failed: {0}")]
    SignatureFailed(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    // ===== I/O Errors =====
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // ===== Serialization Errors =====
    #[error("Serialization error: {0}")]
    Serialization(String),

    // ===== Configuration Errors =====
    #[error("Configuration error: {0}")]
    Configuration(String),

    // ===== Generic Errors =====
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ShardboxError {
    /// Stable machine-readable code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            ShardboxError::EcSplit(_) => "ec_split_error",
            ShardboxError::EcReconstruct(_) => "ec_reconstruct_error",
            ShardboxError::EcVerify(_) => "ec_verify_error",
            ShardboxError::EcJoin(_) => "ec_join_error",
            ShardboxError::Network(_) => "network_error",
            ShardboxError::ServerRejected { .. } => "server_rejected",
            ShardboxError::NotFound(_) => "not_found",
            ShardboxError::NoConsensus { .. } => "no_consensus",
            ShardboxError::Integrity(_) => "integrity_error",
            ShardboxError::PendingCommitConflict(_) => "pending_commit_conflict",
            ShardboxError::FileExists(_) => "file_exists",
            ShardboxError::Cancelled => "cancelled",
            ShardboxError::SignatureFailed(_) => "signature_failed",
            ShardboxError::Unauthorized(_) => "unauthorized",
            ShardboxError::Io(_) => "io_error",
            ShardboxError::Serialization(_) => "serialization_error",
            ShardboxError::Configuration(_) => "configuration_error",
            ShardboxError::Internal(_) => "internal_error",
        }
    }

    /// Whether a request that failed with this error is worth retrying
    /// against the same peer.
    pub fn is_retryable(&self) -> bool {
        match self {
            ShardboxError::Network(_) => true,
            ShardboxError::ServerRejected { status, .. } => {
                *status == 429 || *status >= 500
            }
            _ => false,
        }
    }
}

impl From<serde_json::Error> for ShardboxError {
    fn from(err: serde_json::Error) -> Self {
        ShardboxError::Serialization(err.to_string())
    }
}
