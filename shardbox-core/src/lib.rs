//! Shardbox Core Library
//!
//! Core primitives for the Shardbox erasure-coded storage client.
//! This crate provides:
//! - Reed-Solomon erasure coding (k data + m parity shards)
//! - Protocol hashing (SHA3-256) and streaming content hashing (SHA-1)
//! - Fixed Merkle trees over shard chunks
//! - The client signature scheme and wallet format
//! - Common error handling

pub mod erasure;
pub mod error;
pub mod hash;
pub mod merkle;
pub mod signature;
pub mod wallet;

pub use erasure::{ErasureConfig, ShardCodec};
pub use error::{Result, ShardboxError};
pub use merkle::MerkleTree;
pub use signature::{KeyPair, SignatureScheme};
pub use wallet::Wallet;

/// Size of one chunk-shard piece on the wire.
///
/// Files are streamed in chunks of `DATA_SHARDS * CHUNK_SIZE` bytes; each
/// storage peer receives and serves its shard in CHUNK_SIZE pieces, and
/// downloads address them by 1-based block number.
pub const CHUNK_SIZE: u64 = 64 * 1024;
