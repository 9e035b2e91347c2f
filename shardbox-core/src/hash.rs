//! Hashing primitives
//!
//! Two hash functions cover the whole protocol:
//! - SHA3-256 for everything content-addressed: directory hashes, lookup
//!   hashes, marker hash-data, Merkle leaves
//! - SHA-1 for streaming whole-file and per-shard content hashes
//!
//! All digests travel as lowercase hex strings.

use sha1::{Digest as Sha1Digest, Sha1};
use sha3::Sha3_256;

/// SHA3-256 digest of raw bytes, hex encoded
pub fn hash_bytes(data: &[u8]) -> String {
    let mut hasher = Sha3_256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// SHA3-256 digest of a string, hex encoded
pub fn hash_str(data: &str) -> String {
    hash_bytes(data.as_bytes())
}

/// Incremental SHA-1 hasher for streaming file content
#[derive(Clone, Default)]
pub struct StreamingSha1 {
    inner: Sha1,
}

impl StreamingSha1 {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, data: &[u8]) {
        self.inner.update(data);
    }

    /// Finish and return the hex digest
    pub fn finish(self) -> String {
        hex::encode(self.inner.finalize())
    }
}

/// One-shot SHA-1 digest, hex encoded
pub fn sha1_hex(data: &[u8]) -> String {
    let mut h = StreamingSha1::new();
    h.update(data);
    h.finish()
}
