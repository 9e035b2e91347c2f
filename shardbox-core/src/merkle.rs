//! Fixed Merkle tree over shard chunks
//!
//! Each uploaded shard is hashed one chunk-sized piece at a time; the
//! resulting SHA3-256 leaves are folded pairwise into a root. Storage peers
//! recompute the same root from the bytes they receive, so any shard
//! corruption shows up as a root mismatch at upload time.

use crate::hash::hash_str;

/// Merkle tree with precomputed SHA3-256 hex leaves
#[derive(Debug, Clone, Default)]
pub struct MerkleTree {
    leaves: Vec<String>,
}

impl MerkleTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a leaf for one chunk-sized piece of shard data
    pub fn push_leaf(&mut self, data: &[u8]) {
        self.leaves.push(crate::hash::hash_bytes(data));
    }

    pub fn leaf_count(&self) -> usize {
        self.leaves.len()
    }

    /// Compute the root hash
    ///
    /// Levels are folded pairwise; an odd node is paired with itself.
    /// An empty tree hashes the empty string.
    pub fn root(&self) -> String {
        if self.leaves.is_empty() {
            return hash_str("");
        }
        let mut level = self.leaves.clone();
        while level.len() > 1 {
            let mut next = Vec::with_capacity(level.len().div_ceil(2));
            for pair in level.chunks(2) {
                let right = pair.get(1).unwrap_or(&pair[0]);
                next.push(hash_str(&format!("{}{}", pair[0], right)));
            }
            level = next;
        }
        level.remove(0)
    }
}
