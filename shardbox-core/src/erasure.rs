//! Reed-Solomon Erasure Coding
//!
//! Implements (k, m) erasure coding where:
//! - k data shards (minimum required to reconstruct)
//! - m parity shards (redundancy)
//! - k + m total shards, one per storage peer
//! - Can tolerate loss of ANY m peers

use crate::error::{Result, ShardboxError};
use bytes::Bytes;
use reed_solomon_erasure::galois_8::ReedSolomon;
use serde::{Deserialize, Serialize};

/// Erasure coding configuration
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ErasureConfig {
    /// Number of data shards (k)
    pub data_shards: usize,
    /// Number of parity shards (m)
    pub parity_shards: usize,
}

impl ErasureConfig {
    /// Create a new erasure config
    pub fn new(data_shards: usize, parity_shards: usize) -> Result<Self> {
        if data_shards == 0 {
            return Err(ShardboxError::Configuration(
                "data_shards must be > 0".to_string(),
            ));
        }
        if parity_shards == 0 {
            return Err(ShardboxError::Configuration(
                "parity_shards must be > 0".to_string(),
            ));
        }
        Ok(Self {
            data_shards,
            parity_shards,
        })
    }

    /// Total number of shards
    pub fn total_shards(&self) -> usize {
        self.data_shards + self.parity_shards
    }

    /// Maximum number of peer failures that can be tolerated
    pub fn max_failures(&self) -> usize {
        self.parity_shards
    }

    /// Shard size for a chunk of the given length, rounded up so all
    /// data fits
    pub fn shard_size(&self, data_len: usize) -> usize {
        data_len.div_ceil(self.data_shards)
    }
}

/// Reed-Solomon encoder/decoder for one allocation's (k, m) layout
pub struct ShardCodec {
    config: ErasureConfig,
    codec: ReedSolomon,
}

impl ShardCodec {
    /// Create a codec for the given configuration
    pub fn new(config: ErasureConfig) -> Result<Self> {
        let codec = ReedSolomon::new(config.data_shards, config.parity_shards)
            .map_err(|e| ShardboxError::Configuration(e.to_string()))?;
        Ok(Self { config, codec })
    }

    /// Get the erasure configuration
    pub fn config(&self) -> &ErasureConfig {
        &self.config
    }

    /// Encode a chunk of data into k + m shards
    ///
    /// Data is zero-padded so each shard is exactly
    /// `ceil(data.len() / k)` bytes.
    pub fn encode(&self, data: &[u8]) -> Result<Vec<Bytes>> {
        if data.is_empty() {
            return Err(ShardboxError::EcSplit("cannot encode empty chunk".to_string()));
        }
        let shard_size = self.config.shard_size(data.len());

        // Pad data to be evenly divisible by data_shards
        let padded_size = shard_size * self.config.data_shards;
        let mut padded_data = data.to_vec();
        padded_data.resize(padded_size, 0);

        // Split into data shards
        let mut shards: Vec<Vec<u8>> =
            padded_data.chunks(shard_size).map(|c| c.to_vec()).collect();

        // Add empty parity shards
        for _ in 0..self.config.parity_shards {
            shards.push(vec![0u8; shard_size]);
        }

        // Encode (fills in parity shards)
        self.codec
            .encode(&mut shards)
            .map_err(|e| ShardboxError::EcSplit(e.to_string()))?;

        Ok(shards.into_iter().map(Bytes::from).collect())
    }

    /// Decode shards back into one chunk of `k * shard_len` bytes
    ///
    /// Shards lost to failed peers are `None`; at least k shards must be
    /// present. The caller trims padding using its own knowledge of the
    /// remaining file size.
    pub fn decode(&self, shards: &[Option<Vec<u8>>], shard_len: usize) -> Result<Bytes> {
        let total_shards = self.config.total_shards();
        if shards.len() != total_shards {
            return Err(ShardboxError::EcReconstruct(format!(
                "expected {} shards, got {}",
                total_shards,
                shards.len()
            )));
        }

        let available = shards.iter().filter(|s| s.is_some()).count();
        if available < self.config.data_shards {
            return Err(ShardboxError::EcReconstruct(format!(
                "insufficient shards: have {}, need {}",
                available, self.config.data_shards
            )));
        }

        for shard in shards.iter().flatten() {
            if shard.len() != shard_len {
                return Err(ShardboxError::EcVerify(format!(
                    "shard length mismatch: expected {}, got {}",
                    shard_len,
                    shard.len()
                )));
            }
        }

        // Reconstruct missing shards in place
        let mut shard_vecs: Vec<Option<Vec<u8>>> = shards.to_vec();
        self.codec
            .reconstruct(&mut shard_vecs)
            .map_err(|e| ShardboxError::EcReconstruct(e.to_string()))?;

        // Concatenate the data shards
        let mut result = Vec::with_capacity(shard_len * self.config.data_shards);
        for shard_opt in shard_vecs.iter().take(self.config.data_shards) {
            match shard_opt {
                Some(shard) => result.extend_from_slice(shard),
                None => {
                    return Err(ShardboxError::EcJoin(
                        "reconstruction left a hole in the data shards".to_string(),
                    ))
                }
            }
        }
        Ok(Bytes::from(result))
    }

    /// Verify that a complete shard set is internally consistent
    pub fn verify(&self, shards: &[Vec<u8>]) -> Result<bool> {
        if shards.len() != self.config.total_shards() {
            return Ok(false);
        }
        let expected_size = shards.first().map(|s| s.len()).unwrap_or(0);
        if !shards.iter().all(|s| s.len() == expected_size) {
            return Ok(false);
        }
        let shard_refs: Vec<&[u8]> = shards.iter().map(|s| s.as_slice()).collect();
        self.codec
            .verify(&shard_refs)
            .map_err(|e| ShardboxError::EcVerify(e.to_string()))
    }
}
