//! Property tests for the erasure codec
//!
//! Checks the recovery guarantee: any m shards may be lost and the chunk
//! still reconstructs byte for byte.

use proptest::prelude::*;
use shardbox_core::erasure::{ErasureConfig, ShardCodec};

proptest! {
    #[test]
    fn decode_recovers_after_any_single_loss(
        data in proptest::collection::vec(any::<u8>(), 1..4096),
        lost in 0usize..3,
    ) {
        let codec = ShardCodec::new(ErasureConfig::new(2, 1).unwrap()).unwrap();
        let shards = codec.encode(&data).unwrap();
        let shard_len = shards[0].len();

        let mut opts: Vec<Option<Vec<u8>>> =
            shards.iter().map(|s| Some(s.to_vec())).collect();
        opts[lost] = None;

        let decoded = codec.decode(&opts, shard_len).unwrap();
        prop_assert_eq!(&decoded[..data.len()], data.as_slice());
        // Padding beyond the original data is all zero
        prop_assert!(decoded[data.len()..].iter().all(|&b| b == 0));
    }

    #[test]
    fn decode_recovers_wide_layout(
        data in proptest::collection::vec(any::<u8>(), 1..8192),
        seed in any::<u64>(),
    ) {
        let codec = ShardCodec::new(ErasureConfig::new(10, 4).unwrap()).unwrap();
        let shards = codec.encode(&data).unwrap();
        let shard_len = shards[0].len();

        // Knock out 4 distinct shards chosen from the seed
        let mut opts: Vec<Option<Vec<u8>>> =
            shards.iter().map(|s| Some(s.to_vec())).collect();
        let mut s = seed;
        let mut removed = 0;
        while removed < 4 {
            s = s.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            let idx = (s >> 33) as usize % opts.len();
            if opts[idx].is_some() {
                opts[idx] = None;
                removed += 1;
            }
        }

        let decoded = codec.decode(&opts, shard_len).unwrap();
        prop_assert_eq!(&decoded[..data.len()], data.as_slice());
    }

    #[test]
    fn encoded_shards_verify(data in proptest::collection::vec(any::<u8>(), 1..2048)) {
        let codec = ShardCodec::new(ErasureConfig::new(4, 2).unwrap()).unwrap();
        let shards: Vec<Vec<u8>> = codec
            .encode(&data)
            .unwrap()
            .iter()
            .map(|s| s.to_vec())
            .collect();
        prop_assert!(codec.verify(&shards).unwrap());
    }
}
