//! Consensus evaluation
//!
//! Operations succeed when enough blobbers agree. The bare quorum is
//! `K·100/N` percent; mutating operations (commit, delete, tree sync)
//! additionally demand a +10% safety margin above it.

/// Extra margin demanded above the bare quorum rate
pub const ADDITIONAL_SUCCESS_RATE: f32 = 10.0;

/// Quorum arithmetic for one allocation's (K, N) layout
#[derive(Debug, Clone, Copy)]
pub struct Consensus {
    threshold: f32,
}

impl Consensus {
    pub fn new(data_shards: usize, total_shards: usize) -> Self {
        Self {
            threshold: data_shards as f32 * 100.0 / total_shards as f32,
        }
    }

    /// Bare quorum rate in percent
    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Rate required by the strict gate
    pub fn required_for_ok(&self) -> f32 {
        self.threshold + ADDITIONAL_SUCCESS_RATE
    }

    /// Success rate for `agreeing` of `active` peers, in percent
    pub fn rate(&self, agreeing: usize, active: usize) -> f32 {
        if active == 0 {
            return 0.0;
        }
        agreeing as f32 * 100.0 / active as f32
    }

    /// Bare quorum reached
    pub fn is_min(&self, rate: f32) -> bool {
        rate >= self.threshold
    }

    /// Quorum with safety margin reached
    pub fn is_ok(&self, rate: f32) -> bool {
        rate >= self.required_for_ok()
    }
}

/// Outcome of a majority vote over per-peer responses
#[derive(Debug, Clone)]
pub struct Majority {
    /// Index of the winning response
    pub winner: usize,
    /// Bit per peer that matches the winner
    pub mask: u64,
    /// Number of agreeing peers
    pub count: usize,
    /// Success rate over all polled peers
    pub rate: f32,
}

/// Select the winning variant among per-peer responses.
///
/// For each response `i`, the vote counts itself plus every later
/// response whose key matches; the first `i` reaching bare quorum wins.
/// The mask covers every peer (before or after `i`) matching the winner,
/// so callers can restrict follow-up reads to agreeing peers.
pub fn find_majority<T, K, F>(responses: &[Option<T>], key: F, consensus: &Consensus) -> Option<Majority>
where
    K: PartialEq,
    F: Fn(&T) -> K,
{
    let active = responses.len();
    for (i, candidate) in responses.iter().enumerate() {
        let Some(candidate) = candidate else { continue };
        let candidate_key = key(candidate);
        let count = 1 + responses[i + 1..]
            .iter()
            .flatten()
            .filter(|r| key(r) == candidate_key)
            .count();
        let rate = consensus.rate(count, active);
        if consensus.is_min(rate) {
            let mut mask = 0u64;
            for (j, resp) in responses.iter().enumerate() {
                if let Some(r) = resp {
                    if key(r) == candidate_key {
                        mask |= 1 << j;
                    }
                }
            }
            return Some(Majority {
                winner: i,
                mask,
                count,
                rate,
            });
        }
    }
    None
}

/// Mask with the low `n` bits set
pub fn full_mask(n: usize) -> u64 {
    if n >= 64 {
        u64::MAX
    } else {
        (1u64 << n) - 1
    }
}
