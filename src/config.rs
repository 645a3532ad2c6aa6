use std::time::Duration;

use serde::Deserialize;

/// Proof-of-work configuration (network parameter)
#[serde_with::serde_as]
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PowConfig {
    /// Difficulty assigned to blocks before any retarget history exists.
    pub initial_difficulty: u64,
    /// Desired spacing between blocks. Serialized as integer seconds.
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    pub target_block_time: Duration,
    /// Number of window samples used for each retarget decision.
    pub adjustment_interval: usize,
}
