//! Proof-of-work core: a multi-stage hash pipeline producing digests that
//! are checked against a difficulty-derived target, and a sliding-window
//! difficulty retargeting algorithm keeping block production near a target
//! interval. The mining loop and the block-acceptance pipeline live outside
//! this crate and drive it through [PowHasher] and [DifficultyTracker].

mod cipher;
pub mod config;
pub mod difficulty;
pub mod hasher;
pub mod seed;

pub use config::PowConfig;
pub use difficulty::DifficultyTracker;
pub use hasher::PowHasher;
