//! Difficulty retargeting
//!
//! Holds a bounded sliding window of the most recently accepted blocks
//! and derives the difficulty required of the next one. A single retarget
//! step is clamped so transient hash-rate spikes or clock skew cannot
//! swing the difficulty by more than 25% at once, and the window's
//! difficulties are averaged so one outlier block does not dominate.
//!
//! The tracker is not internally synchronized. `add_block` and the
//! queries read and write the same window and must be serialized by the
//! caller, e.g. inside the critical section that already serializes
//! block application.

use std::collections::VecDeque;
use std::time::Duration;

use thiserror::Error;

use crate::config::PowConfig;

/// Bounds on a single retarget step.
const MIN_ADJUSTMENT: f64 = 0.75;
const MAX_ADJUSTMENT: f64 = 1.25;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum Error {
    #[error("no blocks recorded in the difficulty window")]
    EmptyWindow,
}

/// One accepted block as seen by the retargeting window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockSample {
    pub difficulty: u64,
    /// Unix timestamp (seconds) at which the block was accepted.
    pub timestamp: i64,
}

#[derive(Debug, Clone)]
pub struct DifficultyTracker {
    target_block_time: Duration,
    adjustment_interval: usize,
    window: VecDeque<BlockSample>,
}

impl DifficultyTracker {
    pub fn new(target_block_time: Duration, adjustment_interval: usize) -> eyre::Result<Self> {
        eyre::ensure!(
            !target_block_time.is_zero(),
            "target block time must be positive"
        );
        eyre::ensure!(
            adjustment_interval > 1,
            format!("adjustment interval ({adjustment_interval}) must be > 1")
        );
        Ok(Self {
            target_block_time,
            adjustment_interval,
            window: VecDeque::with_capacity(adjustment_interval),
        })
    }

    pub fn from_config(cfg: &PowConfig) -> eyre::Result<Self> {
        Self::new(cfg.target_block_time, cfg.adjustment_interval)
    }

    /// Records an accepted block, evicting the oldest sample once the
    /// window is full. Difficulty and timestamp validity is the caller's
    /// contract; non-monotonic timestamps are not rejected here.
    pub fn add_block(&mut self, difficulty: u64, timestamp: i64) {
        self.window.push_back(BlockSample {
            difficulty,
            timestamp,
        });
        if self.window.len() > self.adjustment_interval {
            self.window.pop_front();
        }
    }

    /// Difficulty required of the next block.
    ///
    /// Until the window is full this returns the most recently added
    /// difficulty unchanged; retargeting only starts with a full window
    /// of history.
    pub fn calculate_next_difficulty(&self) -> Result<u64, Error> {
        let newest = self.window.back().ok_or(Error::EmptyWindow)?;
        if self.window.len() < self.adjustment_interval {
            return Ok(newest.difficulty);
        }
        let oldest = self.window.front().ok_or(Error::EmptyWindow)?;

        let time_span = (newest.timestamp as i128 - oldest.timestamp as i128) as f64;
        let expected_span =
            self.target_block_time.as_secs_f64() * (self.adjustment_interval - 1) as f64;

        let raw = time_span / expected_span;
        let ratio = raw.clamp(MIN_ADJUSTMENT, MAX_ADJUSTMENT);
        if ratio != raw {
            log::warn!("retarget ratio {raw:.3} clamped to {ratio:.2}");
        }

        let next = (self.mean_difficulty() * ratio).round() as u64;
        log::debug!(
            "retarget over {} blocks spanning {time_span}s: next difficulty {next}",
            self.window.len()
        );
        Ok(next)
    }

    /// Arithmetic mean of the window's difficulties.
    pub fn average_difficulty(&self) -> Result<f64, Error> {
        if self.window.is_empty() {
            return Err(Error::EmptyWindow);
        }
        Ok(self.mean_difficulty())
    }

    /// Observed spacing between the window's blocks, in seconds. Falls
    /// back to the target block time while fewer than 2 samples exist.
    pub fn average_block_time(&self) -> f64 {
        let (Some(oldest), Some(newest)) = (self.window.front(), self.window.back()) else {
            return self.target_block_time.as_secs_f64();
        };
        if self.window.len() < 2 {
            return self.target_block_time.as_secs_f64();
        }
        let total = (newest.timestamp as i128 - oldest.timestamp as i128) as f64;
        total / (self.window.len() - 1) as f64
    }

    /// Samples currently in the window, oldest first.
    pub fn samples(&self) -> impl ExactSizeIterator<Item = &BlockSample> {
        self.window.iter()
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    // The window is never empty when called.
    fn mean_difficulty(&self) -> f64 {
        let sum: u128 = self.window.iter().map(|s| s.difficulty as u128).sum();
        sum as f64 / self.window.len() as f64
    }
}
