// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Explicit seeding for every stochastic stage
//!
//! There is no process-wide RNG. A [`Seed`] is created once from configuration
//! and handed to the components that draw random numbers; each of them asks for
//! its own ChaCha8 stream, so two stages never consume each other's sequence and
//! tests stay isolated from one another.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Independent random streams, one per stochastic consumer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RngStream {
    /// Stratified train/validation/test partitioning
    Split = 1,
    /// Synthetic corpus generation
    Synthetic = 2,
}

/// Reproducibility seed threaded through the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Seed(u64);

impl Seed {
    pub const DEFAULT: Seed = Seed(42);

    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }

    /// Fresh generator for `stream`, positioned at the start of its sequence
    pub fn rng(&self, stream: RngStream) -> ChaCha8Rng {
        let mut rng = ChaCha8Rng::seed_from_u64(self.0);
        rng.set_stream(stream as u64);
        rng
    }
}

impl Default for Seed {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl From<u64> for Seed {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn test_same_seed_same_sequence() {
        let a: Vec<u32> = Seed::new(7).rng(RngStream::Split).sample_iter(rand::distributions::Standard).take(8).collect();
        let b: Vec<u32> = Seed::new(7).rng(RngStream::Split).sample_iter(rand::distributions::Standard).take(8).collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_streams_are_independent() {
        let mut split = Seed::DEFAULT.rng(RngStream::Split);
        let mut synthetic = Seed::DEFAULT.rng(RngStream::Synthetic);
        let a: u64 = split.gen();
        let b: u64 = synthetic.gen();
        assert_ne!(a, b);
    }

    #[test]
    fn test_default_is_42() {
        assert_eq!(Seed::default().value(), 42);
    }
}
