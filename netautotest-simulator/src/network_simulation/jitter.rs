//! # Jitter Models for Simulation
//!
//! ## Models:
//! - `RandomJitterModel`: Applies a random jitter from 0 up to a maximum magnitude.
//! - `NoJitterModel`: Applies no jitter.

use parking_lot::Mutex;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;

/// Trait for jitter models.
pub trait JitterModel: Send + Sync {
    /// Applies jitter to the provided duration.
    fn apply_jitter(&self, base_duration: Duration) -> Duration;
}

/// Adds a uniform random delay (in milliseconds).
#[derive(Debug)]
pub struct RandomJitterModel {
    magnitude_ms: u64,
    rng: Mutex<SmallRng>,
}

impl RandomJitterModel {
    /// # Arguments
    /// * `magnitude_ms` - The maximum jitter (in ms) that can be added.
    pub fn new(magnitude_ms: u64) -> Self {
        Self {
            magnitude_ms,
            rng: Mutex::new(SmallRng::from_rng(&mut rand::rng())),
        }
    }

    /// Reproducible sequence for tests.
    pub fn with_seed(magnitude_ms: u64, seed: u64) -> Self {
        Self {
            magnitude_ms,
            rng: Mutex::new(SmallRng::seed_from_u64(seed)),
        }
    }
}

impl JitterModel for RandomJitterModel {
    #[inline]
    fn apply_jitter(&self, base_duration: Duration) -> Duration {
        let added_ms = self.rng.lock().random_range(0..=self.magnitude_ms);
        base_duration + Duration::from_millis(added_ms)
    }
}

/// A no‑jitter model that leaves the duration unchanged.
#[derive(Debug, Clone, Copy)]
pub struct NoJitterModel;

impl JitterModel for NoJitterModel {
    #[inline]
    fn apply_jitter(&self, base_duration: Duration) -> Duration {
        base_duration
    }
}
