//! # Packet Loss Models for Simulation
//!
//! ## Models:
//! - `ProbabilisticLossModel`: Drops packets with a given probability.
//! - `NoPacketLossModel`: Never drops packets.

use parking_lot::Mutex;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

/// Trait for packet loss models.
pub trait PacketLossModel: Send + Sync {
    /// Determines if a packet should be dropped.
    fn should_drop(&self) -> bool;
}

/// Drops packets with a configurable probability.
#[derive(Debug)]
pub struct ProbabilisticLossModel {
    /// Drop probability, clamped to 0.0..=1.0.
    drop_probability: f64,
    rng: Mutex<SmallRng>,
}

impl ProbabilisticLossModel {
    pub fn new(drop_probability: f64) -> Self {
        Self::with_rng(drop_probability, SmallRng::from_rng(&mut rand::rng()))
    }

    /// Reproducible sequence for tests.
    pub fn with_seed(drop_probability: f64, seed: u64) -> Self {
        Self::with_rng(drop_probability, SmallRng::seed_from_u64(seed))
    }

    fn with_rng(drop_probability: f64, rng: SmallRng) -> Self {
        let drop_probability = if drop_probability.is_nan() {
            0.0
        } else {
            drop_probability.clamp(0.0, 1.0)
        };
        Self {
            drop_probability,
            rng: Mutex::new(rng),
        }
    }
}

impl PacketLossModel for ProbabilisticLossModel {
    #[inline]
    fn should_drop(&self) -> bool {
        self.rng.lock().random_bool(self.drop_probability)
    }
}

/// A no‑packet‑loss model that never drops a packet.
#[derive(Debug)]
pub struct NoPacketLossModel;

impl PacketLossModel for NoPacketLossModel {
    #[inline]
    fn should_drop(&self) -> bool {
        false
    }
}
