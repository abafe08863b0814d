// Swappable entropy capability, used only for poll jitter
// Seeded PRNG for tests, OS-backed RNG in production

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Source of jitter noise shared by all workers.
pub trait EntropySource: Send {
    /// Uniform sample in [-1.0, 1.0].
    fn jitter(&mut self) -> f64;
}

/// Production source backed by the thread-local OS-seeded RNG.
#[derive(Debug, Default)]
pub struct SystemEntropy;

impl EntropySource for SystemEntropy {
    fn jitter(&mut self) -> f64 {
        rand::thread_rng().gen_range(-1.0..=1.0)
    }
}

/// Deterministic source for tests.
#[derive(Debug)]
pub struct SeededEntropy {
    rng: StdRng,
}

impl SeededEntropy {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl EntropySource for SeededEntropy {
    fn jitter(&mut self) -> f64 {
        self.rng.gen_range(-1.0..=1.0)
    }
}
