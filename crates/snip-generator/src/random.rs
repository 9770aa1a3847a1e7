use crate::base62;
use crate::Generator;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use snip_core::ShortCode;

enum Source {
    Thread,
    Seeded(Mutex<StdRng>),
}

/// Generates 11-character codes by base-62 encoding a uniformly random `u64`.
pub struct RandomGenerator {
    source: Source,
}

impl RandomGenerator {
    /// Draws from the thread-local random number generator.
    pub fn new() -> Self {
        Self {
            source: Source::Thread,
        }
    }

    /// Draws from a seeded generator, producing a reproducible sequence.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            source: Source::Seeded(Mutex::new(StdRng::seed_from_u64(seed))),
        }
    }

    fn next_u64(&self) -> u64 {
        match &self.source {
            Source::Thread => rand::rng().random(),
            Source::Seeded(rng) => rng.lock().random(),
        }
    }
}

impl Default for RandomGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RandomGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let source = match self.source {
            Source::Thread => "thread",
            Source::Seeded(_) => "seeded",
        };
        f.debug_struct("RandomGenerator")
            .field("source", &source)
            .finish()
    }
}

impl Generator for RandomGenerator {
    type Output = ShortCode;

    fn generate(&self) -> ShortCode {
        ShortCode::new_unchecked(base62::encode(self.next_u64()))
    }
}
