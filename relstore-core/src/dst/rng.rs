//! DeterministicRng - Seeded Random Number Generator
//!
//! TigerStyle: ChaCha20-based RNG so a failing simulation replays from its seed.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;

use crate::constants::DST_RANDOM_BYTES_MAX;

/// Golden-ratio increment used to spread fork seeds.
const FORK_SEED_STRIDE: u64 = 0x9E37_79B9_7F4A_7C15;

/// A deterministic random number generator.
///
/// Same seed, same sequence. Forks get independent, reproducible streams so
/// that the fault injector and the workload generator never perturb each other.
#[derive(Debug, Clone)]
pub struct DeterministicRng {
    rng: ChaCha20Rng,
    seed: u64,
    forks: u64,
}

impl DeterministicRng {
    /// Create a new RNG with the given seed.
    ///
    /// # Example
    /// ```
    /// use relstore_core::dst::DeterministicRng;
    /// let mut rng = DeterministicRng::new(42);
    /// assert!(rng.next_float() < 1.0);
    /// ```
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha20Rng::seed_from_u64(seed),
            seed,
            forks: 0,
        }
    }

    /// The seed this generator was created with.
    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Random float in [0, 1).
    pub fn next_float(&mut self) -> f64 {
        let value = self.rng.gen::<f64>();
        debug_assert!((0.0..1.0).contains(&value));
        value
    }

    /// Random u64.
    pub fn next_u64(&mut self) -> u64 {
        self.rng.gen()
    }

    /// Random integer in [min, max] (inclusive).
    ///
    /// # Panics
    /// Panics if min > max.
    pub fn next_int(&mut self, min: i64, max: i64) -> i64 {
        // Precondition
        assert!(min <= max, "min ({min}) must be <= max ({max})");
        self.rng.gen_range(min..=max)
    }

    /// Random index in [0, len).
    ///
    /// # Panics
    /// Panics if len is zero.
    pub fn next_index(&mut self, len: usize) -> usize {
        // Precondition
        assert!(len > 0, "cannot pick an index from an empty range");
        self.rng.gen_range(0..len)
    }

    /// True with the given probability.
    ///
    /// # Panics
    /// Panics if probability is not in [0, 1].
    pub fn next_bool(&mut self, probability: f64) -> bool {
        // Precondition
        assert!(
            (0.0..=1.0).contains(&probability),
            "probability must be in [0, 1], got {probability}"
        );
        self.next_float() < probability
    }

    /// Pick one element of a non-empty slice.
    ///
    /// # Panics
    /// Panics if the slice is empty.
    pub fn pick<'a, T>(&mut self, items: &'a [T]) -> &'a T {
        &items[self.next_index(items.len())]
    }

    /// Random bytes of the given length.
    ///
    /// # Panics
    /// Panics if len exceeds `DST_RANDOM_BYTES_MAX`.
    pub fn next_bytes(&mut self, len: usize) -> Vec<u8> {
        // Precondition
        assert!(
            len <= DST_RANDOM_BYTES_MAX,
            "len must be <= {DST_RANDOM_BYTES_MAX}"
        );
        let mut bytes = vec![0u8; len];
        self.rng.fill(&mut bytes[..]);
        bytes
    }

    /// Derive an independent generator.
    ///
    /// Fork `n` of a given seed always has the same seed, regardless of how
    /// many values the parent produced in between.
    pub fn fork(&mut self) -> Self {
        self.forks += 1;
        let seed = self
            .seed
            .wrapping_add(self.forks.wrapping_mul(FORK_SEED_STRIDE));
        Self::new(seed)
    }
}
