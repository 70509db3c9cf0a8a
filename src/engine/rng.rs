//! Deterministic random number generation.
//!
//! Implements PCG (Permuted Congruential Generator) with partitioned seeds
//! so that each MCMC chain, and the data simulator, draw from independent
//! reproducible streams.
//!
//! # Reproducibility Guarantee
//!
//! Given the same master seed, all random number sequences are
//! bitwise-identical across runs and platforms.

use rand::prelude::*;
use rand_pcg::Pcg64;

/// Golden-ratio increment used to spread partition seeds.
const STREAM_STRIDE: u64 = 0x9E37_79B9_7F4A_7C15;

/// Deterministic, reproducible random number generator.
#[derive(Debug, Clone)]
pub struct SimRng {
    /// Master seed for reproducibility.
    master_seed: u64,
    /// Current stream index for partitioning.
    stream: u64,
    /// Internal PCG state.
    rng: Pcg64,
}

impl SimRng {
    /// Create a new RNG with the given master seed.
    #[must_use]
    pub fn new(master_seed: u64) -> Self {
        Self {
            master_seed,
            stream: 0,
            rng: Pcg64::seed_from_u64(master_seed),
        }
    }

    /// Get the master seed.
    #[must_use]
    pub const fn master_seed(&self) -> u64 {
        self.master_seed
    }

    /// Get current stream index.
    #[must_use]
    pub const fn stream(&self) -> u64 {
        self.stream
    }

    /// Split off the next independent stream.
    ///
    /// The master's own sequence is untouched; only the stream counter
    /// advances, so forks taken in the same order are always the same.
    #[must_use]
    pub fn fork(&mut self) -> Self {
        self.stream += 1;
        let seed = self
            .master_seed
            .wrapping_add(self.stream.wrapping_mul(STREAM_STRIDE));
        Self {
            master_seed: self.master_seed,
            stream: self.stream,
            rng: Pcg64::seed_from_u64(seed),
        }
    }

    /// Create partitioned RNGs, one per chain.
    ///
    /// Each partition gets an independent stream derived from the master seed,
    /// so chain `k` sees the same draws whatever the number of chains.
    ///
    /// # Example
    ///
    /// ```rust
    /// use occusim::engine::rng::SimRng;
    ///
    /// let mut rng = SimRng::new(42);
    /// let chains = rng.partition(3);
    /// assert_eq!(chains.len(), 3);
    /// ```
    #[must_use]
    pub fn partition(&mut self, n: usize) -> Vec<Self> {
        (0..n).map(|_| self.fork()).collect()
    }

    /// Generate a random f64 in [0, 1).
    pub fn gen_f64(&mut self) -> f64 {
        self.rng.gen()
    }

    /// Generate a random f64 in the given range.
    ///
    /// # Panics
    ///
    /// Panics if `min > max`.
    pub fn gen_range_f64(&mut self, min: f64, max: f64) -> f64 {
        assert!(min <= max, "Invalid range: min > max");
        min + (max - min) * self.gen_f64()
    }

    /// Generate a random u64.
    pub fn gen_u64(&mut self) -> u64 {
        self.rng.gen()
    }

    /// One Bernoulli trial with success probability `p`.
    ///
    /// `p` is not validated here; callers check it with
    /// [`crate::engine::jidoka::check_probability`].
    pub fn gen_bernoulli(&mut self, p: f64) -> bool {
        self.gen_f64() < p
    }

    /// Draw from any `rand` distribution using this stream.
    pub fn sample<T, D: Distribution<T>>(&mut self, dist: &D) -> T {
        dist.sample(&mut self.rng)
    }

    /// Generate n uniform samples on `[min, max)`.
    #[must_use]
    pub fn uniform_n(&mut self, n: usize, min: f64, max: f64) -> Vec<f64> {
        (0..n).map(|_| self.gen_range_f64(min, max)).collect()
    }
}
