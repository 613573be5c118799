//! Shared helpers for unit tests.

use rand::prelude::*;

/// Deterministic pseudo-random samples covering the full 16-bit range.
pub(crate) fn random_samples(len: usize, seed: u64) -> Vec<u16> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..len).map(|_| rng.random::<u16>()).collect()
}

/// Deterministic samples in `[0, max]`.
pub(crate) fn random_samples_up_to(len: usize, max: u16, seed: u64) -> Vec<u16> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..len).map(|_| rng.random_range(0..=max)).collect()
}

pub(crate) fn init_logging() {
    common::log_setup::setup_test_logging();
}
