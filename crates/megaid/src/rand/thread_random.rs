use ::rand::{Rng, RngCore, rng};

use crate::rand::RandSource;

/// A `RandSource` that uses the thread-local RNG (`rand::rng()`).
///
/// This RNG is fast, cryptographically secure (ChaCha-based), and automatically
/// reseeded from the OS periodically. It is used both for `random_bits` and
/// for generating key material.
///
/// ⚠️ NOTE: The underlying `ThreadRng` is not `Send` or `Sync`. Since this
/// type is a zero-sized wrapper that does not store the RNG, it **is**
/// thread-safe and may be freely used across threads.
#[derive(Default, Clone, Copy, Debug)]
pub struct ThreadRandom;

impl ThreadRandom {
    /// Fills `dest` with random bytes.
    pub fn fill_bytes(&self, dest: &mut [u8]) {
        rng().fill_bytes(dest);
    }
}

impl RandSource<u32> for ThreadRandom {
    fn rand(&self) -> u32 {
        rng().random()
    }
}

impl RandSource<u64> for ThreadRandom {
    fn rand(&self) -> u64 {
        rng().random()
    }
}
