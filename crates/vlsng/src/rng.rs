//! The process-wide pseudo-random number generator.
//!
//! The `random` procedure and the `noise~` object draw from one shared
//! `ChaCha8Rng`, lazily seeded from the wall clock on first use. Tests and
//! hosts that need reproducible streams call [`seed_random`] up front.

use std::{
    sync::{Mutex, OnceLock, PoisonError},
    time::{SystemTime, UNIX_EPOCH},
};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

static RNG: OnceLock<Mutex<Option<ChaCha8Rng>>> = OnceLock::new();

fn cell() -> &'static Mutex<Option<ChaCha8Rng>> {
    RNG.get_or_init(|| Mutex::new(None))
}

/// Replaces the process generator with one seeded from `seed`.
///
/// Subsequent `random` and `noise~` output is fully determined by the seed.
pub fn seed_random(seed: u64) {
    *cell().lock().unwrap_or_else(PoisonError::into_inner) = Some(ChaCha8Rng::seed_from_u64(seed));
}

fn wall_clock_seed() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| (elapsed.as_secs() << 32) | u64::from(elapsed.subsec_nanos()))
}

pub(crate) fn with_random<T>(body: impl FnOnce(&mut ChaCha8Rng) -> T) -> T {
    let mut guard = cell().lock().unwrap_or_else(PoisonError::into_inner);
    let rng = guard.get_or_insert_with(|| ChaCha8Rng::seed_from_u64(wall_clock_seed()));
    body(rng)
}

/// Uniform draw from `[low, high)`; collapses to `low` for empty ranges.
pub(crate) fn uniform(low: f32, high: f32) -> f32 {
    if high <= low {
        return low;
    }
    with_random(|rng| rng.gen_range(low..high))
}
