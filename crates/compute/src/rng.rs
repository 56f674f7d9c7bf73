//! Seeded random sources.
//!
//! Every random draw in a scoring run is derived from one `u64` seed, a
//! domain tag and an index, so any projection or trial can be regenerated
//! independently (and on any worker) with identical results.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

const PROJECTION_DOMAIN: u64 = 0x5052_4f4a; // "PROJ"
const SIGN_DOMAIN: u64 = 0x5349_474e; // "SIGN"

fn derive(seed: u64, domain: u64, index: u64) -> ChaCha8Rng {
    let mut rng = ChaCha8Rng::seed_from_u64(seed ^ domain.rotate_left(32));
    rng.set_stream(index);
    rng
}

/// Generator for the direction of projection `index`.
pub fn projection_rng(seed: u64, index: usize) -> ChaCha8Rng {
    derive(seed, PROJECTION_DOMAIN, index as u64)
}

/// Generator for the sign vectors of sketch pass `pass`.
pub fn sign_rng(seed: u64, pass: usize) -> ChaCha8Rng {
    derive(seed, SIGN_DOMAIN, pass as u64)
}

/// Draw a fresh run seed from the OS-seeded thread generator.
pub fn fresh_seed() -> u64 {
    rand::random()
}
