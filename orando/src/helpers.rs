use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

/// Deterministic RNG for a numeric seed.
pub fn seeded_rng(seed: usize) -> StdRng {
    let mut rng_seed = [0u8; 32];
    rng_seed[..8].copy_from_slice(&(seed as u64).to_le_bytes());
    StdRng::from_seed(rng_seed)
}

/// Sorts, then shuffles. The result depends only on the contents and the RNG
/// state, never on the order the contents were collected in.
pub fn sorted_shuffle<T: Ord, R: Rng + ?Sized>(mut values: Vec<T>, rng: &mut R) -> Vec<T> {
    values.sort();
    values.shuffle(rng);
    values
}
