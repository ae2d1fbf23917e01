// shuffle-core/src/shuffle/rng.rs

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// The random source of a shuffle job.
///
/// One instance drives both phases. Given the same seed and input it yields
/// the same output, byte for byte.
pub type ShuffleRng = ChaCha8Rng;

/// Builds the job's random source.
///
/// Returns the seed actually used, so an unseeded run can be replayed.
pub fn seeded_rng(seed: Option<u64>) -> (ShuffleRng, u64) {
    let seed = seed.unwrap_or_else(rand::random::<u64>);
    (ShuffleRng::seed_from_u64(seed), seed)
}
