//! Deterministic seed derivation for game runs.
//!
//! Every run of a session gets its own stream, derived from the session's
//! base seed, the game and the attempt counter. Restarting never replays the
//! previous run's random sequence, and the same `(seed, game, attempt)` is
//! always reproducible for replays and tests.

use crate::constants::SEED_TAG_RUN;
use crate::session::GameId;
use hmac::{Hmac, Mac};
use rand::SeedableRng;
use rand::rngs::SmallRng;
use sha2::Sha256;

fn fnv1a64(bytes: &[u8]) -> u64 {
    const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const FNV_PRIME: u64 = 0x0100_0000_01b3;
    let mut hash = FNV_OFFSET;
    for b in bytes {
        hash = (hash ^ u64::from(*b)).wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Derive an independent stream seed from a user seed and a domain tag.
#[must_use]
pub fn derive_stream_seed(user_seed: u64, domain_tag: &[u8]) -> u64 {
    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(&user_seed.to_le_bytes()) else {
        // HMAC accepts any key length; keep a deterministic path regardless.
        return user_seed ^ fnv1a64(domain_tag);
    };
    mac.update(domain_tag);
    let digest = mac.finalize().into_bytes();
    let mut seed_bytes = [0u8; 8];
    seed_bytes.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(seed_bytes)
}

/// Seed for one run of a game session.
#[must_use]
pub fn run_seed(base_seed: u64, game: GameId, attempt: u32) -> u64 {
    let mut tag = Vec::with_capacity(SEED_TAG_RUN.len() + 16);
    tag.extend_from_slice(SEED_TAG_RUN);
    tag.push(b':');
    tag.extend_from_slice(game.as_str().as_bytes());
    tag.push(b':');
    tag.extend_from_slice(&attempt.to_le_bytes());
    derive_stream_seed(base_seed, &tag)
}

/// Fresh RNG stream for a run.
#[must_use]
pub fn run_rng(base_seed: u64, game: GameId, attempt: u32) -> SmallRng {
    SmallRng::seed_from_u64(run_seed(base_seed, game, attempt))
}
