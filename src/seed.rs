//! Per-hash seed material and its source of randomness.

use mockall::*;
use rand::{rngs::OsRng, RngCore};

pub const SEED_SIZE: usize = 32;

/// Fresh 32-byte seed drawn for every hash invocation. The seed keys the
/// confusion rounds and parameterizes the fast hash; a verifier that
/// recomputes a digest must be handed the same seed.
pub type Seed = [u8; SEED_SIZE];

/// Source of per-hash seeds. Injected into the hasher so tests can pin
/// the seed; production uses [OsSeedSource].
#[automock]
pub trait SeedSource {
    fn next_seed(&self) -> Seed;
}

/// Draws seeds from the operating system CSPRNG. Stateless and safe to
/// share across nonce-search workers.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsSeedSource;

impl SeedSource for OsSeedSource {
    fn next_seed(&self) -> Seed {
        let mut seed = [0u8; SEED_SIZE];
        OsRng.fill_bytes(&mut seed);
        seed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn os_seeds_are_distinct() {
        let source = OsSeedSource;
        assert_ne!(source.next_seed(), source.next_seed());
    }
}
