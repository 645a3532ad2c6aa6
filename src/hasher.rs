//! Proof of Work hash pipeline
//!
//! A digest is produced in three stages: a seeded 64-bit fast hash of the
//! candidate, four AES-256 confusion rounds keyed from the same seed, and
//! a SHA3-256 compression of the result. The confusion rounds amplify
//! bit-level differences beyond what the fast hash alone provides, at
//! lower cost than iterating a full cryptographic hash. Verification
//! compares the digest, as a 256-bit integer, against the target
//! `floor((2^256 - 1) / difficulty)`.

use primitive_types::U256;
use sha3::{Digest, Sha3_256};
use thiserror::Error;
use tokio::sync::OnceCell;
use xxhash_rust::xxh64::xxh64;

use crate::{
    cipher::SeedCipher,
    seed::{OsSeedSource, Seed, SeedSource, SEED_SIZE},
};

/// Length of a digest in hex characters.
pub const DIGEST_LEN: usize = 64;

const BLOCK_SIZE: usize = 16; // size of the aes block
const CONFUSION_ROUNDS: usize = 4;

// xxh64 of empty input under seed 0, the engine known-answer check.
const XXH64_EMPTY: u64 = 0xef46_db37_51d8_e999;

#[derive(Error, Debug)]
pub enum Error {
    #[error("hash engine is not initialized")]
    Uninitialized,
    #[error("hash engine initialization failed: {0}")]
    Initialization(String),
    #[error("difficulty must be positive (got {0})")]
    InvalidDifficulty(u64),
    #[error("digest is not a 256-bit hex string: {0:?}")]
    MalformedDigest(String),
}

/// Multi-stage proof-of-work hasher.
///
/// The fast-hash engine is set up once through [initialize](Self::initialize);
/// [hash](Self::hash) and [verify](Self::verify) are synchronous and safe
/// to call concurrently once the engine is ready.
pub struct PowHasher {
    seeds: Box<dyn SeedSource + Send + Sync>,
    engine: OnceCell<Result<(), String>>,
}

impl Default for PowHasher {
    fn default() -> Self {
        Self::new()
    }
}

impl PowHasher {
    pub fn new() -> Self {
        Self::with_seed_source(Box::new(OsSeedSource))
    }

    pub fn with_seed_source(seeds: Box<dyn SeedSource + Send + Sync>) -> Self {
        Self {
            seeds,
            engine: OnceCell::new(),
        }
    }

    /// One-time engine setup. Concurrent and repeated calls coalesce onto
    /// the same in-flight setup; after completion further calls are no-ops.
    /// A failed setup is terminal: it is reported here and by every
    /// subsequent [hash](Self::hash).
    pub async fn initialize(&self) -> Result<(), Error> {
        let result = self
            .engine
            .get_or_init(|| async {
                match tokio::task::spawn_blocking(engine_self_check).await {
                    Ok(Ok(())) => {
                        log::info!("pow hash engine ready");
                        Ok(())
                    }
                    Ok(Err(err)) => Err(err),
                    Err(err) => Err(format!("engine setup task failed: {err}")),
                }
            })
            .await;
        result.clone().map_err(Error::Initialization)
    }

    /// Digest of `input` under a fresh random seed.
    ///
    /// Every call draws a new seed, so two hashes of the same candidate
    /// differ. A verifier that must recompute the digest needs that seed:
    /// pair [generate_seed](Self::generate_seed) with
    /// [hash_with_seed](Self::hash_with_seed) and transmit the seed
    /// alongside the digest.
    pub fn hash(&self, input: &[u8]) -> Result<String, Error> {
        let seed = self.seeds.next_seed();
        self.hash_with_seed(input, &seed)
    }

    /// Deterministic digest of `input` under a caller-provided seed.
    pub fn hash_with_seed(&self, input: &[u8], seed: &Seed) -> Result<String, Error> {
        self.ensure_ready()?;
        Ok(run_pipeline(input, seed))
    }

    /// Draws a fresh seed from the hasher's secure random source.
    pub fn generate_seed(&self) -> Seed {
        self.seeds.next_seed()
    }

    /// Checks `digest` against the target derived from `difficulty`.
    /// Valid iff the digest, read as a 256-bit big-endian integer, is
    /// strictly below `floor((2^256 - 1) / difficulty)`.
    pub fn verify(&self, digest: &str, difficulty: u64) -> Result<bool, Error> {
        verify_digest(digest, difficulty)
    }

    fn ensure_ready(&self) -> Result<(), Error> {
        match self.engine.get() {
            Some(Ok(())) => Ok(()),
            Some(Err(err)) => Err(Error::Initialization(err.clone())),
            None => Err(Error::Uninitialized),
        }
    }
}

/// Target/digest comparison. Exact 256-bit arithmetic, no floats.
pub fn verify_digest(digest: &str, difficulty: u64) -> Result<bool, Error> {
    if difficulty == 0 {
        return Err(Error::InvalidDifficulty(difficulty));
    }
    let raw = hex::decode(digest).map_err(|_| Error::MalformedDigest(digest.into()))?;
    if raw.len() != DIGEST_LEN / 2 {
        return Err(Error::MalformedDigest(digest.into()));
    }
    let value = U256::from_big_endian(&raw);
    let target = U256::MAX / U256::from(difficulty);
    Ok(value < target)
}

fn run_pipeline(input: &[u8], seed: &Seed) -> String {
    // Stage 1: seeded fast hash of the candidate.
    let mut xxh_seed = [0u8; 8];
    xxh_seed.copy_from_slice(&seed[..8]);
    let fast = xxh64(input, u64::from_le_bytes(xxh_seed));

    // Stage 2: confusion rounds. The 64-bit value sits big-endian in the
    // low half of a single zero-padded aes block.
    let mut block = [0u8; BLOCK_SIZE];
    block[..8].copy_from_slice(&fast.to_be_bytes());
    SeedCipher::new(seed).scramble(&mut block, CONFUSION_ROUNDS);

    // Stage 3: compression to the final 256-bit digest.
    hex::encode(Sha3_256::digest(block))
}

fn engine_self_check() -> Result<(), String> {
    if xxh64(&[], 0) != XXH64_EMPTY {
        return Err("fast hash known-answer check failed".into());
    }
    let seed = [0u8; SEED_SIZE];
    let digest = run_pipeline(b"pow engine self check", &seed);
    if digest.len() != DIGEST_LEN || digest != run_pipeline(b"pow engine self check", &seed) {
        return Err("hash pipeline self check failed".into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::seed::MockSeedSource;
    use proptest::prelude::*;

    fn runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap()
    }

    fn ready_hasher() -> PowHasher {
        let hasher = PowHasher::new();
        runtime().block_on(hasher.initialize()).unwrap();
        hasher
    }

    #[test]
    fn hash_before_initialize_is_rejected() {
        let hasher = PowHasher::new();
        assert!(matches!(hasher.hash(b"candidate"), Err(Error::Uninitialized)));
    }

    #[test]
    fn failed_engine_is_terminal() {
        let hasher = PowHasher {
            seeds: Box::new(OsSeedSource),
            engine: OnceCell::new_with(Some(Err("engine broke".into()))),
        };
        assert!(matches!(
            hasher.hash(b"candidate"),
            Err(Error::Initialization(_))
        ));
        assert!(matches!(
            runtime().block_on(hasher.initialize()),
            Err(Error::Initialization(_))
        ));
    }

    #[tokio::test]
    async fn initialize_is_idempotent() {
        let hasher = PowHasher::new();
        hasher.initialize().await.unwrap();
        hasher.initialize().await.unwrap();
        hasher.hash(b"candidate").unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn concurrent_initialize_coalesces() {
        let hasher = PowHasher::new();
        let results = futures::future::join_all((0..8).map(|_| hasher.initialize())).await;
        assert!(results.into_iter().all(|r| r.is_ok()));
        hasher.hash(b"candidate").unwrap();
    }

    #[test]
    fn random_seed_hash_matches_seeded_variant() {
        let mut seeds = MockSeedSource::new();
        seeds.expect_next_seed().returning(|| [7u8; SEED_SIZE]);

        let hasher = PowHasher::with_seed_source(Box::new(seeds));
        runtime().block_on(hasher.initialize()).unwrap();

        let digest = hasher.hash(b"candidate").unwrap();
        assert_eq!(
            digest,
            hasher.hash_with_seed(b"candidate", &[7u8; SEED_SIZE]).unwrap()
        );
    }

    #[test]
    fn fresh_seeds_give_distinct_digests() {
        let hasher = ready_hasher();
        assert_ne!(
            hasher.hash(b"candidate").unwrap(),
            hasher.hash(b"candidate").unwrap()
        );
    }

    #[test]
    fn verify_rejects_zero_difficulty() {
        let digest = "00".repeat(32);
        assert!(matches!(
            verify_digest(&digest, 0),
            Err(Error::InvalidDifficulty(0))
        ));
    }

    #[test]
    fn verify_rejects_malformed_digests() {
        assert!(matches!(
            verify_digest("zz", 1000),
            Err(Error::MalformedDigest(_))
        ));
        // Valid hex but not 256 bits.
        assert!(matches!(
            verify_digest("abcd", 1000),
            Err(Error::MalformedDigest(_))
        ));
    }

    #[test]
    fn verify_is_strict_at_the_target_boundary() {
        let difficulty = 1000;
        let target = U256::MAX / U256::from(difficulty);

        let at_target = format!("{:064x}", target);
        assert!(!verify_digest(&at_target, difficulty).unwrap());

        let below_target = format!("{:064x}", target - U256::one());
        assert!(verify_digest(&below_target, difficulty).unwrap());
    }

    #[test]
    fn verify_is_monotonic_in_difficulty() {
        let digest = format!("{:064x}", U256::MAX / U256::from(5000u64));
        // Accepted at difficulty 4000, so also at anything lower.
        assert!(verify_digest(&digest, 4000).unwrap());
        for difficulty in [3999, 2000, 100, 1] {
            assert!(verify_digest(&digest, difficulty).unwrap());
        }
        assert!(!verify_digest(&digest, 5000).unwrap());
    }

    #[test]
    fn all_ones_digest_never_verifies() {
        // Value 2^256 - 1 equals the difficulty-1 target, strict < fails.
        let digest = "ff".repeat(32);
        assert!(!verify_digest(&digest, 1).unwrap());
    }

    proptest! {
        #[test]
        fn digest_is_64_lowercase_hex(input: Vec<u8>, seed: [u8; 32]) {
            let digest = run_pipeline(&input, &seed);
            prop_assert_eq!(digest.len(), DIGEST_LEN);
            prop_assert!(digest.chars().all(|c| c.is_ascii_hexdigit() && !c.is_uppercase()));
        }

        #[test]
        fn pipeline_is_deterministic_per_seed(input: Vec<u8>, seed: [u8; 32]) {
            prop_assert_eq!(run_pipeline(&input, &seed), run_pipeline(&input, &seed));
        }

        #[test]
        fn different_seeds_give_different_digests(input: Vec<u8>, a: [u8; 32], b: [u8; 32]) {
            if a != b {
                prop_assert_ne!(run_pipeline(&input, &a), run_pipeline(&input, &b));
            }
        }
    }
}
