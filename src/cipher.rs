use aes::Aes256;
use cipher::{generic_array::GenericArray, BlockEncrypt, KeyInit};

use crate::seed::Seed;

const KEY_CONTEXT: &str = "pow-rs 2026-08-24 confusion round key";

/// AES-256 cipher for the confusion rounds, keyed from the per-hash seed.
#[derive(Debug)]
pub(crate) struct SeedCipher {
    aes: Aes256,
}

impl SeedCipher {
    pub(crate) fn new(seed: &Seed) -> Self {
        let key = blake3::derive_key(KEY_CONTEXT, seed);
        Self {
            aes: Aes256::new(&key.into()),
        }
    }

    /// Re-encrypts `block` in place `rounds` times. Single block, no
    /// chaining, no padding.
    pub(crate) fn scramble(&self, block: &mut [u8; 16], rounds: usize) {
        for _ in 0..rounds {
            self.aes
                .encrypt_block(GenericArray::from_mut_slice(block.as_mut_slice()));
        }
    }
}
