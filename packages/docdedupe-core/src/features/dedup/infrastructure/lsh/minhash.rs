//! MinHash signatures
//!
//! Broder-style MinHash over 32-bit shingle sets. A signature is a
//! fixed-length vector of u32 minima, one per hash-family member
//! `h_i(x) = ((a_i · x + b_i) mod P) mod 2^32` with `P = 2^61 − 1`.
//!
//! The `(a_i, b_i)` coefficients are derived from a compile-time seed,
//! so signatures are comparable across processes and restarts. The
//! coefficient table is the only process-global state in the engine:
//! immutable, lazily initialised, shared freely.
//!
//! Jaccard estimation is the fraction of equal positions; the estimate
//! is unbiased with standard error ≈ `1/sqrt(permutations)`.

use once_cell::sync::Lazy;
use std::collections::HashSet;

use crate::shared::error::{DedupeError, Result};

/// 61-bit Mersenne prime used by the hash family.
const MERSENNE_PRIME_61: u64 = (1 << 61) - 1;

/// Compile-time seed of the hash family. Changing it invalidates every
/// stored signature, so it is part of [`algorithm_version`].
const COEFFICIENT_SEED: u64 = 0x9e37_79b9_7f4a_7c15;

/// Upper bound of the configurable permutation count.
pub const MAX_PERMUTATIONS: usize = 1024;

/// Base algorithm identifier persisted with each signature.
const ALGORITHM_BASE: &str = "minhash/1";

/// Version string persisted with signatures. Encodes the shingling
/// n-gram size so a parameter change forces regeneration.
pub fn algorithm_version(ngram_size: u32) -> String {
    format!("{ALGORITHM_BASE}+shingle/{ngram_size}")
}

fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9e37_79b9_7f4a_7c15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

/// `(a_i, b_i)` pairs for the full [`MAX_PERMUTATIONS`] family, derived
/// deterministically from [`COEFFICIENT_SEED`]. `a_i` is non-zero.
static COEFFICIENTS: Lazy<Vec<(u64, u64)>> = Lazy::new(|| {
    let mut state = COEFFICIENT_SEED;
    (0..MAX_PERMUTATIONS)
        .map(|_| {
            let a = splitmix64(&mut state) % (MERSENNE_PRIME_61 - 1) + 1;
            let b = splitmix64(&mut state) % MERSENNE_PRIME_61;
            (a, b)
        })
        .collect()
});

#[inline]
fn hash_member(a: u64, b: u64, x: u32) -> u32 {
    let product = (a as u128 * x as u128 + b as u128) % MERSENNE_PRIME_61 as u128;
    product as u32
}

/// Fixed-length MinHash signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MinHashSignature {
    values: Vec<u32>,
}

impl MinHashSignature {
    /// Compute a signature of `permutations` values from a shingle set.
    ///
    /// For an empty set the signature is the all-max vector; such
    /// documents must be filtered out upstream by the shingler gate.
    pub fn from_shingles(shingles: &HashSet<u32>, permutations: usize) -> Self {
        debug_assert!(permutations <= MAX_PERMUTATIONS);
        let coefficients = &COEFFICIENTS[..permutations];
        let mut values = vec![u32::MAX; permutations];

        for &shingle in shingles {
            for (slot, &(a, b)) in values.iter_mut().zip(coefficients) {
                let hash = hash_member(a, b, shingle);
                if hash < *slot {
                    *slot = hash;
                }
            }
        }

        Self { values }
    }

    /// Estimated Jaccard similarity: the fraction of equal positions.
    ///
    /// Both signatures must come from the same algorithm version and
    /// permutation count; callers verify that before comparing.
    pub fn jaccard_estimate(&self, other: &Self) -> f64 {
        debug_assert_eq!(self.values.len(), other.values.len());
        if self.values.is_empty() {
            return 0.0;
        }
        let matches = self
            .values
            .iter()
            .zip(&other.values)
            .filter(|(a, b)| a == b)
            .count();
        matches as f64 / self.values.len() as f64
    }

    pub fn permutations(&self) -> usize {
        self.values.len()
    }

    /// Raw little-endian serialisation, `permutations * 4` bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.values.len() * 4);
        for value in &self.values {
            bytes.extend_from_slice(&value.to_le_bytes());
        }
        bytes
    }

    /// Deserialise a stored signature. The buffer length must be exactly
    /// `permutations * 4`.
    pub fn from_bytes(bytes: &[u8], permutations: usize) -> Result<Self> {
        if bytes.len() != permutations * 4 {
            return Err(DedupeError::internal(format!(
                "signature length mismatch: {} bytes for {} permutations",
                bytes.len(),
                permutations
            )));
        }
        let values = bytes
            .chunks_exact(4)
            .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect();
        Ok(Self { values })
    }
}
