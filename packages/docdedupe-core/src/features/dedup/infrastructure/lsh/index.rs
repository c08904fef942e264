//! Banded LSH index over MinHash signatures
//!
//! The signature is partitioned into `bands` bands of `rows_per_band`
//! values; rows beyond `bands * rows_per_band` are unused. Two documents
//! become candidates when any band hashes identically, so for Jaccard
//! similarity `s` the candidate probability is
//! `1 − (1 − s^rows_per_band)^bands`.
//!
//! The defaults `permutations = 192, bands = 20` give 9 rows per band
//! and ~50% collision probability near `s ≈ 0.77`, matching the default
//! similarity threshold of 0.75.
//!
//! Band digest: FNV-1a 32-bit over the pipe-joined decimal rendering of
//! the band's rows. Any deterministic, collision-resistant digest would
//! do; this one is persisted only implicitly through bucket grouping
//! during an index build, so it is documented here rather than stored.

use std::collections::{HashMap, HashSet};

use super::minhash::MinHashSignature;
use crate::features::dedup::domain::shingler::fnv1a_32;

/// Banded LSH index mapping band digests to document-id buckets.
pub struct LshIndex {
    bands: usize,
    rows_per_band: usize,
    buckets: Vec<HashMap<u32, Vec<i64>>>,
}

impl LshIndex {
    pub fn new(bands: usize, rows_per_band: usize) -> Self {
        debug_assert!(bands >= 1 && rows_per_band >= 1);
        Self {
            bands,
            rows_per_band,
            buckets: vec![HashMap::new(); bands],
        }
    }

    /// Derive the banding from a `(permutations, bands)` configuration:
    /// `rows_per_band = permutations / bands`, excess rows unused.
    pub fn for_config(permutations: usize, bands: usize) -> Self {
        let rows_per_band = (permutations / bands).max(1);
        Self::new(bands, rows_per_band)
    }

    pub fn bands(&self) -> usize {
        self.bands
    }

    pub fn rows_per_band(&self) -> usize {
        self.rows_per_band
    }

    /// Insert a document's signature into every band bucket.
    pub fn insert(&mut self, doc_id: i64, signature: &MinHashSignature) {
        debug_assert!(signature.permutations() >= self.bands * self.rows_per_band);
        let bytes = signature.to_bytes();
        for band_idx in 0..self.bands {
            let digest = self.band_digest(&bytes, band_idx);
            self.buckets[band_idx].entry(digest).or_default().push(doc_id);
        }
    }

    /// All documents sharing at least one band bucket with the probe.
    /// Includes the probing document itself if previously inserted.
    pub fn candidates(&self, signature: &MinHashSignature) -> Vec<i64> {
        debug_assert!(signature.permutations() >= self.bands * self.rows_per_band);
        let bytes = signature.to_bytes();
        let mut found = HashSet::new();
        for band_idx in 0..self.bands {
            let digest = self.band_digest(&bytes, band_idx);
            if let Some(bucket) = self.buckets[band_idx].get(&digest) {
                found.extend(bucket.iter().copied());
            }
        }
        let mut out: Vec<i64> = found.into_iter().collect();
        out.sort_unstable();
        out
    }

    /// Reset every bucket.
    pub fn clear(&mut self) {
        for band in &mut self.buckets {
            band.clear();
        }
    }

    fn band_digest(&self, signature_bytes: &[u8], band_idx: usize) -> u32 {
        let start = band_idx * self.rows_per_band * 4;
        let end = start + self.rows_per_band * 4;
        let band = &signature_bytes[start..end];

        let mut text = String::with_capacity(self.rows_per_band * 11);
        for (i, chunk) in band.chunks_exact(4).enumerate() {
            if i > 0 {
                text.push('|');
            }
            let value = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
            text.push_str(&value.to_string());
        }
        fnv1a_32(text.as_bytes())
    }
}
