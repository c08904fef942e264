//! Word-n-gram shingling
//!
//! Converts normalised text into a set of 32-bit FNV-1a hashes, one per
//! contiguous window of `ngram_size` word tokens. Only the hash is kept;
//! the n-gram text is discarded. Duplicate n-grams collapse (set
//! semantics).
//!
//! Documents below `min_words` are rejected: the MinHash error bound is
//! unreliable below a few dozen shingles, so short documents must never
//! reach the signature stage.

use std::collections::HashSet;

pub const DEFAULT_NGRAM_SIZE: usize = 3;
pub const DEFAULT_MIN_WORDS: usize = 20;

const FNV_OFFSET_32: u32 = 0x811c9dc5;
const FNV_PRIME_32: u32 = 16777619;

/// FNV-1a 32-bit over raw bytes.
pub fn fnv1a_32(bytes: &[u8]) -> u32 {
    bytes
        .iter()
        .fold(FNV_OFFSET_32, |hash, &byte| (hash ^ byte as u32).wrapping_mul(FNV_PRIME_32))
}

/// Shingle `text` into word n-gram hashes.
///
/// Returns `None` when the token count is below `min_words`. For a
/// `w`-word text with no duplicate n-grams the set holds `w - n + 1`
/// entries.
pub fn shingles(text: &str, ngram_size: usize, min_words: usize) -> Option<HashSet<u32>> {
    debug_assert!(ngram_size >= 1);
    let tokens: Vec<&str> = text.split_whitespace().collect();
    if tokens.len() < min_words {
        return None;
    }

    let mut set = HashSet::with_capacity(tokens.len().saturating_sub(ngram_size) + 1);
    let mut buf = String::new();
    for window in tokens.windows(ngram_size) {
        buf.clear();
        for (i, token) in window.iter().enumerate() {
            if i > 0 {
                buf.push(' ');
            }
            buf.push_str(token);
        }
        set.insert(fnv1a_32(buf.as_bytes()));
    }
    Some(set)
}
