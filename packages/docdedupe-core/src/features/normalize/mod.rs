//! Text normalisation and content hashing
//!
//! Every piece of document text passes through here before shingling or
//! fuzzy comparison, so the rules are deliberately small and total:
//!
//! 1. Lowercase (Unicode simple case mapping)
//! 2. Collapse any whitespace run to a single space
//! 3. Trim
//!
//! The word count is the number of space-separated tokens after step 3
//! (zero for an empty result), and the content hash is the hex SHA-256
//! of the normalised text. Same input, same output, always.

use sha2::{Digest, Sha256};

/// Result of normalising one text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Normalized {
    pub text: String,
    pub word_count: u32,
    pub content_hash: String,
}

/// Normalise `input` and derive its word count and content hash.
pub fn normalize(input: &str) -> Normalized {
    let lowered = input.to_lowercase();
    let tokens: Vec<&str> = lowered.split_whitespace().collect();
    let text = tokens.join(" ");
    let word_count = if text.is_empty() { 0 } else { tokens.len() as u32 };
    let content_hash = hex::encode(Sha256::digest(text.as_bytes()));
    Normalized {
        text,
        word_count,
        content_hash,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_lowercases_and_collapses_whitespace() {
        let n = normalize("  Invoice\t\tMarch\r\n2026  ");
        assert_eq!(n.text, "invoice march 2026");
        assert_eq!(n.word_count, 3);
    }

    #[test]
    fn test_empty_input() {
        let n = normalize("");
        assert_eq!(n.text, "");
        assert_eq!(n.word_count, 0);
        // SHA-256 of the empty string.
        assert_eq!(
            n.content_hash,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_whitespace_only_input() {
        let n = normalize(" \t\n ");
        assert_eq!(n.text, "");
        assert_eq!(n.word_count, 0);
    }

    #[test]
    fn test_deterministic() {
        let a = normalize("Scanned Document #17");
        let b = normalize("Scanned Document #17");
        assert_eq!(a, b);
    }

    #[test]
    fn test_hash_sensitive_to_content() {
        let a = normalize("quarterly report");
        let b = normalize("quarterly reports");
        assert_ne!(a.content_hash, b.content_hash);
    }

    #[test]
    fn test_unicode_lowercasing() {
        let n = normalize("ÜBERWEISUNG Österreich");
        assert_eq!(n.text, "überweisung österreich");
    }

    proptest! {
        #[test]
        fn prop_normalize_idempotent(input in ".{0,200}") {
            let once = normalize(&input);
            let twice = normalize(&once.text);
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn prop_word_count_matches_tokens(input in ".{0,200}") {
            let n = normalize(&input);
            let expected = if n.text.is_empty() {
                0
            } else {
                n.text.split(' ').count() as u32
            };
            prop_assert_eq!(n.word_count, expected);
        }
    }
}
