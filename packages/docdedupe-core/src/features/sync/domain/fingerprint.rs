//! Change-detection fingerprint
//!
//! SHA-256 over the null-byte-separated canonical string
//! `title \0 content \0 modified \0 sorted_tag_ids_csv \0
//! correspondent_id_or_empty \0 document_type_id_or_empty`.
//!
//! The null separator keeps field boundaries unambiguous: moving text
//! between adjacent fields always changes the digest. The fingerprint
//! gates sync upserts only; it plays no part in clustering.

use sha2::{Digest, Sha256};

pub fn fingerprint(
    title: &str,
    content: &str,
    modified: &str,
    tag_ids: &[i64],
    correspondent_id: Option<i64>,
    document_type_id: Option<i64>,
) -> String {
    let mut sorted_tags: Vec<i64> = tag_ids.to_vec();
    sorted_tags.sort_unstable();
    let tags_csv = sorted_tags
        .iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(",");

    let mut hasher = Sha256::new();
    hasher.update(title.as_bytes());
    hasher.update([0u8]);
    hasher.update(content.as_bytes());
    hasher.update([0u8]);
    hasher.update(modified.as_bytes());
    hasher.update([0u8]);
    hasher.update(tags_csv.as_bytes());
    hasher.update([0u8]);
    if let Some(id) = correspondent_id {
        hasher.update(id.to_string().as_bytes());
    }
    hasher.update([0u8]);
    if let Some(id) = document_type_id {
        hasher.update(id.to_string().as_bytes());
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> String {
        fingerprint("Invoice", "body text", "2026-03-01T10:00:00Z", &[2, 1], Some(7), Some(3))
    }

    #[test]
    fn test_deterministic() {
        assert_eq!(base(), base());
    }

    #[test]
    fn test_tag_order_irrelevant() {
        let a = fingerprint("t", "c", "m", &[3, 1, 2], None, None);
        let b = fingerprint("t", "c", "m", &[1, 2, 3], None, None);
        assert_eq!(a, b);
    }

    #[test]
    fn test_sensitive_to_every_field() {
        let variants = [
            fingerprint("Invoice2", "body text", "2026-03-01T10:00:00Z", &[2, 1], Some(7), Some(3)),
            fingerprint("Invoice", "body text!", "2026-03-01T10:00:00Z", &[2, 1], Some(7), Some(3)),
            fingerprint("Invoice", "body text", "2026-03-02T10:00:00Z", &[2, 1], Some(7), Some(3)),
            fingerprint("Invoice", "body text", "2026-03-01T10:00:00Z", &[2], Some(7), Some(3)),
            fingerprint("Invoice", "body text", "2026-03-01T10:00:00Z", &[2, 1], Some(8), Some(3)),
            fingerprint("Invoice", "body text", "2026-03-01T10:00:00Z", &[2, 1], Some(7), Some(4)),
            fingerprint("Invoice", "body text", "2026-03-01T10:00:00Z", &[2, 1], None, Some(3)),
        ];
        let reference = base();
        for variant in &variants {
            assert_ne!(variant, &reference);
        }
    }

    #[test]
    fn test_field_boundaries_unambiguous() {
        // tags "1,2" with empty correspondent vs tags "1" with
        // correspondent "2" must differ.
        let a = fingerprint("t", "c", "m", &[1, 2], None, None);
        let b = fingerprint("t", "c", "m", &[1], Some(2), None);
        assert_ne!(a, b);

        // Title/content boundary.
        let c = fingerprint("ab", "c", "m", &[], None, None);
        let d = fingerprint("a", "bc", "m", &[], None, None);
        assert_ne!(c, d);
    }
}
