//! Multi-factor pair scoring
//!
//! Combines the MinHash Jaccard estimate with a fuzzy token-sort ratio
//! and optional metadata/filename signals into one weighted confidence.
//!
//! Quick mode returns the Jaccard estimate alone and is used to prune
//! candidate pairs before the expensive fuzzy stage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::similarity::{date_proximity, size_ratio, token_sort_ratio};
use crate::shared::error::{DedupeError, Result};

/// Non-negative integer weights summing to 100.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreWeights {
    pub jaccard: u32,
    pub fuzzy: u32,
    pub metadata: u32,
    pub filename: u32,
}

impl ScoreWeights {
    pub fn validate(&self) -> Result<()> {
        let total = self.jaccard + self.fuzzy + self.metadata + self.filename;
        if total != 100 {
            return Err(DedupeError::validation(format!(
                "confidence weights must sum to 100, got {total}"
            )));
        }
        Ok(())
    }
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            jaccard: 70,
            fuzzy: 30,
            metadata: 0,
            filename: 0,
        }
    }
}

/// Scoring knobs taken from the dedup configuration.
#[derive(Debug, Clone, Copy)]
pub struct ScoringOptions {
    /// Quick mode: return the Jaccard estimate alone.
    pub quick: bool,
    /// Character cap applied to each normalised text before the fuzzy
    /// comparison.
    pub fuzzy_sample_size: usize,
}

impl Default for ScoringOptions {
    fn default() -> Self {
        Self {
            quick: false,
            fuzzy_sample_size: 2_000,
        }
    }
}

/// The document fields the scorer reads.
#[derive(Debug, Clone)]
pub struct ScoringRecord {
    pub document_id: i64,
    pub title: String,
    pub normalized_text: String,
    pub correspondent: Option<String>,
    pub document_type: Option<String>,
    pub file_size: Option<i64>,
    pub created_at: Option<DateTime<Utc>>,
}

/// Component-wise result of scoring one pair. Every value is in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SimilarityResult {
    pub overall: f64,
    pub jaccard: f64,
    pub fuzzy: f64,
    pub metadata: Option<f64>,
    pub filename: Option<f64>,
}

/// Weighted mean over the components whose weight is positive and whose
/// value is defined. Zero-weight components are reported but do not
/// affect the overall; if nothing qualifies the overall is 0.
pub fn weighted_overall(
    weights: &ScoreWeights,
    jaccard: f64,
    fuzzy: f64,
    metadata: Option<f64>,
    filename: Option<f64>,
) -> f64 {
    let mut sum = 0.0;
    let mut total_weight = 0u32;

    for (weight, value) in [
        (weights.jaccard, Some(jaccard)),
        (weights.fuzzy, Some(fuzzy)),
        (weights.metadata, metadata),
        (weights.filename, filename),
    ] {
        if weight > 0 {
            if let Some(value) = value {
                sum += weight as f64 * value;
                total_weight += weight;
            }
        }
    }

    if total_weight == 0 {
        0.0
    } else {
        sum / total_weight as f64
    }
}

/// Score one candidate pair given its MinHash Jaccard estimate.
pub fn score_pair(
    a: &ScoringRecord,
    b: &ScoringRecord,
    jaccard: f64,
    weights: &ScoreWeights,
    options: &ScoringOptions,
) -> SimilarityResult {
    if options.quick {
        return SimilarityResult {
            overall: jaccard,
            jaccard,
            fuzzy: 0.0,
            metadata: None,
            filename: None,
        };
    }

    let fuzzy = token_sort_ratio(
        prefix_chars(&a.normalized_text, options.fuzzy_sample_size),
        prefix_chars(&b.normalized_text, options.fuzzy_sample_size),
    );
    let metadata = metadata_similarity(a, b);
    let filename = Some(token_sort_ratio(&a.title, &b.title));

    let overall = weighted_overall(weights, jaccard, fuzzy, metadata, filename);

    SimilarityResult {
        overall,
        jaccard,
        fuzzy,
        metadata,
        filename,
    }
}

/// Average of the defined metadata sub-signals: file-size ratio, date
/// proximity, exact correspondent match, exact document-type match.
/// `None` when every input is null.
fn metadata_similarity(a: &ScoringRecord, b: &ScoringRecord) -> Option<f64> {
    let mut components = Vec::with_capacity(4);

    if let (Some(size_a), Some(size_b)) = (a.file_size, b.file_size) {
        components.push(size_ratio(size_a, size_b));
    }
    if let (Some(created_a), Some(created_b)) = (a.created_at, b.created_at) {
        components.push(date_proximity(created_a, created_b));
    }
    if let (Some(corr_a), Some(corr_b)) = (&a.correspondent, &b.correspondent) {
        components.push(if corr_a == corr_b { 1.0 } else { 0.0 });
    }
    if let (Some(type_a), Some(type_b)) = (&a.document_type, &b.document_type) {
        components.push(if type_a == type_b { 1.0 } else { 0.0 });
    }

    if components.is_empty() {
        None
    } else {
        Some(components.iter().sum::<f64>() / components.len() as f64)
    }
}

/// Longest prefix of `text` holding at most `max_chars` characters,
/// without splitting a UTF-8 boundary.
fn prefix_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}
