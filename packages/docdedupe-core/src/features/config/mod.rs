//! Typed dedup configuration
//!
//! The on-disk representation stays a string-keyed `app_config` table
//! (schema-free evolution); reads parse the `dedup.`-prefixed keys into
//! the typed record with field-level validation. Writes validate the
//! merged record first and persist in one transaction, together with
//! the recomputed group confidences whenever the weights changed.

use serde::{Deserialize, Serialize};
use tracing::info;

use docdedupe_storage::SqliteStore;

use crate::features::dedup::domain::scoring::{weighted_overall, ScoreWeights};
use crate::features::dedup::domain::shingler::{DEFAULT_MIN_WORDS, DEFAULT_NGRAM_SIZE};
use crate::shared::error::{DedupeError, Result};

/// Namespace prefix of every dedup key in `app_config`.
pub const CONFIG_PREFIX: &str = "dedup.";

const KEY_NUM_PERMUTATIONS: &str = "dedup.num_permutations";
const KEY_NUM_BANDS: &str = "dedup.num_bands";
const KEY_NGRAM_SIZE: &str = "dedup.ngram_size";
const KEY_MIN_WORDS: &str = "dedup.min_words";
const KEY_SIMILARITY_THRESHOLD: &str = "dedup.similarity_threshold";
const KEY_WEIGHT_JACCARD: &str = "dedup.confidence_weight_jaccard";
const KEY_WEIGHT_FUZZY: &str = "dedup.confidence_weight_fuzzy";
const KEY_WEIGHT_METADATA: &str = "dedup.confidence_weight_metadata";
const KEY_WEIGHT_FILENAME: &str = "dedup.confidence_weight_filename";
const KEY_FUZZY_SAMPLE_SIZE: &str = "dedup.fuzzy_sample_size";
const KEY_MAX_OCR_LENGTH: &str = "dedup.max_ocr_length";
const KEY_AUTO_ANALYZE: &str = "dedup.auto_analyze";

/// Typed dedup configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    pub num_permutations: u32,
    pub num_bands: u32,
    pub ngram_size: u32,
    pub min_words: u32,
    pub similarity_threshold: f64,
    pub confidence_weight_jaccard: u32,
    pub confidence_weight_fuzzy: u32,
    pub confidence_weight_metadata: u32,
    pub confidence_weight_filename: u32,
    pub fuzzy_sample_size: u32,
    pub max_ocr_length: u32,
    pub auto_analyze: bool,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            num_permutations: 192,
            num_bands: 20,
            ngram_size: DEFAULT_NGRAM_SIZE as u32,
            min_words: DEFAULT_MIN_WORDS as u32,
            similarity_threshold: 0.75,
            confidence_weight_jaccard: 70,
            confidence_weight_fuzzy: 30,
            confidence_weight_metadata: 0,
            confidence_weight_filename: 0,
            fuzzy_sample_size: 2_000,
            max_ocr_length: 500_000,
            auto_analyze: false,
        }
    }
}

fn check_range<T: PartialOrd + std::fmt::Display>(
    field: &str,
    value: T,
    min: T,
    max: T,
) -> Result<()> {
    if value < min || value > max {
        return Err(DedupeError::validation(format!(
            "{field} must be in [{min}, {max}], got {value}"
        )));
    }
    Ok(())
}

impl DedupConfig {
    pub fn validate(&self) -> Result<()> {
        check_range("num_permutations", self.num_permutations, 16, 1024)?;
        check_range("num_bands", self.num_bands, 1, 100)?;
        check_range("ngram_size", self.ngram_size, 1, 10)?;
        check_range("min_words", self.min_words, 1, 1000)?;
        check_range("similarity_threshold", self.similarity_threshold, 0.0, 1.0)?;
        check_range("fuzzy_sample_size", self.fuzzy_sample_size, 100, 100_000)?;
        check_range("max_ocr_length", self.max_ocr_length, 1_000, 10_000_000)?;
        for (field, value) in [
            ("confidence_weight_jaccard", self.confidence_weight_jaccard),
            ("confidence_weight_fuzzy", self.confidence_weight_fuzzy),
            ("confidence_weight_metadata", self.confidence_weight_metadata),
            ("confidence_weight_filename", self.confidence_weight_filename),
        ] {
            check_range(field, value, 0, 100)?;
        }
        self.weights().validate()?;
        if self.num_bands > self.num_permutations {
            return Err(DedupeError::validation(format!(
                "num_bands ({}) must not exceed num_permutations ({})",
                self.num_bands, self.num_permutations
            )));
        }
        Ok(())
    }

    pub fn weights(&self) -> ScoreWeights {
        ScoreWeights {
            jaccard: self.confidence_weight_jaccard,
            fuzzy: self.confidence_weight_fuzzy,
            metadata: self.confidence_weight_metadata,
            filename: self.confidence_weight_filename,
        }
    }

    /// Flatten into the persisted `dedup.*` key/value entries.
    pub fn to_entries(&self) -> Vec<(String, String)> {
        vec![
            (KEY_NUM_PERMUTATIONS.into(), self.num_permutations.to_string()),
            (KEY_NUM_BANDS.into(), self.num_bands.to_string()),
            (KEY_NGRAM_SIZE.into(), self.ngram_size.to_string()),
            (KEY_MIN_WORDS.into(), self.min_words.to_string()),
            (
                KEY_SIMILARITY_THRESHOLD.into(),
                self.similarity_threshold.to_string(),
            ),
            (
                KEY_WEIGHT_JACCARD.into(),
                self.confidence_weight_jaccard.to_string(),
            ),
            (
                KEY_WEIGHT_FUZZY.into(),
                self.confidence_weight_fuzzy.to_string(),
            ),
            (
                KEY_WEIGHT_METADATA.into(),
                self.confidence_weight_metadata.to_string(),
            ),
            (
                KEY_WEIGHT_FILENAME.into(),
                self.confidence_weight_filename.to_string(),
            ),
            (
                KEY_FUZZY_SAMPLE_SIZE.into(),
                self.fuzzy_sample_size.to_string(),
            ),
            (KEY_MAX_OCR_LENGTH.into(), self.max_ocr_length.to_string()),
            (KEY_AUTO_ANALYZE.into(), self.auto_analyze.to_string()),
        ]
    }
}

/// Partial update; unset fields keep their current value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupConfigPatch {
    pub num_permutations: Option<u32>,
    pub num_bands: Option<u32>,
    pub ngram_size: Option<u32>,
    pub min_words: Option<u32>,
    pub similarity_threshold: Option<f64>,
    pub confidence_weight_jaccard: Option<u32>,
    pub confidence_weight_fuzzy: Option<u32>,
    pub confidence_weight_metadata: Option<u32>,
    pub confidence_weight_filename: Option<u32>,
    pub fuzzy_sample_size: Option<u32>,
    pub max_ocr_length: Option<u32>,
    pub auto_analyze: Option<bool>,
}

impl DedupConfigPatch {
    pub fn apply_to(&self, base: &DedupConfig) -> DedupConfig {
        DedupConfig {
            num_permutations: self.num_permutations.unwrap_or(base.num_permutations),
            num_bands: self.num_bands.unwrap_or(base.num_bands),
            ngram_size: self.ngram_size.unwrap_or(base.ngram_size),
            min_words: self.min_words.unwrap_or(base.min_words),
            similarity_threshold: self
                .similarity_threshold
                .unwrap_or(base.similarity_threshold),
            confidence_weight_jaccard: self
                .confidence_weight_jaccard
                .unwrap_or(base.confidence_weight_jaccard),
            confidence_weight_fuzzy: self
                .confidence_weight_fuzzy
                .unwrap_or(base.confidence_weight_fuzzy),
            confidence_weight_metadata: self
                .confidence_weight_metadata
                .unwrap_or(base.confidence_weight_metadata),
            confidence_weight_filename: self
                .confidence_weight_filename
                .unwrap_or(base.confidence_weight_filename),
            fuzzy_sample_size: self.fuzzy_sample_size.unwrap_or(base.fuzzy_sample_size),
            max_ocr_length: self.max_ocr_length.unwrap_or(base.max_ocr_length),
            auto_analyze: self.auto_analyze.unwrap_or(base.auto_analyze),
        }
    }
}

fn parse_field<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.parse().map_err(|_| {
        DedupeError::validation(format!("stored config value {key}={raw:?} is malformed"))
    })
}

/// Typed view over the `dedup.*` keys in `app_config`.
#[derive(Clone)]
pub struct ConfigService {
    store: SqliteStore,
}

impl ConfigService {
    pub fn new(store: SqliteStore) -> Self {
        Self { store }
    }

    /// Current configuration: defaults overlaid with every stored key.
    pub fn get(&self) -> Result<DedupConfig> {
        let mut config = DedupConfig::default();
        for (key, value) in self.store.config_all()? {
            match key.as_str() {
                KEY_NUM_PERMUTATIONS => config.num_permutations = parse_field(&key, &value)?,
                KEY_NUM_BANDS => config.num_bands = parse_field(&key, &value)?,
                KEY_NGRAM_SIZE => config.ngram_size = parse_field(&key, &value)?,
                KEY_MIN_WORDS => config.min_words = parse_field(&key, &value)?,
                KEY_SIMILARITY_THRESHOLD => {
                    config.similarity_threshold = parse_field(&key, &value)?
                }
                KEY_WEIGHT_JACCARD => {
                    config.confidence_weight_jaccard = parse_field(&key, &value)?
                }
                KEY_WEIGHT_FUZZY => config.confidence_weight_fuzzy = parse_field(&key, &value)?,
                KEY_WEIGHT_METADATA => {
                    config.confidence_weight_metadata = parse_field(&key, &value)?
                }
                KEY_WEIGHT_FILENAME => {
                    config.confidence_weight_filename = parse_field(&key, &value)?
                }
                KEY_FUZZY_SAMPLE_SIZE => config.fuzzy_sample_size = parse_field(&key, &value)?,
                KEY_MAX_OCR_LENGTH => config.max_ocr_length = parse_field(&key, &value)?,
                KEY_AUTO_ANALYZE => config.auto_analyze = parse_field(&key, &value)?,
                _ => {}
            }
        }
        Ok(config)
    }

    /// Validate and persist a patch. When the weights changed, every
    /// group's confidence is recomputed from its stored component scores
    /// in the same transaction.
    pub fn set(&self, patch: &DedupConfigPatch) -> Result<DedupConfig> {
        let current = self.get()?;
        let merged = patch.apply_to(&current);
        merged.validate()?;

        let entries = merged.to_entries();
        if merged.weights() == current.weights() {
            self.store.upsert_config(&entries)?;
            return Ok(merged);
        }

        let weights = merged.weights();
        let confidences: Vec<(i64, f64)> = self
            .store
            .groups()?
            .iter()
            .map(|group| {
                (
                    group.id,
                    weighted_overall(
                        &weights,
                        group.scores.jaccard,
                        group.scores.fuzzy,
                        group.scores.metadata,
                        group.scores.filename,
                    ),
                )
            })
            .collect();

        self.store.apply_config_update(&entries, &confidences)?;
        info!(groups = confidences.len(), "weights changed, confidences recomputed");
        Ok(merged)
    }
}
