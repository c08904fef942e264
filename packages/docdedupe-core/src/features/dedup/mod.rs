//! Duplicate detection
//!
//! The full pipeline: shingling → MinHash signatures → banded LSH
//! candidate retrieval → weighted scoring → union-find clustering,
//! orchestrated by the [`application::Analyzer`].
//!
//! ```text
//! application/     Analyzer (entry point, one run = one reconcile)
//! domain/          shingler, similarity metrics, scoring, union-find
//! infrastructure/  MinHash + LSH index
//! ```

pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::{AnalysisOutcome, Analyzer};
pub use domain::{ScoreWeights, ScoringOptions, ScoringRecord, SimilarityResult, UnionFind};
pub use infrastructure::lsh::{LshIndex, MinHashSignature};
