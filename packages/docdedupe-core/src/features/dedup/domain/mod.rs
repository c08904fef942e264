//! Pure dedup domain: shingling, similarity metrics, scoring, clustering

pub mod scoring;
pub mod shingler;
pub mod similarity;
pub mod union_find;

pub use scoring::{score_pair, ScoreWeights, ScoringOptions, ScoringRecord, SimilarityResult};
pub use union_find::UnionFind;
