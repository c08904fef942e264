//! Analysis entry point

pub mod analyze_usecase;

pub use analyze_usecase::{AnalysisOutcome, Analyzer};
