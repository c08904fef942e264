//! Dedup infrastructure: candidate retrieval

pub mod lsh;
