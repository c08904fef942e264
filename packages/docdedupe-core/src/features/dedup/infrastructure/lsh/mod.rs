//! MinHash signatures and the banded LSH index

pub mod index;
pub mod minhash;

pub use index::LshIndex;
pub use minhash::{algorithm_version, MinHashSignature, MAX_PERMUTATIONS};
