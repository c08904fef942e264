//! Shared models and cross-feature plumbing

pub mod env;
pub mod error;

pub use env::AppEnv;
pub use error::{DedupeError, ErrorKind, Result};
