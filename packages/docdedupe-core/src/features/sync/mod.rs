//! Upstream synchronisation
//!
//! Pull, fingerprint-diff and persist documents from the upstream store.
//!
//! ```text
//! application/     SyncEngine (page walk, diffing, back-fill)
//! domain/          change-detection fingerprint
//! infrastructure/  UpstreamClient port + reqwest implementation
//! ```

pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::{SyncEngine, SyncOutcome, SyncType};
pub use infrastructure::{HttpUpstreamClient, UpstreamAuth, UpstreamClient};
