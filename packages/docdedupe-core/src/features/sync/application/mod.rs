//! Sync entry point

pub mod sync_usecase;

pub use sync_usecase::{SyncEngine, SyncOutcome, SyncType};
