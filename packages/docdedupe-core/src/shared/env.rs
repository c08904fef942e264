//! Process-environment configuration consumed by the core
//!
//! The binary collaborators own dotenv loading and CLI framing; the core
//! only reads the already-populated process environment.

use std::env;
use std::path::PathBuf;

use crate::features::sync::infrastructure::UpstreamAuth;
use crate::shared::error::{DedupeError, Result};

/// Environment options the core consumes.
#[derive(Debug, Clone)]
pub struct AppEnv {
    pub database_path: PathBuf,
    pub upstream_url: String,
    pub upstream_auth: UpstreamAuth,
    pub log_level: Option<String>,
    pub cors_origin: Option<String>,
    pub auto_migrate: bool,
}

impl AppEnv {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Testable constructor over an arbitrary lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let database_path = lookup("DEDUPE_DATABASE_PATH")
            .ok_or_else(|| DedupeError::validation("DEDUPE_DATABASE_PATH is not set"))?;
        let upstream_url = lookup("UPSTREAM_URL")
            .ok_or_else(|| DedupeError::validation("UPSTREAM_URL is not set"))?;

        let token = lookup("UPSTREAM_TOKEN");
        let username = lookup("UPSTREAM_USERNAME");
        let password = lookup("UPSTREAM_PASSWORD");

        let upstream_auth = match (token, username, password) {
            (Some(token), None, None) => UpstreamAuth::Token(token),
            (None, Some(username), Some(password)) => UpstreamAuth::Basic { username, password },
            (Some(_), Some(_), _) | (Some(_), _, Some(_)) => {
                return Err(DedupeError::validation(
                    "set UPSTREAM_TOKEN or UPSTREAM_USERNAME/UPSTREAM_PASSWORD, not both",
                ))
            }
            (None, Some(_), None) | (None, None, Some(_)) => {
                return Err(DedupeError::validation(
                    "UPSTREAM_USERNAME and UPSTREAM_PASSWORD must be set together",
                ))
            }
            (None, None, None) => {
                return Err(DedupeError::validation(
                    "no upstream credentials: set UPSTREAM_TOKEN or UPSTREAM_USERNAME/UPSTREAM_PASSWORD",
                ))
            }
        };

        let auto_migrate = match lookup("AUTO_MIGRATE").as_deref() {
            None => true,
            Some("1") | Some("true") | Some("yes") => true,
            Some("0") | Some("false") | Some("no") => false,
            Some(other) => {
                return Err(DedupeError::validation(format!(
                    "AUTO_MIGRATE must be a boolean, got {other:?}"
                )))
            }
        };

        Ok(Self {
            database_path: PathBuf::from(database_path),
            upstream_url,
            upstream_auth,
            log_level: lookup("LOG_LEVEL"),
            cors_origin: lookup("CORS_ORIGIN"),
            auto_migrate,
        })
    }
}
