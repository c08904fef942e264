//! Upstream document-store client
//!
//! The pull contract: paginated document listings ordered by descending
//! `modified` (`next`-URL pagination), per-document metadata for file
//! sizes, and the tag/correspondent/document-type reference listings.
//!
//! Retry policy: GETs are idempotent; 429 and 5xx responses and network
//! failures retry with exponential backoff until the attempt budget is
//! spent, then surface as `UpstreamTransient`. Any other 4xx is
//! terminal (`UpstreamPermanent`) and aborts the sync.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use crate::shared::error::{DedupeError, Result};

/// Authentication against the upstream store.
#[derive(Debug, Clone)]
pub enum UpstreamAuth {
    Token(String),
    Basic { username: String, password: String },
}

/// One page of the document listing.
#[derive(Debug, Clone, Deserialize)]
pub struct DocumentPage {
    #[serde(default)]
    pub count: Option<i64>,
    #[serde(default)]
    pub next: Option<String>,
    pub results: Vec<UpstreamDocument>,
}

/// A document as the upstream reports it.
#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamDocument {
    pub id: i64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub tags: Vec<i64>,
    #[serde(default)]
    pub correspondent: Option<i64>,
    #[serde(default)]
    pub document_type: Option<i64>,
    #[serde(default)]
    pub created: Option<String>,
    #[serde(default)]
    pub added: Option<String>,
    pub modified: String,
}

/// Per-document metadata; only the file sizes matter to the core.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct UpstreamDocumentMeta {
    #[serde(default)]
    pub original_size: Option<i64>,
    #[serde(default)]
    pub archive_size: Option<i64>,
}

/// A reference entity (tag, correspondent, document type).
#[derive(Debug, Clone, Deserialize)]
pub struct NameRef {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
struct NameRefPage {
    #[serde(default)]
    next: Option<String>,
    results: Vec<NameRef>,
}

/// Pull contract of the upstream store.
#[async_trait]
pub trait UpstreamClient: Send + Sync {
    /// First page of documents, ordered by `-modified`.
    async fn documents_first_page(&self) -> Result<DocumentPage>;

    /// Follow a `next` URL from a previous page.
    async fn documents_page(&self, next_url: &str) -> Result<DocumentPage>;

    async fn document_metadata(&self, id: i64) -> Result<UpstreamDocumentMeta>;

    async fn tags(&self) -> Result<Vec<NameRef>>;
    async fn correspondents(&self) -> Result<Vec<NameRef>>;
    async fn document_types(&self) -> Result<Vec<NameRef>>;
}

const MAX_ATTEMPTS: u32 = 5;
const BACKOFF_BASE: Duration = Duration::from_millis(500);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const PAGE_SIZE: u32 = 100;

/// reqwest-backed [`UpstreamClient`].
pub struct HttpUpstreamClient {
    http: reqwest::Client,
    base_url: String,
    auth: UpstreamAuth,
}

impl HttpUpstreamClient {
    pub fn new(base_url: impl Into<String>, auth: UpstreamAuth) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|err| {
                DedupeError::upstream_permanent("failed to build HTTP client").with_source(err)
            })?;
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Ok(Self {
            http,
            base_url,
            auth,
        })
    }

    fn request(&self, url: &str) -> reqwest::RequestBuilder {
        let builder = self.http.get(url);
        match &self.auth {
            UpstreamAuth::Token(token) => builder.header("Authorization", format!("Token {token}")),
            UpstreamAuth::Basic { username, password } => {
                builder.basic_auth(username, Some(password))
            }
        }
    }

    /// GET with retry on 429/5xx/network errors; other 4xx is terminal.
    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T> {
        let mut backoff = BACKOFF_BASE;
        let mut last_transient = String::new();

        for attempt in 1..=MAX_ATTEMPTS {
            match self.request(url).send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return response.json::<T>().await.map_err(|err| {
                            DedupeError::upstream_permanent(format!(
                                "malformed response from {url}"
                            ))
                            .with_source(err)
                        });
                    }
                    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                        last_transient = format!("{url}: HTTP {status}");
                        debug!(%url, %status, attempt, "transient upstream status");
                    } else {
                        return Err(DedupeError::upstream_permanent(format!(
                            "{url}: HTTP {status}"
                        )));
                    }
                }
                Err(err) => {
                    last_transient = format!("{url}: {err}");
                    debug!(%url, %err, attempt, "upstream request failed");
                }
            }

            if attempt < MAX_ATTEMPTS {
                tokio::time::sleep(backoff).await;
                backoff *= 2;
            }
        }

        warn!(%url, attempts = MAX_ATTEMPTS, "upstream retry budget exhausted");
        Err(DedupeError::upstream_transient(last_transient))
    }

    async fn all_name_refs(&self, first_url: String) -> Result<Vec<NameRef>> {
        let mut out = Vec::new();
        let mut url = Some(first_url);
        while let Some(current) = url {
            let page: NameRefPage = self.get_json(&current).await?;
            out.extend(page.results);
            url = page.next;
        }
        Ok(out)
    }
}

#[async_trait]
impl UpstreamClient for HttpUpstreamClient {
    async fn documents_first_page(&self) -> Result<DocumentPage> {
        let url = format!(
            "{}/api/documents/?ordering=-modified&page_size={PAGE_SIZE}",
            self.base_url
        );
        self.get_json(&url).await
    }

    async fn documents_page(&self, next_url: &str) -> Result<DocumentPage> {
        self.get_json(next_url).await
    }

    async fn document_metadata(&self, id: i64) -> Result<UpstreamDocumentMeta> {
        let url = format!("{}/api/documents/{id}/metadata/", self.base_url);
        self.get_json(&url).await
    }

    async fn tags(&self) -> Result<Vec<NameRef>> {
        self.all_name_refs(format!("{}/api/tags/?page_size={PAGE_SIZE}", self.base_url))
            .await
    }

    async fn correspondents(&self) -> Result<Vec<NameRef>> {
        self.all_name_refs(format!(
            "{}/api/correspondents/?page_size={PAGE_SIZE}",
            self.base_url
        ))
        .await
    }

    async fn document_types(&self) -> Result<Vec<NameRef>> {
        self.all_name_refs(format!(
            "{}/api/document_types/?page_size={PAGE_SIZE}",
            self.base_url
        ))
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash_stripped() {
        let client =
            HttpUpstreamClient::new("http://paperless:8000///", UpstreamAuth::Token("t".into()))
                .unwrap();
        assert_eq!(client.base_url, "http://paperless:8000");
    }

    #[test]
    fn test_document_page_deserialises_minimal_payload() {
        let page: DocumentPage = serde_json::from_str(
            r#"{
                "count": 2,
                "next": "http://paperless:8000/api/documents/?page=2",
                "results": [
                    {"id": 1, "title": "Invoice", "content": "body", "tags": [3, 1], "modified": "2026-03-01T10:00:00Z"},
                    {"id": 2, "modified": "2026-02-28T09:00:00Z"}
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(page.count, Some(2));
        assert_eq!(page.results.len(), 2);
        assert_eq!(page.results[0].tags, vec![3, 1]);
        // Missing optional fields default.
        assert_eq!(page.results[1].title, "");
        assert_eq!(page.results[1].correspondent, None);
    }

    #[test]
    fn test_metadata_defaults_to_null_sizes() {
        let meta: UpstreamDocumentMeta = serde_json::from_str("{}").unwrap();
        assert_eq!(meta.original_size, None);
        assert_eq!(meta.archive_size, None);
    }
}
