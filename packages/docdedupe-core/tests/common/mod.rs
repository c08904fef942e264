//! Shared test fixtures: corpus text builders, direct store seeding and
//! an in-memory upstream double.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use docdedupe_core::features::normalize::normalize;
use docdedupe_core::features::sync::infrastructure::{
    DocumentPage, NameRef, UpstreamClient, UpstreamDocument, UpstreamDocumentMeta,
};
use docdedupe_core::shared::error::Result;
use docdedupe_storage::{DocumentContent, NewDocument, ProcessingStatus, SqliteStore};

/// A 72-word lorem-ipsum body, comfortably above the default word gate.
pub const LOREM: &str = "lorem ipsum dolor sit amet consectetur adipiscing elit sed do eiusmod \
tempor incididunt ut labore et dolore magna aliqua ut enim ad minim veniam quis nostrud \
exercitation ullamco laboris nisi ut aliquip ex ea commodo consequat duis aute irure dolor in \
reprehenderit in voluptate velit esse cillum dolore eu fugiat nulla pariatur excepteur sint \
occaecat cupidatat non proident sunt in culpa qui officia deserunt mollit anim id est laborum";

/// `n` distinct words with a shared prefix, e.g. `alpha0 alpha1 …`.
pub fn distinct_words(prefix: &str, n: usize) -> String {
    (0..n)
        .map(|i| format!("{prefix}{i}"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Seed a document plus its normalised content straight into the store.
/// Returns the local document id.
pub fn seed_document(
    store: &SqliteStore,
    upstream_id: i64,
    title: &str,
    text: &str,
    archive_size: Option<i64>,
) -> i64 {
    let id = store
        .upsert_document(&NewDocument {
            upstream_id,
            title: title.to_string(),
            correspondent: None,
            document_type: None,
            tags: vec![],
            created_at: Some(Utc::now()),
            added_at: None,
            modified_at: Some(Utc::now()),
            modified_raw: "2026-03-01T10:00:00Z".to_string(),
            processing_status: ProcessingStatus::Pending,
            fingerprint: format!("fp-{upstream_id}"),
            last_synced_at: Utc::now(),
        })
        .unwrap();
    if let Some(size) = archive_size {
        store.set_file_sizes(id, Some(size), Some(size)).unwrap();
    }
    set_content(store, id, text);
    id
}

/// (Re)write a document's content through the normaliser.
pub fn set_content(store: &SqliteStore, document_id: i64, text: &str) {
    let normalized = normalize(text);
    store
        .upsert_content(&DocumentContent {
            document_id,
            full_text: text.to_string(),
            normalized_text: normalized.text,
            word_count: normalized.word_count as i64,
            content_hash: normalized.content_hash,
        })
        .unwrap();
}

/// In-memory [`UpstreamClient`] double with configurable paging.
pub struct MockUpstream {
    pub docs: Mutex<Vec<UpstreamDocument>>,
    pub metadata: Mutex<HashMap<i64, UpstreamDocumentMeta>>,
    pub tags: Vec<NameRef>,
    pub correspondents: Vec<NameRef>,
    pub document_types: Vec<NameRef>,
    pub page_size: usize,
}

impl MockUpstream {
    pub fn new(page_size: usize) -> Self {
        Self {
            docs: Mutex::new(Vec::new()),
            metadata: Mutex::new(HashMap::new()),
            tags: vec![],
            correspondents: vec![],
            document_types: vec![],
            page_size,
        }
    }

    pub fn push_document(&self, doc: UpstreamDocument) {
        self.docs.lock().unwrap().push(doc);
    }

    pub fn set_modified(&self, id: i64, modified: &str) {
        let mut docs = self.docs.lock().unwrap();
        let doc = docs.iter_mut().find(|d| d.id == id).unwrap();
        doc.modified = modified.to_string();
    }

    pub fn set_content(&self, id: i64, content: &str) {
        let mut docs = self.docs.lock().unwrap();
        let doc = docs.iter_mut().find(|d| d.id == id).unwrap();
        doc.content = content.to_string();
    }

    fn page(&self, start: usize) -> DocumentPage {
        let mut docs = self.docs.lock().unwrap().clone();
        // The upstream contract: descending modified.
        docs.sort_by(|a, b| b.modified.cmp(&a.modified));

        let end = (start + self.page_size).min(docs.len());
        let next = (end < docs.len()).then(|| format!("page:{end}"));
        DocumentPage {
            count: Some(docs.len() as i64),
            next,
            results: docs[start..end].to_vec(),
        }
    }
}

#[async_trait]
impl UpstreamClient for MockUpstream {
    async fn documents_first_page(&self) -> Result<DocumentPage> {
        Ok(self.page(0))
    }

    async fn documents_page(&self, next_url: &str) -> Result<DocumentPage> {
        let start: usize = next_url.trim_start_matches("page:").parse().unwrap();
        Ok(self.page(start))
    }

    async fn document_metadata(&self, id: i64) -> Result<UpstreamDocumentMeta> {
        Ok(self
            .metadata
            .lock()
            .unwrap()
            .get(&id)
            .copied()
            .unwrap_or_default())
    }

    async fn tags(&self) -> Result<Vec<NameRef>> {
        Ok(self.tags.clone())
    }

    async fn correspondents(&self) -> Result<Vec<NameRef>> {
        Ok(self.correspondents.clone())
    }

    async fn document_types(&self) -> Result<Vec<NameRef>> {
        Ok(self.document_types.clone())
    }
}

/// A plain upstream document with sensible defaults.
pub fn upstream_doc(id: i64, title: &str, content: &str, modified: &str) -> UpstreamDocument {
    UpstreamDocument {
        id,
        title: title.to_string(),
        content: content.to_string(),
        tags: vec![],
        correspondent: None,
        document_type: None,
        created: Some("2026-01-15T08:00:00Z".to_string()),
        added: Some("2026-01-15T08:05:00Z".to_string()),
        modified: modified.to_string(),
    }
}
