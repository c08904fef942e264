//! Upstream client implementations

pub mod upstream;

pub use upstream::{
    DocumentPage, HttpUpstreamClient, NameRef, UpstreamAuth, UpstreamClient, UpstreamDocument,
    UpstreamDocumentMeta,
};
