/// Content-addressed metadata storage
///
/// Identity metadata is published as an immutable JSON blob; the returned
/// `ipfs://<cid>` URI is what the registry records and what the data hash binds.

pub mod disk;
pub mod http;

pub use disk::DiskContentStore;
pub use http::{HttpContentStore, HttpContentStoreConfig};

use crate::{
    error::{ArcIdError, ArcIdResult, UpstreamService},
    hashing::canonical_json,
};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;

pub const URI_SCHEME: &str = "ipfs";
pub const METADATA_FILENAME: &str = "metadata.json";
pub const METADATA_CONTENT_TYPE: &str = "application/json";

/// Content-addressed store backend
///
/// Implementations upload the bytes and return `ipfs://<content-address>`.
#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn upload(&self, data: Vec<u8>, filename: &str, content_type: &str) -> ArcIdResult<String>;
}

/// Build a content URI from a content address
pub fn content_uri(cid: &str) -> String {
    format!("{}://{}", URI_SCHEME, cid)
}

/// Extract the content address from a content URI
pub fn cid_from_uri(uri: &str) -> Option<&str> {
    uri.strip_prefix(URI_SCHEME)
        .and_then(|rest| rest.strip_prefix("://"))
        .filter(|cid| !cid.is_empty())
}

/// A published metadata document
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishedMetadata {
    pub uri: String,
    pub gateway_url: Option<String>,
}

/// Canonicalizes metadata and uploads it to the configured store
#[derive(Clone)]
pub struct MetadataPublisher {
    store: Arc<dyn ContentStore>,
    gateway: String,
}

impl MetadataPublisher {
    pub fn new(store: Arc<dyn ContentStore>, gateway: impl Into<String>) -> Self {
        Self {
            store,
            gateway: gateway.into(),
        }
    }

    /// Public HTTPS retrieval URL for a content URI
    pub fn gateway_url(&self, uri: &str) -> Option<String> {
        cid_from_uri(uri).map(|cid| {
            format!(
                "https://{}/{}/{}",
                self.gateway.trim_end_matches('/'),
                URI_SCHEME,
                cid
            )
        })
    }

    pub async fn publish<T: Serialize + ?Sized>(&self, metadata: &T) -> ArcIdResult<PublishedMetadata> {
        let json = canonical_json(metadata)?;
        let uri = self
            .store
            .upload(json.into_bytes(), METADATA_FILENAME, METADATA_CONTENT_TYPE)
            .await?;

        if cid_from_uri(&uri).is_none() {
            return Err(ArcIdError::upstream(
                UpstreamService::ContentStore,
                format!("returned a malformed URI: {}", uri),
            ));
        }

        tracing::debug!(uri = %uri, "Metadata published");

        Ok(PublishedMetadata {
            gateway_url: self.gateway_url(&uri),
            uri,
        })
    }
}
