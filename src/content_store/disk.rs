/// Disk-based content store
///
/// Computes a CIDv1 (raw codec, sha2-256) locally and writes the bytes under
/// `{base}/{cid}`. Intended for development deployments without a pinning
/// service; the CIDs match what an IPFS node would assign to a raw block.
use crate::{
    content_store::{content_uri, ContentStore},
    error::{ArcIdError, ArcIdResult, UpstreamService},
};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use tokio::fs;

/// Multicodec code for raw binary blocks
pub const RAW_CODEC: u8 = 0x55;
/// Multihash code for sha2-256
const SHA2_256: u8 = 0x12;
const CID_V1: u8 = 0x01;

#[derive(Clone)]
pub struct DiskContentStore {
    base_path: PathBuf,
}

impl DiskContentStore {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    /// CIDv1 for the given bytes
    ///
    /// Binary layout is `<version><codec><hash code><digest len><digest>`;
    /// every varint here fits one byte. Rendered as multibase base32 ('b').
    pub fn calculate_cid(data: &[u8]) -> String {
        let digest = Sha256::digest(data);
        let mut bytes = Vec::with_capacity(4 + digest.len());
        bytes.extend_from_slice(&[CID_V1, RAW_CODEC, SHA2_256, digest.len() as u8]);
        bytes.extend_from_slice(&digest);
        format!(
            "b{}",
            base32::encode(base32::Alphabet::Rfc4648Lower { padding: false }, &bytes)
        )
    }

    fn blob_path(&self, cid: &str) -> PathBuf {
        self.base_path.join(cid)
    }

    /// Read a stored blob back
    pub async fn get(&self, cid: &str) -> ArcIdResult<Option<Vec<u8>>> {
        match fs::read(self.blob_path(cid)).await {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ArcIdError::Io(e)),
        }
    }
}

#[async_trait]
impl ContentStore for DiskContentStore {
    async fn upload(&self, data: Vec<u8>, filename: &str, _content_type: &str) -> ArcIdResult<String> {
        let cid = Self::calculate_cid(&data);
        let path = self.blob_path(&cid);

        fs::create_dir_all(&self.base_path).await.map_err(|e| {
            ArcIdError::upstream(
                UpstreamService::ContentStore,
                format!("Failed to create content directory: {}", e),
            )
        })?;

        // Content-addressed: an existing file already holds these exact bytes
        if fs::try_exists(&path).await.unwrap_or(false) {
            return Ok(content_uri(&cid));
        }

        fs::write(&path, data).await.map_err(|e| {
            ArcIdError::upstream(
                UpstreamService::ContentStore,
                format!("Failed to write {} as {}: {}", filename, cid, e),
            )
        })?;

        Ok(content_uri(&cid))
    }
}
