/// HTTP pinning-service content store
///
/// `POST {endpoint}/upload` with the raw bytes as body, the content type and
/// an `X-Name` header; the service answers `{"cid": "..."}`.
use crate::{
    content_store::{content_uri, ContentStore},
    error::{ArcIdError, ArcIdResult, UpstreamService},
};
use async_trait::async_trait;
use reqwest::header;
use serde::Deserialize;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct HttpContentStoreConfig {
    pub endpoint: String,
    pub token: Option<String>,
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    cid: String,
}

pub struct HttpContentStore {
    client: reqwest::Client,
    config: HttpContentStoreConfig,
}

impl HttpContentStore {
    pub fn new(config: HttpContentStoreConfig) -> ArcIdResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("arcid/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ArcIdError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }
}

#[async_trait]
impl ContentStore for HttpContentStore {
    async fn upload(&self, data: Vec<u8>, filename: &str, content_type: &str) -> ArcIdResult<String> {
        let url = format!("{}/upload", self.config.endpoint.trim_end_matches('/'));

        let mut request = self
            .client
            .post(&url)
            .header(header::CONTENT_TYPE, content_type)
            .header("X-Name", filename)
            .body(data);
        if let Some(token) = &self.config.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| {
            ArcIdError::upstream(UpstreamService::ContentStore, format!("upload failed: {}", e))
        })?;

        if !response.status().is_success() {
            return Err(ArcIdError::upstream(
                UpstreamService::ContentStore,
                format!("upload returned HTTP {}", response.status()),
            ));
        }

        let body: UploadResponse = response.json().await.map_err(|e| {
            ArcIdError::upstream(
                UpstreamService::ContentStore,
                format!("invalid upload response: {}", e),
            )
        })?;

        let cid = libipld::Cid::from_str(body.cid.trim()).map_err(|e| {
            ArcIdError::upstream(
                UpstreamService::ContentStore,
                format!("upload response carried an invalid cid: {}", e),
            )
        })?;

        Ok(content_uri(&cid.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content_store::DiskContentStore;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn store(uri: &str, token: Option<&str>) -> HttpContentStore {
        HttpContentStore::new(HttpContentStoreConfig {
            endpoint: uri.to_string(),
            token: token.map(String::from),
            timeout_secs: 5,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_upload_returns_ipfs_uri() {
        let server = MockServer::start().await;
        let cid = DiskContentStore::calculate_cid(b"{}");
        Mock::given(method("POST"))
            .and(path("/upload"))
            .and(header("x-name", "metadata.json"))
            .and(header("content-type", "application/json"))
            .and(header("authorization", "Bearer s3cret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "cid": cid
            })))
            .expect(1)
            .mount(&server)
            .await;

        let uri = store(&server.uri(), Some("s3cret"))
            .upload(b"{}".to_vec(), "metadata.json", "application/json")
            .await
            .unwrap();
        assert_eq!(uri, format!("ipfs://{}", cid));
    }

    #[tokio::test]
    async fn test_upload_with_garbage_cid_is_upstream() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "cid": "not-a-cid"
            })))
            .mount(&server)
            .await;

        let err = store(&server.uri(), None)
            .upload(b"{}".to_vec(), "metadata.json", "application/json")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("invalid cid"));
    }

    #[tokio::test]
    async fn test_upload_error_status_is_upstream() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = store(&server.uri(), None)
            .upload(b"{}".to_vec(), "metadata.json", "application/json")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ArcIdError::Upstream { service: UpstreamService::ContentStore, .. }
        ));
    }

    #[tokio::test]
    async fn test_upload_without_cid_is_upstream() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
            .mount(&server)
            .await;

        let err = store(&server.uri(), None)
            .upload(b"{}".to_vec(), "metadata.json", "application/json")
            .await
            .unwrap_err();
        assert!(matches!(err, ArcIdError::Upstream { .. }));
    }
}
