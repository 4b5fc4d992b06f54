/// HTTP proof verifier
///
/// Format-only tiers are accepted locally; every other tier is forwarded to
/// `POST {base_url}/api/v2/verify/{app_id}` with the deployment's action id.
use crate::{
    error::{ArcIdError, ArcIdResult, UpstreamService},
    proof::{AssurancePolicy, Proof, ProofVerdict, ProofVerifier},
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Verifier endpoint configuration
#[derive(Debug, Clone)]
pub struct ProofVerifierConfig {
    pub base_url: String,
    pub app_id: String,
    pub action_id: String,
    pub timeout_secs: u64,
}

/// Request body sent to the verification endpoint
#[derive(Debug, Serialize)]
struct VerifyRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    nullifier_hash: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    merkle_root: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    proof: Option<&'a str>,
    verification_level: &'a str,
    action: &'a str,
}

/// Response body; either flag asserted true counts as verified
#[derive(Debug, Default, Deserialize)]
struct VerifyResponse {
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    verified: Option<bool>,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    detail: Option<String>,
}

impl VerifyResponse {
    fn asserts_verified(&self) -> bool {
        self.verified == Some(true) || self.success == Some(true)
    }
}

pub struct HttpProofVerifier {
    client: reqwest::Client,
    config: ProofVerifierConfig,
    policy: AssurancePolicy,
}

impl HttpProofVerifier {
    pub fn new(config: ProofVerifierConfig, policy: AssurancePolicy) -> ArcIdResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("arcid/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ArcIdError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config,
            policy,
        })
    }

    pub fn policy(&self) -> &AssurancePolicy {
        &self.policy
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/api/v2/verify/{}",
            self.config.base_url.trim_end_matches('/'),
            self.config.app_id
        )
    }

    async fn verify_remote(&self, proof: &Proof) -> ArcIdResult<ProofVerdict> {
        let body = VerifyRequest {
            nullifier_hash: proof.nullifier_hash.as_deref(),
            merkle_root: proof.merkle_root.as_deref(),
            proof: proof.raw.as_deref(),
            verification_level: proof.verification_level.as_str(),
            action: &self.config.action_id,
        };

        let response = self
            .client
            .post(self.endpoint())
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                let reason = if e.is_timeout() {
                    "verification request timed out".to_string()
                } else {
                    format!("verification request failed: {}", e)
                };
                ArcIdError::upstream(UpstreamService::Verifier, reason)
            })?;

        let status = response.status();
        // A body we cannot parse is treated like an empty one: not verified.
        let data: VerifyResponse = response.json().await.unwrap_or_default();

        if status.is_success() && data.asserts_verified() {
            return Ok(ProofVerdict {
                verified: true,
                level: proof.verification_level,
                external: true,
                detail: "verified by external endpoint".to_string(),
            });
        }

        let reason = match (data.code, data.detail) {
            (Some(code), Some(detail)) => format!("HTTP {}: {} ({})", status.as_u16(), code, detail),
            (Some(code), None) => format!("HTTP {}: {}", status.as_u16(), code),
            (None, Some(detail)) => format!("HTTP {}: {}", status.as_u16(), detail),
            (None, None) => format!("HTTP {}: proof not verified", status.as_u16()),
        };
        Err(ArcIdError::upstream(UpstreamService::Verifier, reason))
    }
}

#[async_trait]
impl ProofVerifier for HttpProofVerifier {
    async fn verify(&self, proof: &Proof) -> ArcIdResult<ProofVerdict> {
        self.policy.check_format(proof)?;

        if self.policy.is_format_only(proof.verification_level) {
            tracing::debug!(
                level = %proof.verification_level,
                "Proof accepted on format checks, external verifier skipped"
            );
            return Ok(ProofVerdict {
                verified: true,
                level: proof.verification_level,
                external: false,
                detail: format!(
                    "{} verification accepted without external check",
                    proof.verification_level
                ),
            });
        }

        match self.verify_remote(proof).await {
            Ok(verdict) => {
                tracing::info!(level = %proof.verification_level, "Proof verified externally");
                Ok(verdict)
            }
            Err(e) => {
                tracing::warn!(level = %proof.verification_level, error = %e, "Proof verification failed");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proof::VerificationLevel;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn verifier(server_uri: &str) -> HttpProofVerifier {
        HttpProofVerifier::new(
            ProofVerifierConfig {
                base_url: server_uri.to_string(),
                app_id: "app_staging_123".to_string(),
                action_id: "arcid-verify".to_string(),
                timeout_secs: 5,
            },
            AssurancePolicy::default(),
        )
        .unwrap()
    }

    fn proof(level: VerificationLevel) -> Proof {
        Proof {
            nullifier_hash: Some("0x2bf8".into()),
            merkle_root: Some("0x1f38".into()),
            verification_level: level,
            raw: Some("0xproof".into()),
        }
    }

    #[tokio::test]
    async fn test_device_tier_skips_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let verdict = verifier(&server.uri())
            .verify(&proof(VerificationLevel::Device))
            .await
            .unwrap();
        assert!(verdict.verified);
        assert!(!verdict.external);
    }

    #[tokio::test]
    async fn test_orb_tier_forwards_with_action() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v2/verify/app_staging_123"))
            .and(body_partial_json(serde_json::json!({
                "action": "arcid-verify",
                "nullifier_hash": "0x2bf8",
                "verification_level": "orb"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": true,
                "verified": true
            })))
            .expect(1)
            .mount(&server)
            .await;

        let verdict = verifier(&server.uri())
            .verify(&proof(VerificationLevel::Orb))
            .await
            .unwrap();
        assert!(verdict.verified);
        assert!(verdict.external);
    }

    #[tokio::test]
    async fn test_negative_assertion_fails_closed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "verified": false
            })))
            .mount(&server)
            .await;

        let err = verifier(&server.uri())
            .verify(&proof(VerificationLevel::Orb))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ArcIdError::Upstream { service: UpstreamService::Verifier, .. }
        ));
    }

    #[tokio::test]
    async fn test_error_status_fails_closed_even_if_body_claims_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "success": true,
                "code": "invalid_proof",
                "detail": "The provided proof is invalid"
            })))
            .mount(&server)
            .await;

        let err = verifier(&server.uri())
            .verify(&proof(VerificationLevel::Orb))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("invalid_proof"));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_fails_closed() {
        // Port 9 (discard) on localhost is not serving HTTP
        let err = verifier("http://127.0.0.1:9")
            .verify(&proof(VerificationLevel::Orb))
            .await
            .unwrap_err();
        assert!(matches!(err, ArcIdError::Upstream { .. }));
    }

    #[tokio::test]
    async fn test_malformed_proof_rejected_before_network() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let mut bad = proof(VerificationLevel::Orb);
        bad.nullifier_hash = None;
        let err = verifier(&server.uri()).verify(&bad).await.unwrap_err();
        assert!(matches!(err, ArcIdError::Validation(_)));
    }
}
