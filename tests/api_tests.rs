//! HTTP API tests
//!
//! Drive the full router with `oneshot` requests. The registry is an
//! in-memory fake that counts every call, the mirror is an in-memory SQLite
//! database and metadata lands in a temporary directory.

use arcid::{
    address::Address,
    config::ServerConfig,
    content_store::{DiskContentStore, MetadataPublisher},
    context::AppContext,
    crypto::EthSigner,
    db,
    error::{ArcIdError, ArcIdResult, UpstreamService},
    hashing::keccak256,
    ledger::{IdentityLedger, IdentityWrite, OnChainIdentity, TxConfirmation},
    mirror::SqliteMirror,
    orchestrator::IdentityOrchestrator,
    proof::{AssurancePolicy, HttpProofVerifier, ProofVerifierConfig},
    server::build_router,
};
use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tower::ServiceExt;

const API_KEY: &str = "privileged-key-0123456789";
const USER_KEY: &str = "59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d";

#[derive(Default)]
struct CountingLedger {
    identities: Mutex<HashMap<Address, OnChainIdentity>>,
    calls: AtomicUsize,
    writes: AtomicUsize,
}

impl CountingLedger {
    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn touch(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }

    fn confirm(&self) -> TxConfirmation {
        let n = self.writes.fetch_add(1, Ordering::SeqCst) + 1;
        TxConfirmation {
            tx_hash: format!("0x{}", hex::encode(keccak256(&n.to_be_bytes()))),
            block_number: n as u64,
        }
    }
}

#[async_trait]
impl IdentityLedger for CountingLedger {
    async fn mint_identity(&self, to: &Address, write: &IdentityWrite) -> ArcIdResult<TxConfirmation> {
        self.touch();
        self.identities.lock().unwrap().insert(
            to.clone(),
            OnChainIdentity {
                verified: true,
                credit_score: write.credit_score,
                data_hash: write.data_hash,
                metadata_uri: write.metadata_uri.clone(),
                issued_at: DateTime::from_timestamp(Utc::now().timestamp(), 0).unwrap(),
            },
        );
        Ok(self.confirm())
    }

    async fn update_identity(
        &self,
        user: &Address,
        write: &IdentityWrite,
        verified: bool,
    ) -> ArcIdResult<TxConfirmation> {
        self.touch();
        {
            let mut identities = self.identities.lock().unwrap();
            let identity = identities
                .get_mut(user)
                .ok_or_else(|| ArcIdError::upstream(UpstreamService::Ledger, "transaction reverted"))?;
            identity.data_hash = write.data_hash;
            identity.metadata_uri = write.metadata_uri.clone();
            identity.credit_score = write.credit_score;
            identity.verified = verified;
        }
        Ok(self.confirm())
    }

    async fn revoke_identity(&self, user: &Address) -> ArcIdResult<TxConfirmation> {
        self.touch();
        {
            let mut identities = self.identities.lock().unwrap();
            let identity = identities
                .get_mut(user)
                .ok_or_else(|| ArcIdError::upstream(UpstreamService::Ledger, "transaction reverted"))?;
            identity.verified = false;
        }
        Ok(self.confirm())
    }

    async fn is_verified(&self, user: &Address) -> ArcIdResult<bool> {
        self.touch();
        Ok(self
            .identities
            .lock()
            .unwrap()
            .get(user)
            .is_some_and(|i| i.verified))
    }

    async fn get_identity_data(&self, user: &Address) -> ArcIdResult<Option<OnChainIdentity>> {
        self.touch();
        Ok(self.identities.lock().unwrap().get(user).cloned())
    }
}

struct TestApp {
    router: Router,
    ledger: Arc<CountingLedger>,
    _content_dir: TempDir,
}

fn test_config() -> ServerConfig {
    test_config_with(&[])
}

fn test_config_with(overrides: &[(&'static str, &'static str)]) -> ServerConfig {
    let mut vars = HashMap::from([
        ("ARCID_RPC_URL", "http://127.0.0.1:8545"),
        ("ARCID_CONTRACT_ADDRESS", "0x5fbdb2315678afecb367f032d93f642f64180aa3"),
        (
            "ARCID_SIGNER_PRIVATE_KEY",
            "0x4646464646464646464646464646464646464646464646464646464646464646",
        ),
        ("ARCID_API_KEY", API_KEY),
        ("ARCID_HASH_SALT", "api-test-salt"),
        ("ARCID_RATE_LIMITS_ENABLED", "false"),
    ]);
    vars.extend(overrides.iter().copied());
    ServerConfig::from_vars(|key| vars.get(key).map(|v| v.to_string())).unwrap()
}

async fn test_app() -> TestApp {
    test_app_with(test_config()).await
}

async fn test_app_with(config: ServerConfig) -> TestApp {
    let pool = db::memory_pool().await.unwrap();
    let content_dir = tempfile::tempdir().unwrap();

    // Device-tier proofs never reach this endpoint
    let verifier = HttpProofVerifier::new(
        ProofVerifierConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            app_id: "app_test".to_string(),
            action_id: "arcid".to_string(),
            timeout_secs: 1,
        },
        AssurancePolicy::default(),
    )
    .unwrap();

    let publisher = MetadataPublisher::new(
        Arc::new(DiskContentStore::new(content_dir.path().to_path_buf())),
        config.content_store.gateway.clone(),
    );
    let ledger = Arc::new(CountingLedger::default());

    let orchestrator = IdentityOrchestrator::new(
        Arc::new(verifier),
        publisher,
        ledger.clone(),
        Arc::new(SqliteMirror::new(pool.clone())),
        config.orchestrator_config(),
    );

    let ctx = AppContext::from_parts(config, pool, Arc::new(orchestrator));

    TestApp {
        router: build_router(ctx),
        ledger,
        _content_dir: content_dir,
    }
}

fn user() -> EthSigner {
    EthSigner::from_hex(USER_KEY).unwrap()
}

fn device_proof() -> Value {
    json!({
        "merkle_root": "0x1f38",
        "nullifier_hash": "0x2bf8",
        "verification_level": "device"
    })
}

fn post(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

async fn mint(app: &TestApp, address: &Address) -> Value {
    let (status, body) = send(
        &app.router,
        post(
            "/api/arcid/mint",
            json!({
                "address": address.as_str(),
                "email": "a@b.edu",
                "country": "US",
                "proof": device_proof()
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "mint failed: {}", body);
    body
}

#[tokio::test]
async fn test_health() {
    let app = test_app().await;
    let (status, body) = send(&app.router, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (status, body) = send(&app.router, get("/health/ready")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ready");
}

#[tokio::test]
async fn test_unknown_route_is_json_404() {
    let app = test_app().await;
    let (status, body) = send(&app.router, get("/api/arcid/nope")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "NotFound");
}

#[tokio::test]
async fn test_mint_then_read_back() {
    let app = test_app().await;
    let address = user().address().clone();

    let body = mint(&app, &address).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["creditScore"], 325);
    assert!(body["transactionHash"].as_str().unwrap().starts_with("0x"));
    assert!(body["metadataURI"].as_str().unwrap().starts_with("ipfs://"));
    assert_eq!(body["warnings"], json!([]));
    assert_eq!(app.ledger.writes(), 1);

    let uri = format!("/api/arcid/identity/{}", address.as_str().to_uppercase().replace("0X", "0x"));
    let (status, identity) = send(&app.router, get(&uri)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(identity["address"], address.as_str());
    assert_eq!(identity["verified"], true);
    assert_eq!(identity["creditScore"], 325);
    assert_eq!(identity["country"], "US");

    let (status, verified) = send(
        &app.router,
        get(&format!("/api/arcid/isVerified/{}", address)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(verified["verified"], true);

    let (_, score) = send(
        &app.router,
        get(&format!("/api/arcid/creditScore/{}", address)),
    )
    .await;
    assert_eq!(score["creditScore"], 325);
    assert_eq!(score["rating"], "Fair");

    let (_, history) = send(&app.router, get(&format!("/api/arcid/history/{}", address))).await;
    let events = history["events"].as_array().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["type"], "mint");
}

#[tokio::test]
async fn test_mint_missing_proof_is_rejected_before_ledger() {
    let app = test_app().await;
    let (status, body) = send(
        &app.router,
        post(
            "/api/arcid/mint",
            json!({
                "address": user().address().as_str(),
                "email": "a@b.edu",
                "country": "US"
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "InvalidRequest");
    assert_eq!(app.ledger.calls(), 0);
}

#[tokio::test]
async fn test_malformed_json_is_validation_error() {
    let app = test_app().await;
    let request = Request::builder()
        .method("POST")
        .uri("/api/arcid/mint")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();

    let (status, body) = send(&app.router, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "InvalidRequest");
}

#[tokio::test]
async fn test_update_without_mode_never_touches_ledger() {
    let app = test_app().await;
    let (status, body) = send(
        &app.router,
        post(
            "/api/arcid/update",
            json!({ "address": user().address().as_str() }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "InvalidRequest");
    assert_eq!(app.ledger.calls(), 0);
}

#[tokio::test]
async fn test_update_payload_records_event() {
    let app = test_app().await;
    let address = user().address().clone();
    mint(&app, &address).await;

    let (status, body) = send(
        &app.router,
        post(
            "/api/arcid/update",
            json!({ "address": address.as_str(), "payload": {"b": 2, "a": 1} }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["reverified"], false);
    assert_eq!(body["creditScore"], 325);
    assert_eq!(app.ledger.writes(), 2);

    let (_, history) = send(&app.router, get(&format!("/api/arcid/history/{}", address))).await;
    let events = history["events"].as_array().unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0]["type"], "update");
}

#[tokio::test]
async fn test_revoke_without_key_is_unauthorized() {
    let app = test_app().await;
    let (status, body) = send(
        &app.router,
        post(
            "/api/arcid/revoke",
            json!({ "userAddress": user().address().as_str() }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Unauthorized");
    assert_eq!(app.ledger.calls(), 0);
}

#[tokio::test]
async fn test_revoke_with_wrong_key_skips_body_parsing() {
    let app = test_app().await;
    let request = Request::builder()
        .method("POST")
        .uri("/api/arcid/revoke")
        .header("content-type", "application/json")
        .header("x-api-key", "not-the-key-at-all")
        .body(Body::from("{not json"))
        .unwrap();

    let (status, _) = send(&app.router, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(app.ledger.calls(), 0);
}

#[tokio::test]
async fn test_revoke_with_key() {
    let app = test_app().await;
    let address = user().address().clone();
    mint(&app, &address).await;

    let request = Request::builder()
        .method("POST")
        .uri("/api/arcid/revoke")
        .header("content-type", "application/json")
        .header("x-api-key", API_KEY)
        .body(Body::from(json!({ "userAddress": address.as_str() }).to_string()))
        .unwrap();

    let (status, body) = send(&app.router, request).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert!(body["transactionHash"].is_string());

    let (_, verified) = send(
        &app.router,
        get(&format!("/api/arcid/isVerified/{}", address)),
    )
    .await;
    assert_eq!(verified["verified"], false);
}

#[tokio::test]
async fn test_verify_identity_flow() {
    let app = test_app().await;
    let signer = user();
    let address = signer.address().clone();
    mint(&app, &address).await;

    let message = "Sign in to Example dApp\nnonce: 42";
    let signature = signer.sign_personal_message(message).unwrap();

    let (status, body) = send(
        &app.router,
        post(
            "/api/arcid/verify-identity",
            json!({
                "address": address.as_str(),
                "signature": signature,
                "message": message,
                "dapp_name": "Example",
                "dapp_url": "https://example.app"
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["success"], true);
    assert_eq!(body["verified"], true);
    assert_eq!(body["creditScore"], 325);
    assert_eq!(body["dapp"]["name"], "Example");
    assert_eq!(body["dapp"]["url"], "https://example.app");

    let (_, dapps) = send(
        &app.router,
        get(&format!("/api/arcid/connected-dapps/{}", address)),
    )
    .await;
    let data = dapps["data"].as_array().unwrap();
    assert_eq!(data.len(), 1);
    assert_eq!(data[0]["dappName"], "Example");
}

#[tokio::test]
async fn test_verify_identity_rejects_foreign_signature() {
    let app = test_app().await;
    let address = user().address().clone();
    mint(&app, &address).await;

    let impostor = EthSigner::from_hex(
        "5de4111afa1a4b94908f83103eb1f1706367c2e68ca870fc3fb9a804cdab365a",
    )
    .unwrap();
    let message = "Sign in to Example dApp";
    let signature = impostor.sign_personal_message(message).unwrap();

    let (status, body) = send(
        &app.router,
        post(
            "/api/arcid/verify-identity",
            json!({
                "address": address.as_str(),
                "signature": signature,
                "message": message,
                "dapp_name": "Example",
                "dapp_url": "https://example.app"
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Unauthorized");
}

#[tokio::test]
async fn test_verify_identity_unverified_is_forbidden() {
    let app = test_app().await;
    let signer = user();
    let message = "hello";
    let signature = signer.sign_personal_message(message).unwrap();

    let (status, body) = send(
        &app.router,
        post(
            "/api/arcid/verify-identity",
            json!({
                "address": signer.address().as_str(),
                "signature": signature,
                "message": message,
                "dapp_name": "Example",
                "dapp_url": "https://example.app"
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "NotVerified");
}

#[tokio::test]
async fn test_unknown_identity_is_404() {
    let app = test_app().await;
    let (status, body) = send(
        &app.router,
        get("/api/arcid/identity/0x0000000000000000000000000000000000000001"),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "NotFound");
}

#[tokio::test]
async fn test_bad_path_address_is_400() {
    let app = test_app().await;
    let (status, _) = send(&app.router, get("/api/arcid/isVerified/not-an-address")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(app.ledger.calls(), 0);
}

#[tokio::test]
async fn test_proof_verify_device_tier() {
    let app = test_app().await;
    let (status, body) = send(&app.router, post("/api/proof/verify", device_proof())).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["verified"], true);
    assert_eq!(body["external"], false);
    assert_eq!(body["level"], "device");
}

fn health_with_key(key: &str) -> Request<Body> {
    Request::builder()
        .uri("/health")
        .header("x-api-key", key)
        .body(Body::empty())
        .unwrap()
}

fn limited_config() -> ServerConfig {
    test_config_with(&[
        ("ARCID_RATE_LIMITS_ENABLED", "true"),
        ("ARCID_RATE_LIMIT_RPS", "1"),
        ("ARCID_RATE_LIMIT_BURST", "2"),
    ])
}

#[tokio::test]
async fn test_wrong_api_key_shares_public_bucket() {
    let app = test_app_with(limited_config()).await;

    let mut statuses = Vec::new();
    for _ in 0..3 {
        let (status, _) = send(&app.router, health_with_key("not-the-key")).await;
        statuses.push(status);
    }

    assert_eq!(
        statuses,
        vec![StatusCode::OK, StatusCode::OK, StatusCode::TOO_MANY_REQUESTS]
    );
}

#[tokio::test]
async fn test_valid_api_key_uses_privileged_bucket() {
    let app = test_app_with(limited_config()).await;

    for _ in 0..2 {
        let (status, _) = send(&app.router, get("/health")).await;
        assert_eq!(status, StatusCode::OK);
    }
    let (status, body) = send(&app.router, get("/health")).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["error"], "RateLimitExceeded");

    let (status, _) = send(&app.router, health_with_key(API_KEY)).await;
    assert_eq!(status, StatusCode::OK);
}
