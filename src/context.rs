/// Application context and dependency injection
use crate::{
    config::{ContentBackend, ServerConfig},
    content_store::{
        ContentStore, DiskContentStore, HttpContentStore, HttpContentStoreConfig, MetadataPublisher,
    },
    db,
    error::ArcIdResult,
    ledger::RpcLedgerClient,
    mirror::SqliteMirror,
    orchestrator::IdentityOrchestrator,
    proof::{AssurancePolicy, HttpProofVerifier},
    rate_limit::RateLimiter,
};
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::info;

/// Application context holding all shared services
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<ServerConfig>,
    pub mirror_db: SqlitePool,
    pub orchestrator: Arc<IdentityOrchestrator>,
    pub rate_limiter: Arc<RateLimiter>,
}

impl AppContext {
    /// Create a new application context from configuration
    pub async fn new(config: ServerConfig) -> ArcIdResult<Self> {
        config.validate()?;

        // Mirror database
        let options = db::DatabaseOptions {
            max_connections: config.storage.max_connections,
            ..Default::default()
        };
        let mirror_db = db::create_pool(&config.storage.mirror_db, options).await?;
        db::run_migrations(&mirror_db).await?;
        db::test_connection(&mirror_db).await?;
        let mirror = Arc::new(SqliteMirror::new(mirror_db.clone()));

        // Registry client
        let ledger = RpcLedgerClient::connect(config.ledger_client_config()).await?;

        // Proof verifier
        let policy = AssurancePolicy::from_list(&config.verifier.format_only_levels)?;
        let verifier = HttpProofVerifier::new(config.proof_verifier_config(), policy)?;
        info!(
            format_only = ?verifier.policy().format_only_levels().collect::<Vec<_>>(),
            "Proof verifier ready"
        );

        // Metadata storage
        let store: Arc<dyn ContentStore> = match &config.content_store.backend {
            ContentBackend::Http { endpoint, token } => {
                info!(endpoint = %endpoint, "Using HTTP content store");
                Arc::new(HttpContentStore::new(HttpContentStoreConfig {
                    endpoint: endpoint.clone(),
                    token: token.as_ref().map(|t| t.expose().to_string()),
                    timeout_secs: config.content_store.timeout_secs,
                })?)
            }
            ContentBackend::Disk { directory } => {
                info!(directory = ?directory, "Using disk content store");
                tokio::fs::create_dir_all(directory).await?;
                Arc::new(DiskContentStore::new(directory.clone()))
            }
        };
        let publisher = MetadataPublisher::new(store, config.content_store.gateway.clone());

        let orchestrator = IdentityOrchestrator::new(
            Arc::new(verifier),
            publisher,
            Arc::new(ledger),
            mirror,
            config.orchestrator_config(),
        );

        Ok(Self::from_parts(config, mirror_db, Arc::new(orchestrator)))
    }

    /// Assemble a context around an already-built orchestrator
    pub fn from_parts(
        config: ServerConfig,
        mirror_db: SqlitePool,
        orchestrator: Arc<IdentityOrchestrator>,
    ) -> Self {
        let rate_limiter = Arc::new(RateLimiter::new(&config.rate_limit));
        Self {
            config: Arc::new(config),
            mirror_db,
            orchestrator,
            rate_limiter,
        }
    }

    /// Get service URL
    pub fn service_url(&self) -> String {
        format!(
            "http://{}:{}",
            self.config.service.hostname, self.config.service.port
        )
    }
}
