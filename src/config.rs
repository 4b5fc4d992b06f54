/// Configuration management for the ArcID service
use crate::{
    address::is_valid_address,
    error::{ArcIdError, ArcIdResult},
    ledger::LedgerClientConfig,
    orchestrator::OrchestratorConfig,
    proof::{AssurancePolicy, ProofVerifierConfig},
};
use std::{env, fmt, path::PathBuf, time::Duration};

/// Main service configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub service: ServiceConfig,
    pub storage: StorageConfig,
    pub ledger: LedgerConfig,
    pub verifier: VerifierConfig,
    pub content_store: ContentStoreConfig,
    pub hashing: HashingConfig,
    pub authentication: AuthConfig,
    pub rate_limit: RateLimitConfig,
    pub logging: LoggingConfig,
}

/// Service identity and binding
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub hostname: String,
    pub port: u16,
    pub version: String,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// SQLite file holding the off-chain mirror
    pub mirror_db: PathBuf,
    pub max_connections: u32,
}

/// Registry contract access
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    pub rpc_url: String,
    pub contract_address: String,
    pub signer_private_key: Secret,
    /// Resolved from the node when unset
    pub chain_id: Option<u64>,
    pub confirmations: u64,
    pub receipt_poll_ms: u64,
    pub confirmation_timeout_secs: u64,
    /// Fixed gas limit; estimated per transaction when unset
    pub gas_limit: Option<u64>,
    pub rpc_timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct VerifierConfig {
    pub base_url: String,
    pub app_id: String,
    pub action_id: String,
    /// Comma-separated tiers accepted on format checks alone
    pub format_only_levels: String,
    pub kyc_provider: String,
    pub timeout_secs: u64,
}

/// Metadata storage backend
#[derive(Debug, Clone)]
pub enum ContentBackend {
    Http { endpoint: String, token: Option<Secret> },
    Disk { directory: PathBuf },
}

#[derive(Debug, Clone)]
pub struct ContentStoreConfig {
    pub backend: ContentBackend,
    pub gateway: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct HashingConfig {
    pub salt: Secret,
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Shared secret for privileged endpoints
    pub api_key: Secret,
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub requests_per_second: u32,
    pub burst_size: u32,
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Filter directives used when `RUST_LOG` is unset
    pub level: String,
    pub json: bool,
}

/// String that never shows up in `Debug` output
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<redacted>")
    }
}

fn required(vars: &impl Fn(&str) -> Option<String>, key: &str) -> ArcIdResult<String> {
    vars(key)
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ArcIdError::Validation(format!("{} must be set", key)))
}

fn parse_or<T: std::str::FromStr>(vars: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    vars(key).and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}

fn optional_number(vars: &impl Fn(&str) -> Option<String>, key: &str) -> ArcIdResult<Option<u64>> {
    match vars(key).filter(|v| !v.trim().is_empty()) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ArcIdError::Validation(format!("{} must be a positive integer", key))),
    }
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> ArcIdResult<Self> {
        dotenv::dotenv().ok();
        Self::from_vars(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable source
    pub fn from_vars(vars: impl Fn(&str) -> Option<String>) -> ArcIdResult<Self> {
        let service = ServiceConfig {
            hostname: vars("ARCID_HOSTNAME").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_or(&vars, "ARCID_PORT", 3000),
            version: env!("CARGO_PKG_VERSION").to_string(),
        };

        let storage = StorageConfig {
            mirror_db: PathBuf::from(
                vars("ARCID_MIRROR_DB").unwrap_or_else(|| "./data/arcid.sqlite".to_string()),
            ),
            max_connections: parse_or(&vars, "ARCID_DB_MAX_CONNECTIONS", 10),
        };

        let ledger = LedgerConfig {
            rpc_url: required(&vars, "ARCID_RPC_URL")?,
            contract_address: required(&vars, "ARCID_CONTRACT_ADDRESS")?,
            signer_private_key: Secret::new(required(&vars, "ARCID_SIGNER_PRIVATE_KEY")?),
            chain_id: optional_number(&vars, "ARCID_CHAIN_ID")?,
            confirmations: parse_or(&vars, "ARCID_CONFIRMATIONS", 1),
            receipt_poll_ms: parse_or(&vars, "ARCID_RECEIPT_POLL_MS", 1000),
            confirmation_timeout_secs: parse_or(&vars, "ARCID_CONFIRMATION_TIMEOUT_SECS", 120),
            gas_limit: optional_number(&vars, "ARCID_GAS_LIMIT")?,
            rpc_timeout_secs: parse_or(&vars, "ARCID_RPC_TIMEOUT_SECS", 30),
        };

        let verifier = VerifierConfig {
            base_url: vars("ARCID_VERIFIER_BASE_URL")
                .unwrap_or_else(|| "https://developer.worldcoin.org".to_string()),
            app_id: vars("ARCID_VERIFIER_APP_ID").unwrap_or_default(),
            action_id: vars("ARCID_VERIFIER_ACTION_ID").unwrap_or_default(),
            format_only_levels: vars("ARCID_FORMAT_ONLY_LEVELS")
                .unwrap_or_else(|| "device".to_string()),
            kyc_provider: vars("ARCID_KYC_PROVIDER").unwrap_or_else(|| "worldcoin".to_string()),
            timeout_secs: parse_or(&vars, "ARCID_VERIFIER_TIMEOUT_SECS", 15),
        };

        let backend = match vars("ARCID_CONTENT_STORE_URL").filter(|v| !v.trim().is_empty()) {
            Some(endpoint) => ContentBackend::Http {
                endpoint,
                token: vars("ARCID_CONTENT_STORE_TOKEN")
                    .filter(|v| !v.is_empty())
                    .map(Secret::new),
            },
            None => ContentBackend::Disk {
                directory: PathBuf::from(
                    vars("ARCID_CONTENT_STORE_DIR").unwrap_or_else(|| "./data/content".to_string()),
                ),
            },
        };
        let content_store = ContentStoreConfig {
            backend,
            gateway: vars("ARCID_IPFS_GATEWAY").unwrap_or_else(|| "w3s.link".to_string()),
            timeout_secs: parse_or(&vars, "ARCID_CONTENT_STORE_TIMEOUT_SECS", 30),
        };

        let hashing = HashingConfig {
            salt: Secret::new(vars("ARCID_HASH_SALT").unwrap_or_default()),
        };

        let authentication = AuthConfig {
            api_key: Secret::new(required(&vars, "ARCID_API_KEY")?),
        };

        let rate_limit = RateLimitConfig {
            enabled: parse_or(&vars, "ARCID_RATE_LIMITS_ENABLED", true),
            requests_per_second: parse_or(&vars, "ARCID_RATE_LIMIT_RPS", 10),
            burst_size: parse_or(&vars, "ARCID_RATE_LIMIT_BURST", 20),
        };

        let logging = LoggingConfig {
            level: vars("ARCID_LOG_LEVEL")
                .unwrap_or_else(|| "arcid=debug,tower_http=debug".to_string()),
            json: parse_or(&vars, "ARCID_LOG_JSON", false),
        };

        Ok(Self {
            service,
            storage,
            ledger,
            verifier,
            content_store,
            hashing,
            authentication,
            rate_limit,
            logging,
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> ArcIdResult<()> {
        if self.authentication.api_key.expose().len() < 16 {
            return Err(ArcIdError::Validation(
                "ARCID_API_KEY must be at least 16 characters".to_string(),
            ));
        }

        let key = self
            .ledger
            .signer_private_key
            .expose()
            .trim_start_matches("0x");
        if key.len() != 64 || hex::decode(key).is_err() {
            return Err(ArcIdError::Validation(
                "ARCID_SIGNER_PRIVATE_KEY must be 32 hex-encoded bytes".to_string(),
            ));
        }

        if !is_valid_address(&self.ledger.contract_address) {
            return Err(ArcIdError::Validation(format!(
                "ARCID_CONTRACT_ADDRESS is not a valid address: {}",
                self.ledger.contract_address
            )));
        }

        if self.ledger.confirmations == 0 {
            return Err(ArcIdError::Validation(
                "ARCID_CONFIRMATIONS must be at least 1".to_string(),
            ));
        }

        AssurancePolicy::from_list(&self.verifier.format_only_levels)?;

        if self.verifier.app_id.is_empty() || self.verifier.action_id.is_empty() {
            tracing::warn!("Verifier app/action id not set; only format-only tiers will verify");
        }

        Ok(())
    }

    pub fn ledger_client_config(&self) -> LedgerClientConfig {
        LedgerClientConfig {
            rpc_url: self.ledger.rpc_url.clone(),
            contract_address: self.ledger.contract_address.clone(),
            signer_private_key: self.ledger.signer_private_key.expose().to_string(),
            chain_id: self.ledger.chain_id,
            confirmations: self.ledger.confirmations,
            poll_interval: Duration::from_millis(self.ledger.receipt_poll_ms),
            confirmation_timeout: Duration::from_secs(self.ledger.confirmation_timeout_secs),
            gas_limit: self.ledger.gas_limit,
            timeout_secs: self.ledger.rpc_timeout_secs,
        }
    }

    pub fn proof_verifier_config(&self) -> ProofVerifierConfig {
        ProofVerifierConfig {
            base_url: self.verifier.base_url.clone(),
            app_id: self.verifier.app_id.clone(),
            action_id: self.verifier.action_id.clone(),
            timeout_secs: self.verifier.timeout_secs,
        }
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            hash_salt: self.hashing.salt.expose().to_string(),
            kyc_provider: self.verifier.kyc_provider.clone(),
            revoke_secret: self.authentication.api_key.expose().to_string(),
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.service.hostname, self.service.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const KEY: &str = "4646464646464646464646464646464646464646464646464646464646464646";

    fn base_vars() -> HashMap<&'static str, String> {
        HashMap::from([
            ("ARCID_RPC_URL", "http://127.0.0.1:8545".to_string()),
            (
                "ARCID_CONTRACT_ADDRESS",
                "0x5fbdb2315678afecb367f032d93f642f64180aa3".to_string(),
            ),
            ("ARCID_SIGNER_PRIVATE_KEY", format!("0x{}", KEY)),
            ("ARCID_API_KEY", "privileged-key-0123456789".to_string()),
        ])
    }

    fn load(vars: &HashMap<&'static str, String>) -> ArcIdResult<ServerConfig> {
        ServerConfig::from_vars(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&base_vars()).unwrap();
        config.validate().unwrap();

        assert_eq!(config.bind_address(), "0.0.0.0:3000");
        assert_eq!(config.storage.mirror_db, PathBuf::from("./data/arcid.sqlite"));
        assert_eq!(config.ledger.chain_id, None);
        assert_eq!(config.ledger.confirmations, 1);
        assert_eq!(config.verifier.base_url, "https://developer.worldcoin.org");
        assert_eq!(config.verifier.format_only_levels, "device");
        assert_eq!(config.verifier.kyc_provider, "worldcoin");
        assert_eq!(config.content_store.gateway, "w3s.link");
        assert!(matches!(config.content_store.backend, ContentBackend::Disk { .. }));
        assert!(config.rate_limit.enabled);
        assert!(!config.logging.json);
        assert_eq!(config.logging.level, "arcid=debug,tower_http=debug");
    }

    #[test]
    fn test_missing_api_key_is_rejected() {
        let mut vars = base_vars();
        vars.remove("ARCID_API_KEY");
        let err = load(&vars).unwrap_err();
        assert!(err.to_string().contains("ARCID_API_KEY"));
    }

    #[test]
    fn test_short_api_key_fails_validation() {
        let mut vars = base_vars();
        vars.insert("ARCID_API_KEY", "short".to_string());
        assert!(load(&vars).unwrap().validate().is_err());
    }

    #[test]
    fn test_bad_signer_key_fails_validation() {
        let mut vars = base_vars();
        vars.insert("ARCID_SIGNER_PRIVATE_KEY", "0x1234".to_string());
        assert!(load(&vars).unwrap().validate().is_err());
    }

    #[test]
    fn test_bad_contract_address_fails_validation() {
        let mut vars = base_vars();
        vars.insert("ARCID_CONTRACT_ADDRESS", "registry".to_string());
        assert!(load(&vars).unwrap().validate().is_err());
    }

    #[test]
    fn test_unknown_policy_level_fails_validation() {
        let mut vars = base_vars();
        vars.insert("ARCID_FORMAT_ONLY_LEVELS", "device,retina".to_string());
        assert!(load(&vars).unwrap().validate().is_err());
    }

    #[test]
    fn test_non_numeric_chain_id_is_rejected() {
        let mut vars = base_vars();
        vars.insert("ARCID_CHAIN_ID", "mainnet".to_string());
        assert!(load(&vars).is_err());
    }

    #[test]
    fn test_http_backend_and_ledger_conversion() {
        let mut vars = base_vars();
        vars.insert("ARCID_CONTENT_STORE_URL", "https://pin.example".to_string());
        vars.insert("ARCID_CONTENT_STORE_TOKEN", "tok".to_string());
        vars.insert("ARCID_CHAIN_ID", "31337".to_string());
        vars.insert("ARCID_GAS_LIMIT", "300000".to_string());
        vars.insert("ARCID_RECEIPT_POLL_MS", "250".to_string());
        let config = load(&vars).unwrap();

        match &config.content_store.backend {
            ContentBackend::Http { endpoint, token } => {
                assert_eq!(endpoint, "https://pin.example");
                assert_eq!(token.as_ref().map(Secret::expose), Some("tok"));
            }
            other => panic!("expected HTTP backend, got {:?}", other),
        }

        let ledger = config.ledger_client_config();
        assert_eq!(ledger.chain_id, Some(31337));
        assert_eq!(ledger.gas_limit, Some(300_000));
        assert_eq!(ledger.poll_interval, Duration::from_millis(250));
    }

    #[test]
    fn test_debug_output_redacts_secrets() {
        let config = load(&base_vars()).unwrap();
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains(KEY));
        assert!(!rendered.contains("privileged-key-0123456789"));
    }
}
