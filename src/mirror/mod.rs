/// Off-chain identity mirror
///
/// Eventually-consistent copy of the registry, augmented with the PII that
/// never goes on-chain. Three collections: identities keyed by lowercase
/// address, an append-only verification log, and connected-dApp
/// authorizations unique on (address, dapp_name).

pub mod sqlite;

pub use sqlite::SqliteMirror;

use crate::{address::Address, error::ArcIdResult};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Mirror copy of an identity
#[derive(Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityRecord {
    pub address: Address,
    pub verified: bool,
    pub credit_score: u16,
    /// `0x`-prefixed hex digest
    pub data_hash: String,
    #[serde(rename = "metadataURI")]
    pub metadata_uri: String,
    pub issued_at: Option<DateTime<Utc>>,
    pub email: Option<String>,
    pub country: Option<String>,
    pub provider: Option<String>,
    /// Set by the store on every write
    pub updated_at: Option<DateTime<Utc>>,
}

impl fmt::Debug for IdentityRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityRecord")
            .field("address", &self.address)
            .field("verified", &self.verified)
            .field("credit_score", &self.credit_score)
            .field("data_hash", &self.data_hash)
            .field("metadata_uri", &self.metadata_uri)
            .field("issued_at", &self.issued_at)
            .field("email", &self.email.as_ref().map(|_| "<redacted>"))
            .field("country", &self.country.as_ref().map(|_| "<redacted>"))
            .field("provider", &self.provider)
            .field("updated_at", &self.updated_at)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Completed,
    Pending,
}

impl EventStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            EventStatus::Completed => "completed",
            EventStatus::Pending => "pending",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "completed" => Some(EventStatus::Completed),
            "pending" => Some(EventStatus::Pending),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationType {
    Mint,
    Update,
    Reverify,
}

impl VerificationType {
    pub fn as_str(self) -> &'static str {
        match self {
            VerificationType::Mint => "mint",
            VerificationType::Update => "update",
            VerificationType::Reverify => "reverify",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "mint" => Some(VerificationType::Mint),
            "update" => Some(VerificationType::Update),
            "reverify" => Some(VerificationType::Reverify),
            _ => None,
        }
    }
}

/// One entry of the append-only verification log
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationEvent {
    pub id: i64,
    pub address: Address,
    pub provider: String,
    pub status: EventStatus,
    #[serde(rename = "type")]
    pub verification_type: VerificationType,
    pub verified_at: DateTime<Utc>,
}

/// A dApp the address has authorized
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectedDApp {
    pub address: Address,
    pub dapp_name: String,
    pub dapp_url: String,
    pub connected_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Mirror store operations
#[async_trait]
pub trait MirrorStore: Send + Sync {
    /// Insert or replace an identity; `None` annotations keep stored values
    async fn upsert_identity(&self, record: &IdentityRecord) -> ArcIdResult<()>;

    /// Replace only the data hash; returns false when no row exists
    async fn update_hash(&self, address: &Address, data_hash: &str) -> ArcIdResult<bool>;

    /// Replace only the verified flag; returns false when no row exists
    async fn set_verified(&self, address: &Address, verified: bool) -> ArcIdResult<bool>;

    async fn get_identity(&self, address: &Address) -> ArcIdResult<Option<IdentityRecord>>;

    async fn append_event(
        &self,
        address: &Address,
        provider: &str,
        status: EventStatus,
        verification_type: VerificationType,
    ) -> ArcIdResult<VerificationEvent>;

    /// Events for an address, newest first
    async fn list_events(&self, address: &Address) -> ArcIdResult<Vec<VerificationEvent>>;

    /// Authorize a dApp; re-authorization updates the URL in place
    async fn upsert_connected_dapp(
        &self,
        address: &Address,
        dapp_name: &str,
        dapp_url: &str,
    ) -> ArcIdResult<ConnectedDApp>;

    async fn list_connected_dapps(&self, address: &Address) -> ArcIdResult<Vec<ConnectedDApp>>;
}

/// RFC 3339 with fixed microsecond precision, so text order is time order
pub fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}
