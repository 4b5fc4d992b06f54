/// Identity registry client
///
/// The registry contract is the authoritative store of identity state.
/// Writes are signed by the single server key and block until confirmed;
/// reads are unauthenticated `eth_call`s.

pub mod abi;
pub mod rlp;
pub mod rpc;
pub mod tx;

pub use rpc::{LedgerClientConfig, RpcLedgerClient};

use crate::{address::Address, error::ArcIdResult, hashing::Digest32};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Authoritative on-chain identity fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OnChainIdentity {
    pub verified: bool,
    pub credit_score: u16,
    #[serde(serialize_with = "serialize_digest")]
    pub data_hash: Digest32,
    #[serde(rename = "metadataURI")]
    pub metadata_uri: String,
    pub issued_at: DateTime<Utc>,
}

fn serialize_digest<S: serde::Serializer>(digest: &Digest32, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&crate::hashing::digest_to_hex(digest))
}

/// Proof that a write landed on-chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TxConfirmation {
    pub tx_hash: String,
    pub block_number: u64,
}

/// Fields written by mint and update
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityWrite {
    pub data_hash: Digest32,
    pub metadata_uri: String,
    pub credit_score: u16,
}

/// Registry operations
#[async_trait]
pub trait IdentityLedger: Send + Sync {
    /// Create the identity for `to`
    async fn mint_identity(&self, to: &Address, write: &IdentityWrite)
        -> ArcIdResult<TxConfirmation>;

    /// Replace hash, URI and score, and set the verified flag
    async fn update_identity(
        &self,
        user: &Address,
        write: &IdentityWrite,
        verified: bool,
    ) -> ArcIdResult<TxConfirmation>;

    /// Flip the verified flag off
    async fn revoke_identity(&self, user: &Address) -> ArcIdResult<TxConfirmation>;

    async fn is_verified(&self, user: &Address) -> ArcIdResult<bool>;

    /// `None` when the address has never been minted
    async fn get_identity_data(&self, user: &Address) -> ArcIdResult<Option<OnChainIdentity>>;
}
