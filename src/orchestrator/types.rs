/// Workflow requests and outcomes
///
/// Wire bodies carry loosely typed optional fields; each is converted once,
/// with `TryFrom`, into a request whose shape already rules out the invalid
/// combinations.
use crate::{
    address::Address,
    error::{ArcIdError, ArcIdResult},
    mirror::ConnectedDApp,
    proof::{Proof, VerificationLevel},
    scoring::KycAttributes,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

fn required(field: Option<String>, name: &str) -> ArcIdResult<String> {
    field
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ArcIdError::Validation(format!("{} is required", name)))
}

fn required_address(field: Option<String>, name: &str) -> ArcIdResult<Address> {
    Address::parse(&required(field, name)?)
}

// ---------------------------------------------------------------------------
// Mint
// ---------------------------------------------------------------------------

/// `POST /api/arcid/mint` body
#[derive(Debug, Default, Deserialize)]
pub struct MintBody {
    pub address: Option<String>,
    pub email: Option<String>,
    pub country: Option<String>,
    pub proof: Option<Proof>,
}

#[derive(Debug, Clone)]
pub struct MintRequest {
    pub address: Address,
    pub attributes: KycAttributes,
    pub proof: Proof,
}

impl TryFrom<MintBody> for MintRequest {
    type Error = ArcIdError;

    fn try_from(body: MintBody) -> ArcIdResult<Self> {
        let address = required_address(body.address, "address")?;
        let email = required(body.email, "email")?;
        let country = required(body.country, "country")?;
        let proof = body
            .proof
            .ok_or_else(|| ArcIdError::Validation("proof is required".to_string()))?;

        Ok(Self {
            address,
            attributes: KycAttributes::new(email, country),
            proof,
        })
    }
}

// ---------------------------------------------------------------------------
// Update / reverify
// ---------------------------------------------------------------------------

/// `POST /api/arcid/update` body
#[derive(Debug, Default, Deserialize)]
pub struct UpdateBody {
    pub address: Option<String>,
    #[serde(default)]
    pub reverify: bool,
    pub email: Option<String>,
    pub country: Option<String>,
    pub proof: Option<Proof>,
    pub payload: Option<Value>,
}

/// The two mutually exclusive update modes
#[derive(Debug, Clone)]
pub enum UpdateMode {
    /// Fresh attributes and proof: re-verify, re-score, re-publish
    Reverify {
        attributes: KycAttributes,
        proof: Proof,
    },
    /// Caller-supplied payload hashed directly; URI, score and flag unchanged
    Payload { payload: Value },
}

#[derive(Debug, Clone)]
pub struct UpdateRequest {
    pub address: Address,
    pub mode: UpdateMode,
}

impl TryFrom<UpdateBody> for UpdateRequest {
    type Error = ArcIdError;

    fn try_from(body: UpdateBody) -> ArcIdResult<Self> {
        let address = required_address(body.address, "address")?;
        let payload = body.payload.filter(|p| !p.is_null());

        let mode = match (body.reverify, payload) {
            (true, Some(_)) => {
                return Err(ArcIdError::Validation(
                    "reverify and payload are mutually exclusive".to_string(),
                ))
            }
            (false, None) => {
                return Err(ArcIdError::Validation(
                    "either reverify or payload is required".to_string(),
                ))
            }
            (true, None) => UpdateMode::Reverify {
                attributes: KycAttributes::new(
                    required(body.email, "email")?,
                    required(body.country, "country")?,
                ),
                proof: body.proof.ok_or_else(|| {
                    ArcIdError::Validation("proof is required to reverify".to_string())
                })?,
            },
            (false, Some(payload)) => UpdateMode::Payload { payload },
        };

        Ok(Self { address, mode })
    }
}

// ---------------------------------------------------------------------------
// Revoke
// ---------------------------------------------------------------------------

/// `POST /api/arcid/revoke` body
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevokeBody {
    pub user_address: Option<String>,
}

impl TryFrom<RevokeBody> for Address {
    type Error = ArcIdError;

    fn try_from(body: RevokeBody) -> ArcIdResult<Self> {
        required_address(body.user_address, "userAddress")
    }
}

/// Proof that the caller presented the revoke secret
///
/// Only `IdentityOrchestrator::authorize_revoke` constructs one.
#[derive(Debug)]
pub struct RevokeAuthorization {
    pub(super) _private: (),
}

// ---------------------------------------------------------------------------
// Verify for dApp
// ---------------------------------------------------------------------------

/// `POST /api/arcid/verify-identity` body
#[derive(Debug, Default, Deserialize)]
pub struct DAppVerifyBody {
    pub address: Option<String>,
    pub signature: Option<String>,
    pub message: Option<String>,
    pub dapp_name: Option<String>,
    pub dapp_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DAppVerifyRequest {
    pub address: Address,
    pub signature: String,
    pub message: String,
    pub dapp_name: String,
    pub dapp_url: String,
}

impl TryFrom<DAppVerifyBody> for DAppVerifyRequest {
    type Error = ArcIdError;

    fn try_from(body: DAppVerifyBody) -> ArcIdResult<Self> {
        // The signed message is taken verbatim; trimming would change the digest.
        let message = body
            .message
            .filter(|m| !m.is_empty())
            .ok_or_else(|| ArcIdError::Validation("message is required".to_string()))?;

        Ok(Self {
            address: required_address(body.address, "address")?,
            signature: required(body.signature, "signature")?,
            message,
            dapp_name: required(body.dapp_name, "dapp_name")?,
            dapp_url: required(body.dapp_url, "dapp_url")?,
        })
    }
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// Mirror write that failed after the ledger had already confirmed
///
/// Carried on the outcome and logged; never turned into a request failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsistencyWarning {
    pub workflow_id: Uuid,
    pub address: Address,
    pub step: &'static str,
    pub detail: String,
}

/// Metadata document published for an identity; holds no raw PII
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityMetadata {
    pub address: Address,
    pub country: String,
    pub credit_score: u16,
    /// `buildHash(lowercased email, salt)`
    pub email_commitment: String,
    pub issued_at: String,
    pub kyc_provider: String,
    pub verification_level: VerificationLevel,
    pub verified: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MintOutcome {
    pub workflow_id: Uuid,
    pub address: Address,
    pub credit_score: u16,
    pub data_hash: String,
    #[serde(rename = "metadataURI")]
    pub metadata_uri: String,
    pub gateway_url: Option<String>,
    pub transaction_hash: String,
    pub block_number: u64,
    pub issued_at: DateTime<Utc>,
    pub warnings: Vec<ConsistencyWarning>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateOutcome {
    pub workflow_id: Uuid,
    pub address: Address,
    pub reverified: bool,
    pub verified: bool,
    pub credit_score: u16,
    pub data_hash: String,
    #[serde(rename = "metadataURI")]
    pub metadata_uri: String,
    pub gateway_url: Option<String>,
    pub transaction_hash: String,
    pub block_number: u64,
    pub warnings: Vec<ConsistencyWarning>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RevokeOutcome {
    pub workflow_id: Uuid,
    pub address: Address,
    pub transaction_hash: String,
    pub block_number: u64,
    pub warnings: Vec<ConsistencyWarning>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DAppVerifyOutcome {
    pub workflow_id: Uuid,
    pub address: Address,
    pub verified: bool,
    pub credit_score: u16,
    #[serde(rename = "metadataURI")]
    pub metadata_uri: String,
    pub dapp: ConnectedDApp,
}

/// Identity as served by the fetch endpoint: ledger fields plus mirror annotations
#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityView {
    pub address: Address,
    pub verified: bool,
    pub credit_score: u16,
    pub data_hash: String,
    #[serde(rename = "metadataURI")]
    pub metadata_uri: String,
    pub gateway_url: Option<String>,
    pub issued_at: DateTime<Utc>,
    pub email: Option<String>,
    pub country: Option<String>,
    pub provider: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
    /// Whether the mirror was behind the ledger and got rewritten
    pub reconciled: bool,
}

impl std::fmt::Debug for IdentityView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityView")
            .field("address", &self.address)
            .field("verified", &self.verified)
            .field("credit_score", &self.credit_score)
            .field("metadata_uri", &self.metadata_uri)
            .field("reconciled", &self.reconciled)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditScoreView {
    pub address: Address,
    pub credit_score: u16,
    pub rating: crate::scoring::Rating,
    pub issued_at: DateTime<Utc>,
}
