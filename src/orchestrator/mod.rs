/// Identity workflows
///
/// Composes the proof verifier, scorer, metadata publisher, registry and
/// mirror into the mint, update, revoke and dApp-verification workflows.
/// The registry write is the commit point: anything that fails before it
/// aborts the workflow, and mirror failures after it are downgraded to
/// `ConsistencyWarning`s.

mod reads;
pub mod types;

pub use types::{
    ConsistencyWarning, CreditScoreView, DAppVerifyBody, DAppVerifyOutcome, DAppVerifyRequest,
    IdentityMetadata, IdentityView, MintBody, MintOutcome, MintRequest, RevokeAuthorization,
    RevokeBody, RevokeOutcome, UpdateBody, UpdateMode, UpdateOutcome, UpdateRequest,
};

use crate::{
    address::Address,
    content_store::MetadataPublisher,
    crypto::recover_personal_signer,
    error::{ArcIdError, ArcIdResult, UpstreamService},
    hashing::{build_data_hash, digest_to_hex, hash_text},
    ledger::{IdentityLedger, IdentityWrite, OnChainIdentity},
    mirror::{EventStatus, IdentityRecord, MirrorStore, VerificationType},
    proof::{Proof, ProofVerifier},
    scoring::{self, KycAttributes},
};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Per-request workflow position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStage {
    Received,
    SignerRecovered,
    ProofVerified,
    Scored,
    Published,
    Hashed,
    LedgerConfirmed,
    Mirrored,
    Done,
    Failed,
}

impl WorkflowStage {
    pub fn is_terminal(self) -> bool {
        matches!(self, WorkflowStage::Done | WorkflowStage::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowKind {
    Mint,
    Reverify,
    PayloadUpdate,
    Revoke,
    DAppVerify,
}

impl fmt::Display for WorkflowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkflowKind::Mint => "mint",
            WorkflowKind::Reverify => "reverify",
            WorkflowKind::PayloadUpdate => "payload_update",
            WorkflowKind::Revoke => "revoke",
            WorkflowKind::DAppVerify => "dapp_verify",
        };
        f.write_str(name)
    }
}

/// Tracks one workflow instance and logs its stage transitions
struct Workflow {
    id: Uuid,
    kind: WorkflowKind,
    address: Address,
    stage: WorkflowStage,
    warnings: Vec<ConsistencyWarning>,
}

impl Workflow {
    fn start(kind: WorkflowKind, address: &Address) -> Self {
        let id = Uuid::new_v4();
        debug!(workflow_id = %id, workflow = %kind, address = %address, "Workflow received");
        Self {
            id,
            kind,
            address: address.clone(),
            stage: WorkflowStage::Received,
            warnings: Vec::new(),
        }
    }

    fn advance(&mut self, stage: WorkflowStage) {
        debug!(
            workflow_id = %self.id,
            workflow = %self.kind,
            from = ?self.stage,
            to = ?stage,
            "Workflow stage"
        );
        self.stage = stage;
    }

    /// Pass a step result through, moving to `Failed` on error
    fn check<T>(&mut self, result: ArcIdResult<T>) -> ArcIdResult<T> {
        if let Err(e) = &result {
            warn!(
                workflow_id = %self.id,
                workflow = %self.kind,
                address = %self.address,
                stage = ?self.stage,
                error_kind = e.kind(),
                error = %e,
                "Workflow failed"
            );
            self.stage = WorkflowStage::Failed;
        }
        result
    }

    fn fail<T>(&mut self, error: ArcIdError) -> ArcIdResult<T> {
        self.check(Err(error))
    }

    /// Record a post-commit mirror failure without failing the workflow
    fn mirror_step(&mut self, step: &'static str, result: ArcIdResult<()>) {
        if let Err(e) = result {
            warn!(
                workflow_id = %self.id,
                workflow = %self.kind,
                address = %self.address,
                step,
                error = %e,
                "Mirror write failed after ledger confirmation; mirror is stale until next read"
            );
            self.warnings.push(ConsistencyWarning {
                workflow_id: self.id,
                address: self.address.clone(),
                step,
                detail: e.to_string(),
            });
        }
    }

    /// Close out the mirror phase and the workflow
    fn finish(&mut self) -> Vec<ConsistencyWarning> {
        if self.warnings.is_empty() {
            self.advance(WorkflowStage::Mirrored);
        }
        self.advance(WorkflowStage::Done);
        info!(
            workflow_id = %self.id,
            workflow = %self.kind,
            address = %self.address,
            warnings = self.warnings.len(),
            "Workflow completed"
        );
        std::mem::take(&mut self.warnings)
    }
}

/// Deployment settings the workflows need
#[derive(Clone)]
pub struct OrchestratorConfig {
    pub hash_salt: String,
    pub kyc_provider: String,
    /// Shared secret required for revoke
    pub revoke_secret: String,
}

impl fmt::Debug for OrchestratorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrchestratorConfig")
            .field("hash_salt", &"<redacted>")
            .field("kyc_provider", &self.kyc_provider)
            .field("revoke_secret", &"<redacted>")
            .finish()
    }
}

/// Runs identity workflows against the injected collaborators
pub struct IdentityOrchestrator {
    verifier: Arc<dyn ProofVerifier>,
    publisher: MetadataPublisher,
    ledger: Arc<dyn IdentityLedger>,
    mirror: Arc<dyn MirrorStore>,
    config: OrchestratorConfig,
}

fn mirror_error(e: ArcIdError) -> ArcIdError {
    match e {
        ArcIdError::Upstream { .. } => e,
        other => ArcIdError::upstream(UpstreamService::Mirror, other.to_string()),
    }
}

/// Byte comparison whose running time does not depend on where inputs differ
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

impl IdentityOrchestrator {
    pub fn new(
        verifier: Arc<dyn ProofVerifier>,
        publisher: MetadataPublisher,
        ledger: Arc<dyn IdentityLedger>,
        mirror: Arc<dyn MirrorStore>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            verifier,
            publisher,
            ledger,
            mirror,
            config,
        }
    }

    fn build_metadata(
        &self,
        address: &Address,
        attributes: &KycAttributes,
        proof: &Proof,
        credit_score: u16,
        issued_at: &DateTime<Utc>,
    ) -> IdentityMetadata {
        let email = attributes.email().unwrap_or_default().to_lowercase();
        IdentityMetadata {
            address: address.clone(),
            country: attributes.country().unwrap_or_default().to_string(),
            credit_score,
            email_commitment: digest_to_hex(&hash_text(&email, &self.config.hash_salt)),
            issued_at: issued_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            kyc_provider: self.config.kyc_provider.clone(),
            verification_level: proof.verification_level,
            verified: true,
        }
    }

    /// Verify, score, publish and hash; everything before the ledger write
    /// that mint and reverify share
    async fn prepare_write(
        &self,
        wf: &mut Workflow,
        attributes: &KycAttributes,
        proof: &Proof,
        issued_at: &DateTime<Utc>,
    ) -> ArcIdResult<(IdentityWrite, Option<String>)> {
        let verdict = wf.check(self.verifier.verify(proof).await)?;
        if !verdict.verified {
            return wf.fail(ArcIdError::upstream(
                UpstreamService::Verifier,
                "proof not verified",
            ));
        }
        wf.advance(WorkflowStage::ProofVerified);

        let credit_score = scoring::derive(attributes, Some(proof));
        wf.advance(WorkflowStage::Scored);

        let metadata = self.build_metadata(&wf.address, attributes, proof, credit_score, issued_at);
        let published = wf.check(self.publisher.publish(&metadata).await)?;
        wf.advance(WorkflowStage::Published);

        let data_hash = hash_text(&published.uri, &self.config.hash_salt);
        wf.advance(WorkflowStage::Hashed);

        Ok((
            IdentityWrite {
                data_hash,
                metadata_uri: published.uri,
                credit_score,
            },
            published.gateway_url,
        ))
    }

    /// Issue a new identity
    pub async fn mint(&self, request: MintRequest) -> ArcIdResult<MintOutcome> {
        let MintRequest {
            address,
            attributes,
            proof,
        } = request;
        let mut wf = Workflow::start(WorkflowKind::Mint, &address);

        let existing = wf.check(self.ledger.get_identity_data(&address).await)?;
        if existing.is_some() {
            return wf.fail(ArcIdError::Validation(
                "Address already holds an ArcID; use reverify to refresh it".to_string(),
            ));
        }

        let issued_at = Utc::now();
        let (write, gateway_url) = self
            .prepare_write(&mut wf, &attributes, &proof, &issued_at)
            .await?;

        let confirmation = wf.check(self.ledger.mint_identity(&address, &write).await)?;
        wf.advance(WorkflowStage::LedgerConfirmed);

        let record = IdentityRecord {
            address: address.clone(),
            verified: true,
            credit_score: write.credit_score,
            data_hash: digest_to_hex(&write.data_hash),
            metadata_uri: write.metadata_uri.clone(),
            issued_at: Some(issued_at),
            email: attributes.email().map(str::to_string),
            country: attributes.country().map(str::to_string),
            provider: Some(self.config.kyc_provider.clone()),
            updated_at: None,
        };
        wf.mirror_step("upsert_identity", self.mirror.upsert_identity(&record).await);
        wf.mirror_step(
            "append_event",
            self.append_event(&address, VerificationType::Mint).await,
        );
        let warnings = wf.finish();

        Ok(MintOutcome {
            workflow_id: wf.id,
            address,
            credit_score: write.credit_score,
            data_hash: record.data_hash,
            metadata_uri: write.metadata_uri,
            gateway_url,
            transaction_hash: confirmation.tx_hash,
            block_number: confirmation.block_number,
            issued_at,
            warnings,
        })
    }

    /// Refresh or re-hash an existing identity
    pub async fn update(&self, request: UpdateRequest) -> ArcIdResult<UpdateOutcome> {
        let UpdateRequest { address, mode } = request;
        match mode {
            UpdateMode::Reverify { attributes, proof } => {
                self.reverify(address, attributes, proof).await
            }
            UpdateMode::Payload { payload } => self.update_payload(address, payload).await,
        }
    }

    async fn current_identity(
        &self,
        wf: &mut Workflow,
        address: &Address,
    ) -> ArcIdResult<OnChainIdentity> {
        match wf.check(self.ledger.get_identity_data(address).await)? {
            Some(identity) => Ok(identity),
            None => wf.fail(ArcIdError::NotFound(format!(
                "No ArcID found for address {}",
                address
            ))),
        }
    }

    async fn reverify(
        &self,
        address: Address,
        attributes: KycAttributes,
        proof: Proof,
    ) -> ArcIdResult<UpdateOutcome> {
        let mut wf = Workflow::start(WorkflowKind::Reverify, &address);
        let current = self.current_identity(&mut wf, &address).await?;

        let refreshed_at = Utc::now();
        let (write, gateway_url) = self
            .prepare_write(&mut wf, &attributes, &proof, &refreshed_at)
            .await?;

        let confirmation = wf.check(self.ledger.update_identity(&address, &write, true).await)?;
        wf.advance(WorkflowStage::LedgerConfirmed);

        let record = IdentityRecord {
            address: address.clone(),
            verified: true,
            credit_score: write.credit_score,
            data_hash: digest_to_hex(&write.data_hash),
            metadata_uri: write.metadata_uri.clone(),
            issued_at: Some(current.issued_at),
            email: attributes.email().map(str::to_string),
            country: attributes.country().map(str::to_string),
            provider: Some(self.config.kyc_provider.clone()),
            updated_at: None,
        };
        wf.mirror_step("upsert_identity", self.mirror.upsert_identity(&record).await);
        wf.mirror_step(
            "append_event",
            self.append_event(&address, VerificationType::Reverify).await,
        );
        let warnings = wf.finish();

        Ok(UpdateOutcome {
            workflow_id: wf.id,
            address,
            reverified: true,
            verified: true,
            credit_score: write.credit_score,
            data_hash: record.data_hash,
            metadata_uri: write.metadata_uri,
            gateway_url,
            transaction_hash: confirmation.tx_hash,
            block_number: confirmation.block_number,
            warnings,
        })
    }

    async fn update_payload(
        &self,
        address: Address,
        payload: serde_json::Value,
    ) -> ArcIdResult<UpdateOutcome> {
        let mut wf = Workflow::start(WorkflowKind::PayloadUpdate, &address);
        let current = self.current_identity(&mut wf, &address).await?;

        let data_hash = wf.check(build_data_hash(&payload, &self.config.hash_salt))?;
        wf.advance(WorkflowStage::Hashed);

        let write = IdentityWrite {
            data_hash,
            metadata_uri: current.metadata_uri.clone(),
            credit_score: current.credit_score,
        };
        let confirmation = wf.check(
            self.ledger
                .update_identity(&address, &write, current.verified)
                .await,
        )?;
        wf.advance(WorkflowStage::LedgerConfirmed);

        let data_hash_hex = digest_to_hex(&data_hash);
        let mirrored = self.mirror.update_hash(&address, &data_hash_hex).await;
        let mirrored = match mirrored {
            // Mirror never saw this identity; seed it from the ledger
            Ok(false) => {
                let record = IdentityRecord {
                    address: address.clone(),
                    verified: current.verified,
                    credit_score: current.credit_score,
                    data_hash: data_hash_hex.clone(),
                    metadata_uri: current.metadata_uri.clone(),
                    issued_at: Some(current.issued_at),
                    email: None,
                    country: None,
                    provider: None,
                    updated_at: None,
                };
                self.mirror.upsert_identity(&record).await
            }
            Ok(true) => Ok(()),
            Err(e) => Err(e),
        };
        wf.mirror_step("update_hash", mirrored);
        wf.mirror_step(
            "append_event",
            self.append_event(&address, VerificationType::Update).await,
        );
        let warnings = wf.finish();

        Ok(UpdateOutcome {
            workflow_id: wf.id,
            address,
            reverified: false,
            verified: current.verified,
            credit_score: current.credit_score,
            data_hash: data_hash_hex,
            gateway_url: self.publisher.gateway_url(&current.metadata_uri),
            metadata_uri: current.metadata_uri,
            transaction_hash: confirmation.tx_hash,
            block_number: confirmation.block_number,
            warnings,
        })
    }

    /// Whether `presented` matches the configured API key
    pub fn is_privileged_key(&self, presented: &str) -> bool {
        !self.config.revoke_secret.is_empty()
            && constant_time_eq(presented.as_bytes(), self.config.revoke_secret.as_bytes())
    }

    /// Check the revoke shared secret
    pub fn authorize_revoke(&self, presented: Option<&str>) -> ArcIdResult<RevokeAuthorization> {
        let presented = presented
            .ok_or_else(|| ArcIdError::Authentication("Missing API key".to_string()))?;

        if !self.is_privileged_key(presented) {
            warn!("Revoke rejected: invalid API key");
            return Err(ArcIdError::Authentication("Invalid API key".to_string()));
        }

        Ok(RevokeAuthorization { _private: () })
    }

    /// Flip the on-chain verified flag off
    pub async fn revoke(
        &self,
        _authorization: &RevokeAuthorization,
        address: Address,
    ) -> ArcIdResult<RevokeOutcome> {
        let mut wf = Workflow::start(WorkflowKind::Revoke, &address);

        let confirmation = wf.check(self.ledger.revoke_identity(&address).await)?;
        wf.advance(WorkflowStage::LedgerConfirmed);

        let flipped = self
            .mirror
            .set_verified(&address, false)
            .await
            .map(|found| {
                if !found {
                    debug!(address = %address, "Revoked identity has no mirror row");
                }
            });
        wf.mirror_step("set_verified", flipped);
        let warnings = wf.finish();

        Ok(RevokeOutcome {
            workflow_id: wf.id,
            address,
            transaction_hash: confirmation.tx_hash,
            block_number: confirmation.block_number,
            warnings,
        })
    }

    /// Authorize a dApp for a wallet that proves control of a verified identity
    pub async fn verify_for_dapp(&self, request: DAppVerifyRequest) -> ArcIdResult<DAppVerifyOutcome> {
        let DAppVerifyRequest {
            address,
            signature,
            message,
            dapp_name,
            dapp_url,
        } = request;
        let mut wf = Workflow::start(WorkflowKind::DAppVerify, &address);

        let recovered = wf.check(recover_personal_signer(&message, &signature))?;
        if recovered != address {
            return wf.fail(ArcIdError::Authentication("Invalid signature".to_string()));
        }
        wf.advance(WorkflowStage::SignerRecovered);

        let verified = wf.check(self.ledger.is_verified(&address).await)?;
        if !verified {
            return wf.fail(ArcIdError::NotVerified(
                "User does not have a verified ArcID identity".to_string(),
            ));
        }
        let identity = match wf.check(self.ledger.get_identity_data(&address).await)? {
            Some(identity) => identity,
            None => {
                return wf.fail(ArcIdError::NotVerified(
                    "User does not have a verified ArcID identity".to_string(),
                ))
            }
        };

        let dapp = wf.check(
            self.mirror
                .upsert_connected_dapp(&address, &dapp_name, &dapp_url)
                .await
                .map_err(mirror_error),
        )?;
        wf.advance(WorkflowStage::Mirrored);
        wf.advance(WorkflowStage::Done);
        info!(workflow_id = %wf.id, address = %address, dapp = %dapp_name, "dApp authorized");

        Ok(DAppVerifyOutcome {
            workflow_id: wf.id,
            address,
            verified: true,
            credit_score: identity.credit_score,
            metadata_uri: identity.metadata_uri,
            dapp,
        })
    }

    async fn append_event(&self, address: &Address, kind: VerificationType) -> ArcIdResult<()> {
        self.mirror
            .append_event(address, &self.config.kyc_provider, EventStatus::Completed, kind)
            .await
            .map(|_| ())
    }
}
