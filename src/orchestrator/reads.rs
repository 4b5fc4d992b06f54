/// Read workflows
///
/// Authoritative fields always come from the registry. The identity fetch
/// also repairs a mirror that fell behind, e.g. after a crash between
/// ledger confirmation and the mirror write.
use super::{mirror_error, IdentityOrchestrator};
use crate::{
    address::Address,
    error::{ArcIdError, ArcIdResult},
    hashing::digest_to_hex,
    ledger::OnChainIdentity,
    mirror::{ConnectedDApp, IdentityRecord, VerificationEvent},
    orchestrator::{CreditScoreView, IdentityView},
    proof::{Proof, ProofVerdict},
    scoring,
};
use tracing::{debug, warn};

fn not_found(address: &Address) -> ArcIdError {
    ArcIdError::NotFound(format!("No record found for address {}", address))
}

/// Whether the mirror row disagrees with the ledger on any authoritative field
fn is_stale(mirror: Option<&IdentityRecord>, ledger: &OnChainIdentity) -> bool {
    match mirror {
        None => true,
        Some(record) => {
            record.verified != ledger.verified
                || record.credit_score != ledger.credit_score
                || record.data_hash != digest_to_hex(&ledger.data_hash)
                || record.metadata_uri != ledger.metadata_uri
        }
    }
}

impl IdentityOrchestrator {
    /// Ledger identity merged with mirror annotations
    pub async fn fetch_identity(&self, address: &Address) -> ArcIdResult<IdentityView> {
        let on_chain = self
            .ledger
            .get_identity_data(address)
            .await?
            .ok_or_else(|| not_found(address))?;

        let mirrored = match self.mirror.get_identity(address).await {
            Ok(record) => record,
            Err(e) => {
                warn!(address = %address, error = %e, "Mirror read failed, serving ledger fields only");
                None
            }
        };

        let mut reconciled = false;
        if is_stale(mirrored.as_ref(), &on_chain) {
            let record = IdentityRecord {
                address: address.clone(),
                verified: on_chain.verified,
                credit_score: on_chain.credit_score,
                data_hash: digest_to_hex(&on_chain.data_hash),
                metadata_uri: on_chain.metadata_uri.clone(),
                issued_at: Some(on_chain.issued_at),
                email: None,
                country: None,
                provider: None,
                updated_at: None,
            };
            match self.mirror.upsert_identity(&record).await {
                Ok(()) => {
                    debug!(address = %address, "Mirror reconciled from ledger");
                    reconciled = true;
                }
                Err(e) => warn!(address = %address, error = %e, "Mirror reconciliation failed"),
            }
        }

        let (email, country, provider, updated_at) = match mirrored {
            Some(record) => (record.email, record.country, record.provider, record.updated_at),
            None => (None, None, None, None),
        };

        Ok(IdentityView {
            address: address.clone(),
            verified: on_chain.verified,
            credit_score: on_chain.credit_score,
            data_hash: digest_to_hex(&on_chain.data_hash),
            gateway_url: self.publisher.gateway_url(&on_chain.metadata_uri),
            metadata_uri: on_chain.metadata_uri,
            issued_at: on_chain.issued_at,
            email,
            country,
            provider,
            updated_at,
            reconciled,
        })
    }

    pub async fn is_verified(&self, address: &Address) -> ArcIdResult<bool> {
        self.ledger.is_verified(address).await
    }

    pub async fn credit_score(&self, address: &Address) -> ArcIdResult<CreditScoreView> {
        let identity = self
            .ledger
            .get_identity_data(address)
            .await?
            .ok_or_else(|| not_found(address))?;

        Ok(CreditScoreView {
            address: address.clone(),
            credit_score: identity.credit_score,
            rating: scoring::rating(identity.credit_score),
            issued_at: identity.issued_at,
        })
    }

    /// Verification events, newest first
    pub async fn history(&self, address: &Address) -> ArcIdResult<Vec<VerificationEvent>> {
        self.mirror.list_events(address).await.map_err(mirror_error)
    }

    pub async fn connected_dapps(&self, address: &Address) -> ArcIdResult<Vec<ConnectedDApp>> {
        self.mirror
            .list_connected_dapps(address)
            .await
            .map_err(mirror_error)
    }

    /// Stand-alone proof adjudication
    pub async fn verify_proof(&self, proof: &Proof) -> ArcIdResult<ProofVerdict> {
        self.verifier.verify(proof).await
    }
}
