/// ArcID identity endpoints
///
/// Mutating workflows run on a detached task: once the request is accepted
/// the workflow finishes even if the client disconnects, so a confirmed
/// registry write is never left without its mirror follow-up.
use crate::{
    address::Address,
    api::{
        extract::{AddressPath, JsonBody},
        Success,
    },
    auth::RevokeAuthorized,
    context::AppContext,
    error::{ArcIdError, ArcIdResult},
    mirror::{ConnectedDApp, VerificationEvent},
    orchestrator::{
        CreditScoreView, DAppVerifyBody, DAppVerifyRequest, IdentityView, MintBody, MintOutcome,
        MintRequest, RevokeBody, RevokeOutcome, UpdateBody, UpdateOutcome, UpdateRequest,
    },
};
use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::future::Future;

async fn run_detached<T, F>(workflow: F) -> ArcIdResult<T>
where
    F: Future<Output = ArcIdResult<T>> + Send + 'static,
    T: Send + 'static,
{
    tokio::spawn(workflow)
        .await
        .map_err(|e| ArcIdError::Internal(format!("Workflow task failed: {}", e)))?
}

/// POST /api/arcid/mint
pub async fn mint(
    State(ctx): State<AppContext>,
    JsonBody(body): JsonBody<MintBody>,
) -> ArcIdResult<Json<Success<MintOutcome>>> {
    let request = MintRequest::try_from(body)?;
    let orchestrator = ctx.orchestrator.clone();

    let outcome = run_detached(async move { orchestrator.mint(request).await }).await?;

    Ok(Json(Success::new(outcome)))
}

/// POST /api/arcid/update
pub async fn update(
    State(ctx): State<AppContext>,
    JsonBody(body): JsonBody<UpdateBody>,
) -> ArcIdResult<Json<Success<UpdateOutcome>>> {
    let request = UpdateRequest::try_from(body)?;
    let orchestrator = ctx.orchestrator.clone();

    let outcome = run_detached(async move { orchestrator.update(request).await }).await?;

    Ok(Json(Success::new(outcome)))
}

/// POST /api/arcid/revoke
pub async fn revoke(
    State(ctx): State<AppContext>,
    RevokeAuthorized(authorization): RevokeAuthorized,
    JsonBody(body): JsonBody<RevokeBody>,
) -> ArcIdResult<Json<Success<RevokeOutcome>>> {
    let address = Address::try_from(body)?;
    let orchestrator = ctx.orchestrator.clone();

    let outcome =
        run_detached(async move { orchestrator.revoke(&authorization, address).await }).await?;

    Ok(Json(Success::new(outcome)))
}

#[derive(Debug, Serialize)]
pub struct DAppRef {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyIdentityResponse {
    pub workflow_id: uuid::Uuid,
    pub verified: bool,
    pub address: Address,
    pub credit_score: u16,
    #[serde(rename = "metadataURI")]
    pub metadata_uri: String,
    pub dapp: DAppRef,
}

/// POST /api/arcid/verify-identity
pub async fn verify_identity(
    State(ctx): State<AppContext>,
    JsonBody(body): JsonBody<DAppVerifyBody>,
) -> ArcIdResult<Json<Success<VerifyIdentityResponse>>> {
    let request = DAppVerifyRequest::try_from(body)?;
    let orchestrator = ctx.orchestrator.clone();

    let outcome = run_detached(async move { orchestrator.verify_for_dapp(request).await }).await?;

    Ok(Json(Success::new(VerifyIdentityResponse {
        workflow_id: outcome.workflow_id,
        verified: outcome.verified,
        address: outcome.address,
        credit_score: outcome.credit_score,
        metadata_uri: outcome.metadata_uri,
        dapp: DAppRef {
            name: outcome.dapp.dapp_name,
            url: outcome.dapp.dapp_url,
        },
    })))
}

/// GET /api/arcid/identity/:address
pub async fn get_identity(
    State(ctx): State<AppContext>,
    AddressPath(address): AddressPath,
) -> ArcIdResult<Json<Success<IdentityView>>> {
    let view = ctx.orchestrator.fetch_identity(&address).await?;
    Ok(Json(Success::new(view)))
}

#[derive(Debug, Serialize)]
pub struct IsVerifiedResponse {
    pub address: Address,
    pub verified: bool,
}

/// GET /api/arcid/isVerified/:address
pub async fn is_verified(
    State(ctx): State<AppContext>,
    AddressPath(address): AddressPath,
) -> ArcIdResult<Json<Success<IsVerifiedResponse>>> {
    let verified = ctx.orchestrator.is_verified(&address).await?;
    Ok(Json(Success::new(IsVerifiedResponse { address, verified })))
}

/// GET /api/arcid/creditScore/:address
pub async fn credit_score(
    State(ctx): State<AppContext>,
    AddressPath(address): AddressPath,
) -> ArcIdResult<Json<Success<CreditScoreView>>> {
    let view = ctx.orchestrator.credit_score(&address).await?;
    Ok(Json(Success::new(view)))
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub events: Vec<VerificationEvent>,
}

/// GET /api/arcid/history/:address
pub async fn history(
    State(ctx): State<AppContext>,
    AddressPath(address): AddressPath,
) -> ArcIdResult<Json<Success<HistoryResponse>>> {
    let events = ctx.orchestrator.history(&address).await?;
    Ok(Json(Success::new(HistoryResponse { events })))
}

#[derive(Debug, Serialize)]
pub struct ConnectedDAppsResponse {
    pub data: Vec<ConnectedDApp>,
}

/// GET /api/arcid/connected-dapps/:address
pub async fn connected_dapps(
    State(ctx): State<AppContext>,
    AddressPath(address): AddressPath,
) -> ArcIdResult<Json<Success<ConnectedDAppsResponse>>> {
    let data = ctx.orchestrator.connected_dapps(&address).await?;
    Ok(Json(Success::new(ConnectedDAppsResponse { data })))
}

/// Build identity routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/arcid/mint", post(mint))
        .route("/api/arcid/update", post(update))
        .route("/api/arcid/revoke", post(revoke))
        .route("/api/arcid/verify-identity", post(verify_identity))
        .route("/api/arcid/identity/:address", get(get_identity))
        .route("/api/arcid/isVerified/:address", get(is_verified))
        .route("/api/arcid/creditScore/:address", get(credit_score))
        .route("/api/arcid/history/:address", get(history))
        .route("/api/arcid/connected-dapps/:address", get(connected_dapps))
}
