/// Stand-alone proof adjudication
use crate::{
    api::{extract::JsonBody, Success},
    context::AppContext,
    error::ArcIdResult,
    proof::{Proof, ProofVerdict},
};
use axum::{extract::State, routing::post, Json, Router};

/// POST /api/proof/verify
///
/// Body is the proof itself. A negative or unreachable verifier is an
/// error response, never `verified: false`.
pub async fn verify_proof(
    State(ctx): State<AppContext>,
    JsonBody(proof): JsonBody<Proof>,
) -> ArcIdResult<Json<Success<ProofVerdict>>> {
    let verdict = ctx.orchestrator.verify_proof(&proof).await?;
    Ok(Json(Success::new(verdict)))
}

pub fn routes() -> Router<AppContext> {
    Router::new().route("/api/proof/verify", post(verify_proof))
}
