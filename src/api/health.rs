/// Health check endpoints
///
/// Liveness answers as long as the process serves requests; readiness also
/// requires the mirror database to respond.
use crate::{context::AppContext, db};
use axum::{extract::State, http::StatusCode, response::Json, routing::get, Router};
use serde_json::{json, Value};

/// Build health check routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/health", get(health_basic))
        .route("/health/ready", get(readiness_probe))
}

/// Returns simple JSON with status and version
pub async fn health_basic() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Readiness probe
pub async fn readiness_probe(State(ctx): State<AppContext>) -> Result<Json<Value>, StatusCode> {
    if let Err(e) = db::test_connection(&ctx.mirror_db).await {
        tracing::warn!(error = %e, "readiness_probe_failed: mirror database check failed");
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    }

    Ok(Json(json!({
        "status": "ready",
        "version": env!("CARGO_PKG_VERSION"),
        "pool_size": ctx.mirror_db.size(),
    })))
}
