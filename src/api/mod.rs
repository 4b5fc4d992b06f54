/// API routes and handlers
pub mod extract;
pub mod health;
pub mod identity;
pub mod proof;

use crate::context::AppContext;
use axum::Router;
use serde::Serialize;

/// Header carrying the privileged API key
pub const API_KEY_HEADER: &str = "x-api-key";

/// Successful response body: `{"success": true, ...fields}`
#[derive(Debug, Serialize)]
pub struct Success<T: Serialize> {
    pub success: bool,
    #[serde(flatten)]
    pub data: T,
}

impl<T: Serialize> Success<T> {
    pub fn new(data: T) -> Self {
        Self { success: true, data }
    }
}

/// Build API routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .merge(health::routes())
        .merge(identity::routes())
        .merge(proof::routes())
}
