/// Authentication extractors
use crate::{
    api::API_KEY_HEADER, context::AppContext, error::ArcIdError,
    orchestrator::RevokeAuthorization,
};
use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

/// Proof that the caller presented the privileged API key
///
/// Extracted from the request head, so the check runs before the body is
/// parsed and before any collaborator is contacted.
#[derive(Debug)]
pub struct RevokeAuthorized(pub RevokeAuthorization);

#[async_trait]
impl FromRequestParts<AppContext> for RevokeAuthorized {
    type Rejection = ArcIdError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        let presented = parts
            .headers
            .get(API_KEY_HEADER)
            .and_then(|h| h.to_str().ok());

        let authorization = state.orchestrator.authorize_revoke(presented)?;

        Ok(RevokeAuthorized(authorization))
    }
}
