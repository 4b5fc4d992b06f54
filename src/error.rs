/// Unified error types for the ArcID service
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// External collaborator that produced an upstream failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpstreamService {
    Verifier,
    ContentStore,
    Ledger,
    Mirror,
}

impl fmt::Display for UpstreamService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UpstreamService::Verifier => "proof verifier",
            UpstreamService::ContentStore => "content store",
            UpstreamService::Ledger => "identity ledger",
            UpstreamService::Mirror => "mirror store",
        };
        f.write_str(name)
    }
}

/// Main error type for the service
#[derive(Error, Debug)]
pub enum ArcIdError {
    /// Malformed or missing request fields
    #[error("Validation error: {0}")]
    Validation(String),

    /// Signature or shared-secret mismatch
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Address holds no verified identity
    #[error("Not verified: {0}")]
    NotVerified(String),

    /// No record for the requested address
    #[error("Not found: {0}")]
    NotFound(String),

    /// Verifier, content store or ledger unreachable or negative
    #[error("Upstream error ({service}): {reason}")]
    Upstream {
        service: UpstreamService,
        reason: String,
    },

    /// Rate limiting errors
    #[error("Rate limit exceeded")]
    RateLimitExceeded { retry_after: std::time::Duration },

    /// Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal server errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ArcIdError {
    pub fn upstream(service: UpstreamService, reason: impl Into<String>) -> Self {
        ArcIdError::Upstream {
            service,
            reason: reason.into(),
        }
    }

    /// Short machine-readable kind, safe to log
    pub fn kind(&self) -> &'static str {
        match self {
            ArcIdError::Validation(_) => "validation",
            ArcIdError::Authentication(_) => "authentication",
            ArcIdError::NotVerified(_) => "not_verified",
            ArcIdError::NotFound(_) => "not_found",
            ArcIdError::Upstream { .. } => "upstream",
            ArcIdError::RateLimitExceeded { .. } => "rate_limited",
            ArcIdError::Database(_) => "database",
            ArcIdError::Io(_) => "io",
            ArcIdError::Internal(_) => "internal",
        }
    }
}

/// JSON error response body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl IntoResponse for ArcIdError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match &self {
            ArcIdError::Validation(_) => (
                StatusCode::BAD_REQUEST,
                "InvalidRequest",
                self.to_string(),
            ),
            ArcIdError::Authentication(_) => (
                StatusCode::UNAUTHORIZED,
                "Unauthorized",
                self.to_string(),
            ),
            ArcIdError::NotVerified(_) => (
                StatusCode::FORBIDDEN,
                "NotVerified",
                self.to_string(),
            ),
            ArcIdError::NotFound(_) => (
                StatusCode::NOT_FOUND,
                "NotFound",
                self.to_string(),
            ),
            ArcIdError::Upstream { .. } => (
                StatusCode::BAD_GATEWAY,
                "UpstreamError",
                self.to_string(),
            ),
            ArcIdError::RateLimitExceeded { .. } => (
                StatusCode::TOO_MANY_REQUESTS,
                "RateLimitExceeded",
                "Rate limit exceeded".to_string(),
            ),
            ArcIdError::Database(_) | ArcIdError::Io(_) | ArcIdError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "InternalServerError",
                "Internal server error".to_string(), // Don't leak details
            ),
        };

        let body = Json(ErrorResponse {
            error: error_code.to_string(),
            message,
        });

        (status, body).into_response()
    }
}

/// Result type alias for service operations
pub type ArcIdResult<T> = Result<T, ArcIdError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = vec![
            (ArcIdError::Validation("x".into()), StatusCode::BAD_REQUEST),
            (ArcIdError::Authentication("x".into()), StatusCode::UNAUTHORIZED),
            (ArcIdError::NotVerified("x".into()), StatusCode::FORBIDDEN),
            (ArcIdError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (
                ArcIdError::upstream(UpstreamService::Ledger, "reverted"),
                StatusCode::BAD_GATEWAY,
            ),
            (ArcIdError::Internal("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (err, expected) in cases {
            assert_eq!(err.into_response().status(), expected);
        }
    }

    #[test]
    fn test_upstream_message_names_service() {
        let err = ArcIdError::upstream(UpstreamService::ContentStore, "HTTP 503");
        assert_eq!(err.to_string(), "Upstream error (content store): HTTP 503");
        assert_eq!(err.kind(), "upstream");
    }
}
