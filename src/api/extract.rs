/// Request extractors with JSON error bodies
use crate::{address::Address, error::ArcIdError};
use axum::{
    async_trait,
    extract::{FromRequest, FromRequestParts, Path, Request},
    http::request::Parts,
    Json,
};
use serde::de::DeserializeOwned;

/// `Json<T>` whose rejection is a `Validation` error
#[derive(Debug)]
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ArcIdError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| ArcIdError::Validation(rejection.body_text()))?;
        Ok(Self(value))
    }
}

/// `:address` path segment, validated and lowercased
#[derive(Debug)]
pub struct AddressPath(pub Address);

#[async_trait]
impl<S> FromRequestParts<S> for AddressPath
where
    S: Send + Sync,
{
    type Rejection = ArcIdError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(raw) = Path::<String>::from_request_parts(parts, state)
            .await
            .map_err(|rejection| ArcIdError::Validation(rejection.body_text()))?;
        Ok(Self(Address::parse(&raw)?))
    }
}
