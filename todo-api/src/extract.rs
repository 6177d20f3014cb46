/// Request extractors that validate their payload
///
/// `ValidJson<T>` and `ValidQuery<T>` deserialize like axum's `Json` and
/// `Query`, then run `T::validate()`. Any failure becomes a 422
/// [`ApiError::Validation`] instead of axum's default plain-text rejection.

use crate::error::ApiError;
use axum::{
    async_trait,
    extract::{FromRequest, FromRequestParts, Query, Request},
    http::request::Parts,
    Json,
};
use serde::de::DeserializeOwned;
use validator::{Validate, ValidationError};

/// JSON body that passed validation
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ValidJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| ApiError::invalid("body", rejection.body_text()))?;

        value.validate()?;
        Ok(ValidJson(value))
    }
}

/// Query string that passed validation
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidQuery<T>(pub T);

#[async_trait]
impl<T, S> FromRequestParts<S> for ValidQuery<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state)
            .await
            .map_err(|rejection| ApiError::invalid("query", rejection.body_text()))?;

        value.validate()?;
        Ok(ValidQuery(value))
    }
}

/// Field rule rejecting NUL, which PostgreSQL text columns cannot store
///
/// Use as `#[validate(custom(function = "crate::extract::no_nul"))]`.
pub fn no_nul(value: &str) -> Result<(), ValidationError> {
    if value.contains('\0') {
        let mut error = ValidationError::new("nul_byte");
        error.message = Some("must not contain NUL characters".into());
        return Err(error);
    }
    Ok(())
}
