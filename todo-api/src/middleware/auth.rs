/// Bearer token authentication
///
/// `require_user` runs in front of every `/api/*` route. It verifies the
/// `Authorization: Bearer <token>` header against the auth server's key set
/// and stores the caller as [`AuthUser`] in the request extensions.
/// Handlers read it with `Extension<AuthUser>`.

use crate::{app::AppState, error::ApiError};
use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use todo_shared::auth::jwt::AuthError;

/// The authenticated caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    /// Subject of the token
    pub user_id: String,
}

/// Token from an `Authorization: Bearer` header
///
/// The scheme is matched case-insensitively.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;

    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }

    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

pub async fn require_user(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_token(req.headers())
        .map(str::to_owned)
        .ok_or(AuthError::MissingCredentials)?;

    let user_id = state.verifier.user_id(&token).await?;
    tracing::debug!(user_id = %user_id, path = %req.uri().path(), "Authenticated request");

    req.extensions_mut().insert(AuthUser { user_id });

    Ok(next.run(req).await)
}
