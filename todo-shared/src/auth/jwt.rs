/// Bearer token verification
///
/// Tokens are issued by the external auth server and signed with one of the
/// keys in its published key set. Verification checks the signature, the
/// expiry and the audience, then returns the subject as the user id.
///
/// # Example
///
/// ```no_run
/// use jsonwebtoken::Algorithm;
/// use std::time::Duration;
/// use todo_shared::auth::jwks::JwksCache;
/// use todo_shared::auth::jwt::TokenVerifier;
///
/// # async fn example(token: &str) -> Result<(), Box<dyn std::error::Error>> {
/// let keys = JwksCache::for_auth_server("http://localhost:3000", Duration::from_secs(300));
/// let verifier = TokenVerifier::new(keys, Algorithm::EdDSA, Some("http://localhost:3000".into()));
///
/// let claims = verifier.verify(token).await?;
/// println!("user {}", claims.sub);
/// # Ok(())
/// # }
/// ```

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, decode_header, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use super::jwks::{JwksCache, JwksError};

pub use jsonwebtoken::Algorithm;

/// Claims read from an access token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject, used as the user id
    pub sub: String,

    /// Expiration (Unix timestamp)
    pub exp: i64,

    /// Issued at (Unix timestamp)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,

    /// Audience, a string or a list of strings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Missing authentication credentials")]
    MissingCredentials,

    #[error("Malformed token")]
    MalformedToken,

    #[error("Token has expired")]
    Expired,

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Signing keys unavailable: {0}")]
    KeysUnavailable(JwksError),
}

impl From<JwksError> for AuthError {
    fn from(e: JwksError) -> Self {
        match e {
            JwksError::UnknownKey(_) => AuthError::InvalidToken(e.to_string()),
            other => AuthError::KeysUnavailable(other),
        }
    }
}

pub struct TokenVerifier {
    keys: JwksCache,
    algorithm: Algorithm,
    audience: Option<String>,
}

impl TokenVerifier {
    /// Verifier accepting only `algorithm`; `audience: None` skips the
    /// audience check
    pub fn new(keys: JwksCache, algorithm: Algorithm, audience: Option<String>) -> Self {
        Self {
            keys,
            algorithm,
            audience,
        }
    }

    /// Verifies a token and returns its claims
    ///
    /// # Errors
    ///
    /// - `MalformedToken` if the header cannot be decoded
    /// - `Expired` if `exp` is in the past
    /// - `InvalidToken` for a bad signature, wrong algorithm or audience,
    ///   unknown key id, or a missing subject
    /// - `KeysUnavailable` if the key set cannot be fetched
    pub async fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        let header = decode_header(token).map_err(|_| AuthError::MalformedToken)?;

        if header.alg != self.algorithm {
            warn!(alg = ?header.alg, "Token signed with unexpected algorithm");
            return Err(AuthError::InvalidToken("unexpected algorithm".to_string()));
        }

        let jwk = self.keys.key_for(header.kid.as_deref()).await.map_err(|e| {
            if let JwksError::Fetch(_) = e {
                error!(error = %e, url = ?self.keys.url(), "Could not load signing keys");
            }
            AuthError::from(e)
        })?;

        let key = DecodingKey::from_jwk(&jwk)
            .map_err(|e| AuthError::InvalidToken(format!("unusable key: {}", e)))?;

        let mut validation = Validation::new(self.algorithm);
        validation.set_required_spec_claims(&["exp", "sub"]);
        match &self.audience {
            Some(audience) => validation.set_audience(&[audience]),
            None => validation.validate_aud = false,
        }

        let data = decode::<Claims>(token, &key, &validation).map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => AuthError::Expired,
            _ => AuthError::InvalidToken(e.to_string()),
        })?;

        if data.claims.sub.trim().is_empty() {
            return Err(AuthError::InvalidToken("missing subject".to_string()));
        }

        debug!(user_id = %data.claims.sub, "Token verified");
        Ok(data.claims)
    }

    /// Verifies a token and returns only the user id
    pub async fn user_id(&self, token: &str) -> Result<String, AuthError> {
        Ok(self.verify(token).await?.sub)
    }
}
