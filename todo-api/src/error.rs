/// Error handling for the API server
///
/// Handlers return `Result<T, ApiError>`; the error turns into a status
/// code and a JSON body of the form
///
/// ```json
/// { "detail": "Task not found", "code": "TASK_NOT_FOUND" }
/// ```
///
/// Validation failures add an `errors` list with one entry per field.
/// Not-found and unauthorized responses never say whether a resource exists
/// for another user. Internal errors are logged in full and reduced to a
/// generic message for the client.
///
/// # Example
///
/// ```no_run
/// use todo_api::error::{ApiError, ApiResult};
/// use axum::Json;
///
/// async fn handler() -> ApiResult<Json<()>> {
///     Err(ApiError::TaskNotFound)
/// }
/// ```

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use todo_shared::auth::jwt::AuthError;
use todo_shared::models::tag::{TagNameError, TAG_NAME_CONSTRAINT};

/// API result type alias
pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// 404, also used for tasks owned by someone else
    #[error("Task not found")]
    TaskNotFound,

    #[error("Tag not found")]
    TagNotFound,

    /// 404 for paths outside the route table
    #[error("Not found")]
    RouteNotFound,

    /// 422 with field-level detail
    #[error("Validation failed: {} errors", .0.len())]
    Validation(Vec<ValidationErrorDetail>),

    /// 401; the message is for logs only
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// 429; `limit` is the per-minute allowance
    #[error("Rate limit exceeded")]
    RateLimited { limit: u32, retry_after: u64 },

    /// 500; the message is for logs only
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Validation error detail
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationErrorDetail {
    /// Field that failed validation
    pub field: String,

    pub message: String,
}

impl ValidationErrorDetail {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Error response body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub detail: String,

    pub code: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<ValidationErrorDetail>>,
}

impl ApiError {
    /// Single-field validation failure
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        ApiError::Validation(vec![ValidationErrorDetail::new(field, message)])
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::TaskNotFound | ApiError::TagNotFound | ApiError::RouteNotFound => {
                StatusCode::NOT_FOUND
            }
            ApiError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::TaskNotFound => "TASK_NOT_FOUND",
            ApiError::TagNotFound => "TAG_NOT_FOUND",
            ApiError::RouteNotFound => "NOT_FOUND",
            ApiError::Validation(_) => "VALIDATION_ERROR",
            ApiError::Unauthorized(_) => "UNAUTHORIZED",
            ApiError::RateLimited { .. } => "RATE_LIMITED",
            ApiError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code().to_string();

        let (detail, errors) = match self {
            ApiError::TaskNotFound => ("Task not found".to_string(), None),
            ApiError::TagNotFound => ("Tag not found".to_string(), None),
            ApiError::RouteNotFound => ("Not found".to_string(), None),
            ApiError::Validation(errors) => ("Request validation failed".to_string(), Some(errors)),
            ApiError::Unauthorized(reason) => {
                tracing::debug!(reason = %reason, "Rejected credentials");
                ("Invalid or missing authentication credentials".to_string(), None)
            }
            ApiError::RateLimited { limit, retry_after } => {
                let body = Json(ErrorResponse {
                    detail: format!("Rate limit exceeded. Try again in {} seconds", retry_after),
                    code,
                    errors: None,
                });
                let mut response = (status, body).into_response();
                let headers = response.headers_mut();
                headers.insert(header::RETRY_AFTER, HeaderValue::from(retry_after));
                headers.insert("X-RateLimit-Limit", HeaderValue::from(limit));
                headers.insert("X-RateLimit-Remaining", HeaderValue::from_static("0"));
                return response;
            }
            ApiError::Internal(msg) => {
                // Log internal errors but don't expose details to clients
                tracing::error!(error = %msg, "Internal error");
                ("An internal error occurred".to_string(), None)
            }
        };

        let mut response = (status, Json(ErrorResponse { detail, code, errors })).into_response();

        if status == StatusCode::UNAUTHORIZED {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }

        response
    }
}

/// Convert sqlx errors to API errors
impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.is_unique_violation() && db_err.constraint() == Some(TAG_NAME_CONSTRAINT) {
                return ApiError::invalid("name", "A tag with this name already exists");
            }
        }

        ApiError::Internal(format!("Database error: {}", err))
    }
}

/// Convert auth errors to API errors
impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::KeysUnavailable(e) => {
                // the client still only sees 401
                tracing::error!(error = %e, "Token could not be checked");
                ApiError::Unauthorized("signing keys unavailable".to_string())
            }
            other => ApiError::Unauthorized(other.to_string()),
        }
    }
}

impl From<TagNameError> for ApiError {
    fn from(err: TagNameError) -> Self {
        ApiError::invalid("tags", err.to_string())
    }
}

/// Convert `validator` failures into field-level details
impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut details: Vec<ValidationErrorDetail> = errors
            .field_errors()
            .iter()
            .flat_map(|(field, errors)| {
                errors.iter().map(move |e| {
                    ValidationErrorDetail::new(
                        field.to_string(),
                        e.message
                            .as_ref()
                            .map(|m| m.to_string())
                            .unwrap_or_else(|| format!("invalid value ({})", e.code)),
                    )
                })
            })
            .collect();
        details.sort_by(|a, b| a.field.cmp(&b.field));

        ApiError::Validation(details)
    }
}
