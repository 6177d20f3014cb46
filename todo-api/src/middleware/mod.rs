/// Middleware for the `/api` routes
///
/// - `auth`: bearer token verification, provides `AuthUser`
/// - `rate_limit`: per-user token bucket

pub mod auth;
pub mod rate_limit;
