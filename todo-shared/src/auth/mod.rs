/// Authentication primitives
///
/// Users are managed by an external auth server. This crate only verifies
/// the bearer tokens it issues.
///
/// # Modules
///
/// - [`jwks`]: cached JSON Web Key Set of the auth server
/// - [`jwt`]: token verification and claims

pub mod jwks;
pub mod jwt;
