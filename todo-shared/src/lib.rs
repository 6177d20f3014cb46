//! # Todo Shared Library
//!
//! Types and data access shared by the todo API server.
//!
//! ## Module Organization
//!
//! - `db`: connection pool and schema migrations
//! - `models`: tasks, tags and their user-scoped queries
//! - `auth`: bearer token verification against the auth server's key set

pub mod auth;
pub mod db;
pub mod models;

/// Current version of the shared library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
