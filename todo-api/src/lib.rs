//! # Todo API Server Library
//!
//! JSON API for a per-user to-do list: tasks, tags, filtering and sorting,
//! authenticated with bearer tokens from an external auth server.
//!
//! ## Modules
//!
//! - `app`: Application state and router builder
//! - `config`: Configuration management
//! - `error`: Error handling and HTTP response mapping
//! - `extract`: Validating JSON and query extractors
//! - `middleware`: Authentication and rate limiting
//! - `routes`: API route handlers

pub mod app;
pub mod config;
pub mod error;
pub mod extract;
pub mod middleware;
pub mod routes;
