/// Database layer
///
/// - `pool`: bounded PostgreSQL pool with health checks
/// - `migrations`: embedded schema migrations
///
/// Models and their user-scoped queries live in `crate::models`.

pub mod migrations;
pub mod pool;
