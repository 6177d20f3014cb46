/// API route handlers
///
/// - `health`: service banner and health check (public)
/// - `tasks`: task CRUD, completion toggle, listing with filters
/// - `tags`: tag CRUD and orphan cleanup

pub mod health;
pub mod tags;
pub mod tasks;
