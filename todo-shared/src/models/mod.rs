/// Database models and their user-scoped CRUD operations
///
/// # Models
///
/// - `task`: to-do items owned by a user
/// - `tag`: per-user labels, linked to tasks through `task_tag`
/// - `priority`: task priority levels
///
/// Every operation takes a `&mut PgConnection` and the owning `user_id`.
/// None of them commit; callers decide the transaction boundary.
///
/// # Example
///
/// ```no_run
/// use todo_shared::models::task::{NewTask, Task};
/// use sqlx::PgPool;
///
/// # async fn example(pool: PgPool) -> Result<(), sqlx::Error> {
/// let mut tx = pool.begin().await?;
/// let task = Task::create(&mut tx, "user-123", NewTask::titled("Buy milk")).await?;
/// tx.commit().await?;
/// assert!(!task.task.completed);
/// # Ok(())
/// # }
/// ```

pub mod priority;
pub mod tag;
pub mod task;

/// Page window for list queries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub limit: i64,
    pub offset: i64,
}

impl Pagination {
    pub const DEFAULT_LIMIT: i64 = 50;
    pub const MAX_LIMIT: i64 = 100;

    /// Clamps `limit` into `1..=MAX_LIMIT` and `offset` to non-negative
    pub fn new(limit: i64, offset: i64) -> Self {
        Self {
            limit: limit.clamp(1, Self::MAX_LIMIT),
            offset: offset.max(0),
        }
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            limit: Self::DEFAULT_LIMIT,
            offset: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pagination_clamps() {
        assert_eq!(Pagination::new(0, -5), Pagination { limit: 1, offset: 0 });
        assert_eq!(Pagination::new(500, 10), Pagination { limit: 100, offset: 10 });
        assert_eq!(Pagination::default().limit, 50);
    }
}
