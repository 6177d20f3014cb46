/// Task model and database operations
///
/// A task is a to-do item owned by exactly one user. Every query in this
/// module filters on `user_id`, so a task owned by someone else is
/// indistinguishable from a missing one.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE task (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     user_id TEXT NOT NULL,
///     title VARCHAR(200) NOT NULL,
///     description VARCHAR(2000),
///     completed BOOLEAN NOT NULL DEFAULT FALSE,
///     priority VARCHAR(10) NOT NULL DEFAULT 'none',
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ
/// );
/// ```
///
/// # Example
///
/// ```no_run
/// use todo_shared::models::priority::Priority;
/// use todo_shared::models::task::{NewTask, Task, TaskChanges};
/// use sqlx::PgPool;
///
/// # async fn example(pool: PgPool) -> Result<(), sqlx::Error> {
/// let mut tx = pool.begin().await?;
///
/// let created = Task::create(&mut tx, "user-123", NewTask {
///     title: "Write report".to_string(),
///     description: None,
///     priority: Priority::High,
///     tags: vec!["work".to_string()],
/// }).await?;
///
/// Task::update(&mut tx, "user-123", created.task.id, TaskChanges {
///     completed: Some(true),
///     ..Default::default()
/// }).await?;
///
/// tx.commit().await?;
/// # Ok(())
/// # }
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, Postgres, QueryBuilder};
use tracing::debug;
use uuid::Uuid;

use super::priority::{sort_rank_sql, Priority};
use super::tag::Tag;
use super::Pagination;

const TASK_COLUMNS: &str =
    "t.id, t.user_id, t.title, t.description, t.completed, t.priority, t.created_at, t.updated_at";

/// A task row
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Task {
    pub id: Uuid,

    /// Owner (subject of the auth token)
    pub user_id: String,

    pub title: String,

    pub description: Option<String>,

    pub completed: bool,

    #[sqlx(try_from = "String")]
    pub priority: Priority,

    pub created_at: DateTime<Utc>,

    /// Set on every update; `None` until the first one
    pub updated_at: Option<DateTime<Utc>>,
}

/// A task with the names of its tags, as returned to clients
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskWithTags {
    #[serde(flatten)]
    pub task: Task,

    pub tags: Vec<String>,
}

/// Input for creating a task
///
/// Field constraints are checked by the caller; `tags` must already be
/// normalized (see [`super::tag::normalize_tags`]).
#[derive(Debug, Clone, Default)]
pub struct NewTask {
    pub title: String,
    pub description: Option<String>,
    pub priority: Priority,
    pub tags: Vec<String>,
}

impl NewTask {
    /// A task with only a title and every other field defaulted
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }
}

/// Partial update; `None` leaves the column unchanged
///
/// `tags`, when present, replaces the whole tag set.
#[derive(Debug, Clone, Default)]
pub struct TaskChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub completed: Option<bool>,
    pub priority: Option<Priority>,
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusFilter {
    #[default]
    All,
    Pending,
    Completed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriorityFilter {
    #[default]
    All,
    None,
    Low,
    Medium,
    High,
}

impl PriorityFilter {
    pub fn as_priority(&self) -> Option<Priority> {
        match self {
            PriorityFilter::All => None,
            PriorityFilter::None => Some(Priority::None),
            PriorityFilter::Low => Some(Priority::Low),
            PriorityFilter::Medium => Some(Priority::Medium),
            PriorityFilter::High => Some(Priority::High),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    #[default]
    Priority,
    Title,
    CreatedAt,
}

impl SortField {
    /// Newest first for timestamps, ascending otherwise
    pub fn default_order(&self) -> SortOrder {
        match self {
            SortField::CreatedAt => SortOrder::Desc,
            SortField::Priority | SortField::Title => SortOrder::Asc,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    fn as_sql(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

/// Filters and ordering for [`Task::list`]
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    /// Case-insensitive substring of title or description
    pub search: Option<String>,
    pub status: StatusFilter,
    pub priority: PriorityFilter,
    /// Tasks carrying any of these (normalized) tag names
    pub tags: Vec<String>,
    /// Tasks without any tag
    pub no_tags: bool,
    pub sort: SortField,
    /// Defaults to [`SortField::default_order`]
    pub order: Option<SortOrder>,
}

impl TaskFilter {
    /// `ILIKE` pattern for the search term with wildcards escaped
    fn search_pattern(&self) -> Option<String> {
        let term = self.search.as_deref()?.trim();
        if term.is_empty() {
            return None;
        }

        let mut escaped = String::with_capacity(term.len() + 2);
        escaped.push('%');
        for c in term.chars() {
            if matches!(c, '%' | '_' | '\\') {
                escaped.push('\\');
            }
            escaped.push(c);
        }
        escaped.push('%');
        Some(escaped)
    }

    fn order_by_sql(&self) -> String {
        let order = self.order.unwrap_or_else(|| self.sort.default_order());

        match self.sort {
            SortField::Priority => format!(
                "{} {}, t.created_at DESC, t.id",
                sort_rank_sql("t.priority"),
                order.as_sql()
            ),
            SortField::Title => format!("t.title {}, t.id", order.as_sql()),
            SortField::CreatedAt => format!("t.created_at {}, t.id", order.as_sql()),
        }
    }

    /// Appends `WHERE ...` scoped to `user_id` for a query over `task t`
    fn push_where(&self, qb: &mut QueryBuilder<'_, Postgres>, user_id: &str) {
        qb.push(" WHERE t.user_id = ");
        qb.push_bind(user_id.to_string());

        if let Some(pattern) = self.search_pattern() {
            qb.push(" AND (t.title ILIKE ");
            qb.push_bind(pattern.clone());
            qb.push(" OR t.description ILIKE ");
            qb.push_bind(pattern);
            qb.push(")");
        }

        match self.status {
            StatusFilter::All => {}
            StatusFilter::Pending => {
                qb.push(" AND t.completed = FALSE");
            }
            StatusFilter::Completed => {
                qb.push(" AND t.completed = TRUE");
            }
        }

        if let Some(priority) = self.priority.as_priority() {
            qb.push(" AND t.priority = ");
            qb.push_bind(priority.as_str());
        }

        if !self.tags.is_empty() {
            qb.push(
                " AND EXISTS (SELECT 1 FROM task_tag tt JOIN tag tg ON tg.id = tt.tag_id \
                 WHERE tt.task_id = t.id AND tg.name = ANY(",
            );
            qb.push_bind(self.tags.clone());
            qb.push("))");
        }

        if self.no_tags {
            qb.push(" AND NOT EXISTS (SELECT 1 FROM task_tag tt WHERE tt.task_id = t.id)");
        }
    }
}

/// One page of [`Task::list`]
#[derive(Debug, Clone, Serialize)]
pub struct TaskPage {
    pub tasks: Vec<TaskWithTags>,

    /// All of the user's tasks
    pub total: i64,

    /// Tasks matching the filter, across all pages
    pub filtered: i64,
}

impl Task {
    /// Creates a task with its tags
    pub async fn create(
        conn: &mut PgConnection,
        user_id: &str,
        data: NewTask,
    ) -> Result<TaskWithTags, sqlx::Error> {
        let task = sqlx::query_as::<_, Task>(
            r#"
            INSERT INTO task (user_id, title, description, priority)
            VALUES ($1, $2, $3, $4)
            RETURNING id, user_id, title, description, completed, priority, created_at, updated_at
            "#,
        )
        .bind(user_id)
        .bind(&data.title)
        .bind(&data.description)
        .bind(data.priority.as_str())
        .fetch_one(&mut *conn)
        .await?;

        let tags = Self::attach_tags(conn, user_id, task.id, &data.tags).await?;

        debug!(user_id, task_id = %task.id, tags = tags.len(), "Task created");
        Ok(TaskWithTags { task, tags })
    }

    /// Finds one of the user's tasks
    pub async fn get_by_id(
        conn: &mut PgConnection,
        user_id: &str,
        id: Uuid,
    ) -> Result<Option<TaskWithTags>, sqlx::Error> {
        let task = sqlx::query_as::<_, Task>(
            r#"
            SELECT id, user_id, title, description, completed, priority, created_at, updated_at
            FROM task
            WHERE id = $1 AND user_id = $2
            "#,
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await?;

        match task {
            Some(task) => Ok(Some(Self::with_tags(conn, user_id, task).await?)),
            None => Ok(None),
        }
    }

    /// Checks that the task exists and belongs to the user
    pub async fn exists(conn: &mut PgConnection, user_id: &str, id: Uuid) -> Result<bool, sqlx::Error> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM task WHERE id = $1 AND user_id = $2)")
                .bind(id)
                .bind(user_id)
                .fetch_one(&mut *conn)
                .await?;

        Ok(exists)
    }

    /// Lists one page of the user's tasks
    ///
    /// Runs three queries: the page itself, the filtered count and the total
    /// count, plus one batch query for the tags of the page.
    pub async fn list(
        conn: &mut PgConnection,
        user_id: &str,
        filter: &TaskFilter,
        page: Pagination,
    ) -> Result<TaskPage, sqlx::Error> {
        let mut qb = QueryBuilder::<Postgres>::new(format!("SELECT {} FROM task t", TASK_COLUMNS));
        filter.push_where(&mut qb, user_id);
        qb.push(" ORDER BY ");
        qb.push(filter.order_by_sql());
        qb.push(" LIMIT ");
        qb.push_bind(page.limit);
        qb.push(" OFFSET ");
        qb.push_bind(page.offset);

        let tasks: Vec<Task> = qb.build_query_as().fetch_all(&mut *conn).await?;

        let mut count_qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM task t");
        filter.push_where(&mut count_qb, user_id);
        let filtered: i64 = count_qb.build_query_scalar().fetch_one(&mut *conn).await?;

        let total = Self::count_for_user(conn, user_id).await?;

        let ids: Vec<Uuid> = tasks.iter().map(|t| t.id).collect();
        let mut tags_by_task = Tag::names_for_tasks(conn, user_id, &ids).await?;

        let tasks = tasks
            .into_iter()
            .map(|task| {
                let tags = tags_by_task.remove(&task.id).unwrap_or_default();
                TaskWithTags { task, tags }
            })
            .collect::<Vec<_>>();

        debug!(user_id, returned = tasks.len(), filtered, total, "Listed tasks");
        Ok(TaskPage { tasks, total, filtered })
    }

    /// Number of tasks the user owns
    pub async fn count_for_user(conn: &mut PgConnection, user_id: &str) -> Result<i64, sqlx::Error> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM task WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(&mut *conn)
            .await?;

        Ok(count)
    }

    /// Applies a partial update and stamps `updated_at`
    pub async fn update(
        conn: &mut PgConnection,
        user_id: &str,
        id: Uuid,
        changes: TaskChanges,
    ) -> Result<Option<TaskWithTags>, sqlx::Error> {
        let task = sqlx::query_as::<_, Task>(
            r#"
            UPDATE task
            SET title = COALESCE($3, title),
                description = COALESCE($4, description),
                completed = COALESCE($5, completed),
                priority = COALESCE($6, priority),
                updated_at = NOW()
            WHERE id = $1 AND user_id = $2
            RETURNING id, user_id, title, description, completed, priority, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(user_id)
        .bind(changes.title)
        .bind(changes.description)
        .bind(changes.completed)
        .bind(changes.priority.map(|p| p.as_str()))
        .fetch_optional(&mut *conn)
        .await?;

        let Some(task) = task else {
            return Ok(None);
        };

        let result = match changes.tags {
            Some(tags) => {
                sqlx::query("DELETE FROM task_tag WHERE task_id = $1")
                    .bind(task.id)
                    .execute(&mut *conn)
                    .await?;
                let tags = Self::attach_tags(conn, user_id, task.id, &tags).await?;
                TaskWithTags { task, tags }
            }
            None => Self::with_tags(conn, user_id, task).await?,
        };

        debug!(user_id, task_id = %id, "Task updated");
        Ok(Some(result))
    }

    /// Flips the completion flag
    pub async fn toggle_completion(
        conn: &mut PgConnection,
        user_id: &str,
        id: Uuid,
    ) -> Result<Option<TaskWithTags>, sqlx::Error> {
        let task = sqlx::query_as::<_, Task>(
            r#"
            UPDATE task
            SET completed = NOT completed,
                updated_at = NOW()
            WHERE id = $1 AND user_id = $2
            RETURNING id, user_id, title, description, completed, priority, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await?;

        match task {
            Some(task) => Ok(Some(Self::with_tags(conn, user_id, task).await?)),
            None => Ok(None),
        }
    }

    /// Deletes a task; `task_tag` rows cascade, the tags stay
    pub async fn delete(conn: &mut PgConnection, user_id: &str, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM task WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(&mut *conn)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn with_tags(
        conn: &mut PgConnection,
        user_id: &str,
        task: Task,
    ) -> Result<TaskWithTags, sqlx::Error> {
        let mut by_task = Tag::names_for_tasks(conn, user_id, &[task.id]).await?;
        let tags = by_task.remove(&task.id).unwrap_or_default();
        Ok(TaskWithTags { task, tags })
    }

    /// Links the named tags to a task, creating missing ones
    ///
    /// Returns the linked names sorted alphabetically.
    async fn attach_tags(
        conn: &mut PgConnection,
        user_id: &str,
        task_id: Uuid,
        names: &[String],
    ) -> Result<Vec<String>, sqlx::Error> {
        if names.is_empty() {
            return Ok(Vec::new());
        }

        let tags = Tag::get_or_create_many(conn, user_id, names).await?;
        let tag_ids: Vec<Uuid> = tags.iter().map(|t| t.id).collect();

        sqlx::query(
            r#"
            INSERT INTO task_tag (task_id, tag_id)
            SELECT $1, UNNEST($2::UUID[])
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(task_id)
        .bind(&tag_ids)
        .execute(&mut *conn)
        .await?;

        let mut linked: Vec<String> = tags.into_iter().map(|t| t.name).collect();
        linked.sort();
        Ok(linked)
    }
}
