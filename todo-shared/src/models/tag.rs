/// Tag model and database operations
///
/// Tags are per-user labels attached to tasks through the `task_tag`
/// junction table. Names are stored normalized (trimmed, lowercase, single
/// word) and are unique per user.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE tag (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     user_id TEXT NOT NULL,
///     name VARCHAR(50) NOT NULL,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     CONSTRAINT uq_tag_user_name UNIQUE (user_id, name)
/// );
///
/// CREATE TABLE task_tag (
///     task_id UUID NOT NULL REFERENCES task(id) ON DELETE CASCADE,
///     tag_id UUID NOT NULL REFERENCES tag(id) ON DELETE CASCADE,
///     PRIMARY KEY (task_id, tag_id)
/// );
/// ```
///
/// Every query takes the owning `user_id` as a predicate. A tag that exists
/// for another user behaves exactly like a tag that does not exist.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgConnection;
use std::collections::HashMap;
use uuid::Uuid;

/// Longest accepted tag name, in characters
pub const MAX_TAG_NAME_LENGTH: usize = 50;

/// Most tags a single task may carry
pub const MAX_TAGS_PER_TASK: usize = 20;

/// Name of the per-user uniqueness constraint on `tag`
pub const TAG_NAME_CONSTRAINT: &str = "uq_tag_user_name";

/// Reasons a tag name is rejected
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TagNameError {
    #[error("Tag name cannot be empty")]
    Empty,

    #[error("Tag '{0}' exceeds 50 characters")]
    TooLong(String),

    #[error("Tag '{0}' contains spaces. Tags must be single words.")]
    ContainsWhitespace(String),

    #[error("Tag '{0}' contains control characters")]
    ControlCharacter(String),

    #[error("A task can have at most 20 tags, got {0}")]
    TooMany(usize),
}

/// Normalizes a single tag name
///
/// Trims, rejects control characters and inner whitespace, and lowercases.
/// The length limit of [`MAX_TAG_NAME_LENGTH`] characters applies to the
/// lowercased name, which can be longer than the input. Blank input is an
/// error.
pub fn normalize_tag_name(raw: &str) -> Result<String, TagNameError> {
    let name = raw.trim();

    if name.is_empty() {
        return Err(TagNameError::Empty);
    }
    if name.chars().any(char::is_whitespace) {
        return Err(TagNameError::ContainsWhitespace(name.to_string()));
    }
    if name.chars().any(char::is_control) {
        return Err(TagNameError::ControlCharacter(name.escape_default().to_string()));
    }

    let name = name.to_lowercase();
    if name.chars().count() > MAX_TAG_NAME_LENGTH {
        return Err(TagNameError::TooLong(name));
    }

    Ok(name)
}

/// Normalizes the tag list of a task payload
///
/// Blank entries are dropped and duplicates removed, keeping first-seen order.
pub fn normalize_tags(raw: &[String]) -> Result<Vec<String>, TagNameError> {
    if raw.len() > MAX_TAGS_PER_TASK {
        return Err(TagNameError::TooMany(raw.len()));
    }

    let mut tags: Vec<String> = Vec::with_capacity(raw.len());
    for entry in raw {
        if entry.trim().is_empty() {
            continue;
        }
        let name = normalize_tag_name(entry)?;
        if !tags.contains(&name) {
            tags.push(name);
        }
    }

    Ok(tags)
}

/// A tag row
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Tag {
    pub id: Uuid,

    /// Owner (subject of the auth token)
    pub user_id: String,

    /// Normalized name, unique per user
    pub name: String,

    pub created_at: DateTime<Utc>,
}

/// A tag together with the number of tasks using it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct TagWithCount {
    pub id: Uuid,
    pub name: String,
    pub task_count: i64,
    pub created_at: DateTime<Utc>,
}

impl Tag {
    /// Creates a tag
    ///
    /// Returns `None` when the user already has a tag with this name.
    /// `name` must already be normalized.
    pub async fn create(
        conn: &mut PgConnection,
        user_id: &str,
        name: &str,
    ) -> Result<Option<TagWithCount>, sqlx::Error> {
        let tag = sqlx::query_as::<_, TagWithCount>(
            r#"
            INSERT INTO tag (user_id, name)
            VALUES ($1, $2)
            ON CONFLICT ON CONSTRAINT uq_tag_user_name DO NOTHING
            RETURNING id, name, 0::BIGINT AS task_count, created_at
            "#,
        )
        .bind(user_id)
        .bind(name)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(tag)
    }

    /// Finds one of the user's tags
    pub async fn get_by_id(
        conn: &mut PgConnection,
        user_id: &str,
        id: Uuid,
    ) -> Result<Option<TagWithCount>, sqlx::Error> {
        let tag = sqlx::query_as::<_, TagWithCount>(
            r#"
            SELECT tg.id, tg.name, COUNT(tt.task_id) AS task_count, tg.created_at
            FROM tag tg
            LEFT JOIN task_tag tt ON tt.tag_id = tg.id
            WHERE tg.id = $1 AND tg.user_id = $2
            GROUP BY tg.id
            "#,
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(tag)
    }

    /// Lists the user's tags alphabetically with task counts
    pub async fn list(
        conn: &mut PgConnection,
        user_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<TagWithCount>, sqlx::Error> {
        let tags = sqlx::query_as::<_, TagWithCount>(
            r#"
            SELECT tg.id, tg.name, COUNT(tt.task_id) AS task_count, tg.created_at
            FROM tag tg
            LEFT JOIN task_tag tt ON tt.tag_id = tg.id
            WHERE tg.user_id = $1
            GROUP BY tg.id
            ORDER BY tg.name ASC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&mut *conn)
        .await?;

        Ok(tags)
    }

    /// Number of tags the user has
    pub async fn count_for_user(conn: &mut PgConnection, user_id: &str) -> Result<i64, sqlx::Error> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tag WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(&mut *conn)
            .await?;

        Ok(count)
    }

    /// Renames a tag
    ///
    /// A name clash with another of the user's tags surfaces as a unique
    /// violation on [`TAG_NAME_CONSTRAINT`].
    pub async fn rename(
        conn: &mut PgConnection,
        user_id: &str,
        id: Uuid,
        name: &str,
    ) -> Result<Option<TagWithCount>, sqlx::Error> {
        let tag = sqlx::query_as::<_, TagWithCount>(
            r#"
            WITH renamed AS (
                UPDATE tag SET name = $3
                WHERE id = $1 AND user_id = $2
                RETURNING id, name, created_at
            )
            SELECT r.id, r.name,
                   (SELECT COUNT(*) FROM task_tag tt WHERE tt.tag_id = r.id) AS task_count,
                   r.created_at
            FROM renamed r
            "#,
        )
        .bind(id)
        .bind(user_id)
        .bind(name)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(tag)
    }

    /// Deletes a tag; its task associations go with it, the tasks stay
    pub async fn delete(conn: &mut PgConnection, user_id: &str, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM tag WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(&mut *conn)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Finds or creates every named tag in two statements
    ///
    /// `names` must already be normalized. The result order is unspecified.
    pub async fn get_or_create_many(
        conn: &mut PgConnection,
        user_id: &str,
        names: &[String],
    ) -> Result<Vec<Tag>, sqlx::Error> {
        if names.is_empty() {
            return Ok(Vec::new());
        }

        sqlx::query(
            r#"
            INSERT INTO tag (user_id, name)
            SELECT $1, UNNEST($2::TEXT[])
            ON CONFLICT ON CONSTRAINT uq_tag_user_name DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(names)
        .execute(&mut *conn)
        .await?;

        let tags = sqlx::query_as::<_, Tag>(
            r#"
            SELECT id, user_id, name, created_at
            FROM tag
            WHERE user_id = $1 AND name = ANY($2)
            "#,
        )
        .bind(user_id)
        .bind(names)
        .fetch_all(&mut *conn)
        .await?;

        Ok(tags)
    }

    /// Tags attached to one task, alphabetically
    ///
    /// The caller checks that the task belongs to `user_id`; the tag side is
    /// filtered here as well.
    pub async fn for_task(
        conn: &mut PgConnection,
        user_id: &str,
        task_id: Uuid,
    ) -> Result<Vec<TagWithCount>, sqlx::Error> {
        let tags = sqlx::query_as::<_, TagWithCount>(
            r#"
            SELECT tg.id, tg.name,
                   (SELECT COUNT(*) FROM task_tag c WHERE c.tag_id = tg.id) AS task_count,
                   tg.created_at
            FROM task_tag tt
            JOIN tag tg ON tg.id = tt.tag_id
            WHERE tt.task_id = $1 AND tg.user_id = $2
            ORDER BY tg.name ASC
            "#,
        )
        .bind(task_id)
        .bind(user_id)
        .fetch_all(&mut *conn)
        .await?;

        Ok(tags)
    }

    /// Tag names for a batch of tasks in one query, keyed by task id
    ///
    /// Tasks without tags have no entry.
    pub async fn names_for_tasks(
        conn: &mut PgConnection,
        user_id: &str,
        task_ids: &[Uuid],
    ) -> Result<HashMap<Uuid, Vec<String>>, sqlx::Error> {
        if task_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let rows = sqlx::query_as::<_, (Uuid, String)>(
            r#"
            SELECT tt.task_id, tg.name
            FROM task_tag tt
            JOIN tag tg ON tg.id = tt.tag_id
            WHERE tt.task_id = ANY($1) AND tg.user_id = $2
            ORDER BY tg.name ASC
            "#,
        )
        .bind(task_ids)
        .bind(user_id)
        .fetch_all(&mut *conn)
        .await?;

        let mut by_task: HashMap<Uuid, Vec<String>> = HashMap::new();
        for (task_id, name) in rows {
            by_task.entry(task_id).or_default().push(name);
        }

        Ok(by_task)
    }

    /// Deletes the user's tags that no task uses; returns how many went
    pub async fn cleanup_orphans(conn: &mut PgConnection, user_id: &str) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            DELETE FROM tag tg
            WHERE tg.user_id = $1
              AND NOT EXISTS (SELECT 1 FROM task_tag tt WHERE tt.tag_id = tg.id)
            "#,
        )
        .bind(user_id)
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_normalize_tag_name() {
        assert_eq!(normalize_tag_name("  Work ").unwrap(), "work");
        assert_eq!(normalize_tag_name("URGENT").unwrap(), "urgent");
        assert_eq!(normalize_tag_name("   "), Err(TagNameError::Empty));
        assert_eq!(
            normalize_tag_name("two words"),
            Err(TagNameError::ContainsWhitespace("two words".to_string()))
        );
        assert!(matches!(
            normalize_tag_name(&"x".repeat(51)),
            Err(TagNameError::TooLong(_))
        ));
        assert!(normalize_tag_name(&"x".repeat(50)).is_ok());
    }

    #[test]
    fn test_length_checked_after_lowercasing() {
        // 'İ' lowercases to two chars
        let dotted = "İ".repeat(50);
        assert_eq!(dotted.chars().count(), 50);
        assert!(matches!(normalize_tag_name(&dotted), Err(TagNameError::TooLong(_))));
        assert!(normalize_tag_name(&"İ".repeat(25)).is_ok());
    }

    #[test]
    fn test_control_characters_rejected() {
        assert!(matches!(
            normalize_tag_name("a\0b"),
            Err(TagNameError::ControlCharacter(_))
        ));
        assert!(matches!(
            normalize_tags(&strings(&["ok", "bad\u{7}"])),
            Err(TagNameError::ControlCharacter(_))
        ));
    }

    #[test]
    fn test_normalize_tags_dedupes_in_order() {
        let tags = normalize_tags(&strings(&["Work", "home", " WORK ", "", "errands", "home"])).unwrap();
        assert_eq!(tags, strings(&["work", "home", "errands"]));
    }

    #[test]
    fn test_normalize_tags_limit() {
        let many: Vec<String> = (0..21).map(|i| format!("tag{}", i)).collect();
        assert_eq!(normalize_tags(&many), Err(TagNameError::TooMany(21)));

        let enough: Vec<String> = (0..20).map(|i| format!("tag{}", i)).collect();
        assert_eq!(normalize_tags(&enough).unwrap().len(), 20);
    }

    #[test]
    fn test_normalize_tags_rejects_bad_entry() {
        let result = normalize_tags(&strings(&["ok", "not ok"]));
        assert!(matches!(result, Err(TagNameError::ContainsWhitespace(_))));
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(
            TagNameError::TooLong("abc".into()).to_string(),
            "Tag 'abc' exceeds 50 characters"
        );
        assert_eq!(
            TagNameError::TooMany(25).to_string(),
            "A task can have at most 20 tags, got 25"
        );
    }
}
