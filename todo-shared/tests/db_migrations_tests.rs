/// Integration tests for schema migrations
///
/// Skipped when DATABASE_URL is not set.

use std::env;
use todo_shared::db::migrations::{migration_status, run_migrations};
use todo_shared::db::pool::{close_pool, create_pool, DatabaseConfig};

async fn migrated_pool() -> Option<sqlx::PgPool> {
    let url = env::var("DATABASE_URL").ok()?;
    let pool = create_pool(DatabaseConfig::new(url))
        .await
        .expect("Failed to create pool");
    run_migrations(&pool).await.expect("Migrations failed");
    Some(pool)
}

#[tokio::test]
async fn test_migrations_are_idempotent() {
    let Some(pool) = migrated_pool().await else {
        return;
    };

    let first = migration_status(&pool).await.expect("Failed to read status");
    run_migrations(&pool).await.expect("Second migration run failed");
    let second = migration_status(&pool).await.expect("Failed to read status");

    assert_eq!(first.applied_migrations, second.applied_migrations);
    assert!(second.is_up_to_date());
    assert_eq!(second.latest_version, Some(20250115000000));

    close_pool(pool).await;
}

#[tokio::test]
async fn test_schema_tables_exist() {
    let Some(pool) = migrated_pool().await else {
        return;
    };

    for table in ["task", "tag", "task_tag"] {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (
                SELECT FROM information_schema.tables
                WHERE table_schema = current_schema() AND table_name = $1
            )",
        )
        .bind(table)
        .fetch_one(&pool)
        .await
        .expect("Failed to query information_schema");

        assert!(exists, "table {} should exist", table);
    }

    close_pool(pool).await;
}

#[tokio::test]
async fn test_priority_defaults_to_none() {
    let Some(pool) = migrated_pool().await else {
        return;
    };

    let default: Option<String> = sqlx::query_scalar(
        "SELECT column_default FROM information_schema.columns
         WHERE table_schema = current_schema() AND table_name = 'task' AND column_name = 'priority'",
    )
    .fetch_one(&pool)
    .await
    .expect("Failed to read column default");

    assert!(default.unwrap_or_default().contains("'none'"));

    close_pool(pool).await;
}
