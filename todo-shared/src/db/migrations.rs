/// Schema migrations
///
/// Migration files live in `migrations/` at the workspace root as
/// `{timestamp}_{name}.up.sql` / `{timestamp}_{name}.down.sql` pairs and are
/// embedded into the binary at compile time.
///
/// Current schema:
///
/// ```text
/// task      (id, user_id, title, description, completed, priority, created_at, updated_at)
///           idx (user_id), (user_id, created_at), (user_id, priority)
/// tag       (id, user_id, name, created_at)  unique (user_id, name)
/// task_tag  (task_id, tag_id)  pk (task_id, tag_id), both ON DELETE CASCADE
/// ```

use sqlx::migrate::Migrator;
use sqlx::postgres::PgPool;
use tracing::{debug, info, warn};

static MIGRATOR: Migrator = sqlx::migrate!("../migrations");

/// Applied-migration summary
#[derive(Debug, Clone)]
pub struct MigrationStatus {
    /// Successfully applied migrations
    pub applied_migrations: usize,

    /// Migrations embedded in this build
    pub known_migrations: usize,

    /// Highest applied version
    pub latest_version: Option<i64>,
}

impl MigrationStatus {
    pub fn is_up_to_date(&self) -> bool {
        self.applied_migrations >= self.known_migrations
    }
}

/// Applies every pending migration
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    info!(known = MIGRATOR.iter().count(), "Running database migrations");

    MIGRATOR.run(pool).await.map_err(|e| {
        warn!(error = %e, "Migration failed");
        e
    })?;

    info!("Database schema is up to date");
    Ok(())
}

/// Reads `_sqlx_migrations` to report what has been applied
pub async fn migration_status(pool: &PgPool) -> Result<MigrationStatus, sqlx::Error> {
    let known_migrations = MIGRATOR.iter().filter(|m| m.migration_type.is_up_migration()).count();

    let table_exists: bool = sqlx::query_scalar(
        "SELECT EXISTS (
            SELECT FROM information_schema.tables
            WHERE table_schema = current_schema()
            AND table_name = '_sqlx_migrations'
        )",
    )
    .fetch_one(pool)
    .await?;

    if !table_exists {
        debug!("Migrations table does not exist yet");
        return Ok(MigrationStatus {
            applied_migrations: 0,
            known_migrations,
            latest_version: None,
        });
    }

    let (count, latest_version): (i64, Option<i64>) = sqlx::query_as(
        "SELECT COUNT(*), MAX(version) FROM _sqlx_migrations WHERE success = true",
    )
    .fetch_one(pool)
    .await?;

    Ok(MigrationStatus {
        applied_migrations: count as usize,
        known_migrations,
        latest_version,
    })
}
