use anyhow::{Context, Result};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use tracing::info;

use crate::config::PlacardConfig;

/// Document collections, one table plus one FTS5 index each.
pub(crate) const COLLECTIONS: [&str; 2] = ["placements", "advertisers"];

#[derive(Clone)]
pub struct Database {
    pub pool: SqlitePool,
}

impl Database {
    pub async fn new(config: &PlacardConfig) -> Result<Self> {
        info!("Connecting to database: {}", config.db_path().display());

        let pool = SqlitePoolOptions::new()
            .max_connections(config.file.database.max_connections)
            .min_connections(1)
            .connect(&config.db_url())
            .await
            .with_context(|| format!("Failed to connect to database: {}", config.db_url()))?;

        self::run_migrations(&pool).await?;

        sqlx::query("PRAGMA journal_mode = WAL")
            .execute(&pool)
            .await?;
        sqlx::query("PRAGMA synchronous = NORMAL")
            .execute(&pool)
            .await?;
        sqlx::query("PRAGMA temp_store = MEMORY")
            .execute(&pool)
            .await?;

        Ok(Self { pool })
    }

    pub async fn schema_version(&self) -> Result<i64> {
        let version: i64 =
            sqlx::query_scalar("SELECT COALESCE(MAX(version), 0) FROM schema_version")
                .fetch_one(&self.pool)
                .await?;
        Ok(version)
    }
}

/// Current schema version - increment when adding migrations
pub(crate) const SCHEMA_VERSION: i64 = 1;

pub(crate) async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL DEFAULT (unixepoch()),
            description TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    let current_version: i64 =
        sqlx::query_scalar("SELECT COALESCE(MAX(version), 0) FROM schema_version")
            .fetch_one(pool)
            .await
            .context("Failed to read schema version")?;

    if current_version > SCHEMA_VERSION {
        anyhow::bail!(
            "Database schema version {} is newer than supported version {}. Please upgrade placard.",
            current_version,
            SCHEMA_VERSION
        );
    }

    if current_version == SCHEMA_VERSION {
        info!(
            "Database schema is up to date (version {})",
            current_version
        );
        return Ok(());
    }

    info!(
        "Migrating database from version {} to {}",
        current_version, SCHEMA_VERSION
    );

    for table in COLLECTIONS {
        create_collection(pool, table).await?;
    }

    // Names are unique across the whole collection, deleted rows included.
    sqlx::query("CREATE UNIQUE INDEX IF NOT EXISTS idx_advertisers_name_unique ON advertisers(name)")
        .execute(pool)
        .await?;

    // === Analytics ===

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS analytics_events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            kind TEXT NOT NULL CHECK (kind IN ('load-js', 'view-js', 'click-js')),
            subject_id TEXT NOT NULL,
            occurred_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_analytics_events_subject ON analytics_events(subject_id, occurred_at)",
    )
    .execute(pool)
    .await?;

    // The event log is append-only
    sqlx::query(
        r#"
        CREATE TRIGGER IF NOT EXISTS analytics_events_no_update BEFORE UPDATE ON analytics_events BEGIN
            SELECT RAISE(ABORT, 'analytics_events is append-only');
        END
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TRIGGER IF NOT EXISTS analytics_events_no_delete BEFORE DELETE ON analytics_events BEGIN
            SELECT RAISE(ABORT, 'analytics_events is append-only');
        END
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("INSERT OR REPLACE INTO schema_version (version, description) VALUES (?, ?)")
        .bind(SCHEMA_VERSION)
        .bind("Inventory collections, FTS indexes, analytics events")
        .execute(pool)
        .await?;
    info!("Schema upgraded to version {}", SCHEMA_VERSION);

    info!("Database migrations completed");
    Ok(())
}

/// Document table, keyset indexes, and an external-content FTS5 index kept in
/// sync by triggers.
async fn create_collection(pool: &SqlitePool, table: &str) -> Result<()> {
    sqlx::query(&format!(
        r#"
        CREATE TABLE IF NOT EXISTS {table} (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            deleted INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            created_by TEXT,
            updated_by TEXT,
            doc TEXT NOT NULL,
            body TEXT NOT NULL DEFAULT ''
        )
        "#
    ))
    .execute(pool)
    .await
    .with_context(|| format!("Failed to create {table}"))?;

    for column in ["name", "created_at", "updated_at"] {
        sqlx::query(&format!(
            "CREATE INDEX IF NOT EXISTS idx_{table}_{column} ON {table}({column}, id)"
        ))
        .execute(pool)
        .await?;
    }

    sqlx::query(&format!(
        r#"
        CREATE VIRTUAL TABLE IF NOT EXISTS {table}_fts USING fts5(
            name,
            body,
            content={table},
            tokenize='unicode61 remove_diacritics 2'
        )
        "#
    ))
    .execute(pool)
    .await?;

    sqlx::query(&format!(
        r#"
        CREATE TRIGGER IF NOT EXISTS {table}_ai AFTER INSERT ON {table} BEGIN
            INSERT INTO {table}_fts(rowid, name, body)
            VALUES (new.rowid, new.name, new.body);
        END
        "#
    ))
    .execute(pool)
    .await?;

    sqlx::query(&format!(
        r#"
        CREATE TRIGGER IF NOT EXISTS {table}_ad AFTER DELETE ON {table} BEGIN
            INSERT INTO {table}_fts({table}_fts, rowid, name, body)
            VALUES ('delete', old.rowid, old.name, old.body);
        END
        "#
    ))
    .execute(pool)
    .await?;

    sqlx::query(&format!(
        r#"
        CREATE TRIGGER IF NOT EXISTS {table}_au AFTER UPDATE ON {table} BEGIN
            INSERT INTO {table}_fts({table}_fts, rowid, name, body)
            VALUES ('delete', old.rowid, old.name, old.body);
            INSERT INTO {table}_fts(rowid, name, body)
            VALUES (new.rowid, new.name, new.body);
        END
        "#
    ))
    .execute(pool)
    .await?;

    Ok(())
}
