//! Handle to the SQLite-backed job store and its migration.

use anyhow::Result;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Pool, Sqlite};
use std::time::{SystemTime, UNIX_EPOCH};

/// Handle to the SQLite-backed job queue.
///
/// The database file lives under the XDG state directory:
/// `~/.local/state/melodex/jobs.db`.
#[derive(Clone)]
pub struct QueueStore {
    pub(super) pool: Pool<Sqlite>,
}

impl QueueStore {
    /// Open (or create) the default job database and run migrations.
    pub async fn open_default() -> Result<Self> {
        let xdg_dirs = xdg::BaseDirectories::with_prefix("melodex")?;
        let state_dir = xdg_dirs.get_state_home();
        let db_path = state_dir.join("jobs.db");

        tokio::fs::create_dir_all(&state_dir).await?;

        let uri = format!("sqlite://{}?mode=rwc", db_path.display());
        let pool = SqlitePoolOptions::new().max_connections(8).connect(&uri).await?;

        let store = QueueStore { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Open an in-memory database — used by tests and by `open_memory` below.
    /// Single connection: an in-memory sqlite pool with more than one
    /// connection hands back a second, empty database per connection.
    pub async fn open_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        let store = QueueStore { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query("PRAGMA foreign_keys = ON;").execute(&self.pool).await?;
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS jobs (
                id TEXT PRIMARY KEY,
                kind TEXT NOT NULL,
                parent_id TEXT NULL REFERENCES jobs(id) ON DELETE CASCADE,
                title TEXT,
                artist TEXT,
                quality TEXT NOT NULL,
                status TEXT NOT NULL,
                progress INTEGER NOT NULL DEFAULT 0,
                bytes_downloaded INTEGER NOT NULL DEFAULT 0,
                total_bytes INTEGER,
                error TEXT,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                completed_at INTEGER,
                retry_count INTEGER NOT NULL DEFAULT 0,
                attempt_token TEXT,
                total_tracks INTEGER,
                completed_tracks INTEGER,
                failed_tracks INTEGER
            );
            "#,
        )
        .execute(&self.pool)
        .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS jobs_parent_id ON jobs(parent_id);")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS jobs_status ON jobs(status);")
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

pub(super) fn unix_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}
