//! SQLite database connection pool and migration runner.

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;

use super::seed::seed_calendar;
use crate::config::StoreConfig;
use crate::error::{StorageContext, StoreError};
use crate::record::Rules;

/// Calendar span used by in-memory test databases: all of 2023 and 2024.
#[cfg(test)]
pub(crate) const TEST_CALENDAR_DAYS: u32 = 731;

/// Holds a connection pool to the SQLite database.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
    rules: Rules,
}

impl Database {
    /// Open (or create) the database at `path`, run migrations, seed the
    /// calendar, and return a ready-to-use `Database`.
    #[tracing::instrument(level = "info", skip(config))]
    pub async fn open(path: &Path, config: &StoreConfig) -> Result<Self, StoreError> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))
            .context("database", "open")?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .context("database", "open")?;

        Self::prepare(pool, config).await
    }

    /// Open a private in-memory database with `config`. Migrations and
    /// seeding are applied.
    pub async fn open_in_memory(config: &StoreConfig) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .context("database", "open")?
            .foreign_keys(true);

        // One connection that never idles out, or the database would vanish
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .context("database", "open")?;

        Self::prepare(pool, config).await
    }

    /// In-memory database with a two-year calendar, for tests.
    #[cfg(test)]
    pub async fn new_in_memory() -> Result<Self, StoreError> {
        let config = StoreConfig::default().with_calendar_days(TEST_CALENDAR_DAYS);
        Self::open_in_memory(&config).await
    }

    async fn prepare(pool: SqlitePool, config: &StoreConfig) -> Result<Self, StoreError> {
        let db = Self {
            pool,
            rules: Rules {
                allow_zero_counts: config.allow_zero_shifts_off,
            },
        };
        db.run_migrations().await?;
        seed_calendar(&db.pool, config.calendar_start, config.calendar_days).await?;
        Ok(db)
    }

    /// Run embedded migrations from `store/migrations/`.
    async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Migration(e.to_string()))?;
        tracing::info!("Schema migrations applied");
        Ok(())
    }

    /// Get a reference to the underlying pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Validation rules derived from the configuration.
    pub fn rules(&self) -> Rules {
        self.rules
    }
}
