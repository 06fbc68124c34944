use anyhow::{Context, Result};

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use tokio::fs;
use tracing::info;

/// Shared SQLite pool with the pipeline schema applied.
#[derive(Clone)]
pub struct Database {
    pub pool: SqlitePool,
}

impl Database {
    pub async fn new(db_url: &str) -> Result<Self> {
        // Ensure the directory exists if it's a file path
        if let Some(path_part) = db_url.strip_prefix("sqlite://")
            && !path_part.starts_with(':')
        {
            let path = Path::new(path_part);
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
                && !parent.exists()
            {
                fs::create_dir_all(parent)
                    .await
                    .context("Failed to create database directory")?;
            }
        }

        let in_memory = db_url.contains(":memory:");
        let options = SqliteConnectOptions::from_str(db_url)?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        // Each in-memory connection is its own database
        let max_connections = if in_memory { 1 } else { 5 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .context("Failed to connect to SQLite database")?;

        info!("Connected to database: {}", db_url);

        let db = Self { pool };
        db.init().await?;

        Ok(db)
    }

    /// In-memory database, used by tests
    pub async fn in_memory() -> Result<Self> {
        Self::new("sqlite::memory:").await
    }

    /// Initialize database schema
    async fn init(&self) -> Result<()> {
        let mut conn = self.pool.acquire().await?;

        // 1. Published signals
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS signals (
                id TEXT PRIMARY KEY,
                symbol TEXT NOT NULL,
                direction TEXT NOT NULL,
                entry TEXT NOT NULL,
                stop_loss TEXT NOT NULL,
                targets TEXT NOT NULL,
                confidence REAL NOT NULL,
                quality_score REAL NOT NULL,
                quality_tier TEXT NOT NULL,
                strategy_id TEXT NOT NULL,
                contributors TEXT NOT NULL,
                regime TEXT NOT NULL,
                position_size_multiplier REAL NOT NULL,
                created_at INTEGER NOT NULL,
                expires_at INTEGER NOT NULL,
                status TEXT NOT NULL,
                exit_price TEXT,
                hit_target INTEGER,
                profit_loss_percent TEXT,
                completed_at INTEGER,
                note TEXT
            );
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("Failed to create signals table")?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_signals_status ON signals (status);")
            .execute(&mut *conn)
            .await
            .context("Failed to create signal status index")?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_signals_expires_at ON signals (expires_at);")
            .execute(&mut *conn)
            .await
            .context("Failed to create signal expiry index")?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_signals_created_at ON signals (created_at);")
            .execute(&mut *conn)
            .await
            .context("Failed to create signal creation index")?;

        // 2. Per (strategy, regime) outcome tallies
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS strategy_performance (
                strategy_id TEXT NOT NULL,
                regime TEXT NOT NULL,
                wins INTEGER NOT NULL,
                losses INTEGER NOT NULL,
                expired INTEGER NOT NULL,
                win_rate REAL NOT NULL,
                updated_at INTEGER NOT NULL,
                PRIMARY KEY (strategy_id, regime)
            );
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("Failed to create strategy_performance table")?;

        // 3. Learned weights: single versioned row
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS weight_vector (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                version INTEGER NOT NULL,
                payload TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            );
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("Failed to create weight_vector table")?;

        info!("Database schema initialized");
        Ok(())
    }
}
