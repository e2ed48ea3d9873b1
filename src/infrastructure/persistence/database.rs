use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use tokio::fs;
use tracing::info;

/// SQLite-backed audit store.
#[derive(Clone)]
pub struct Database {
    pub pool: SqlitePool,
}

impl Database {
    pub async fn new(db_url: &str) -> Result<Self> {
        // Ensure the directory exists if it's a file path
        if let Some(path_part) = db_url.strip_prefix("sqlite://") {
            let path = Path::new(path_part);
            if let Some(parent) = path.parent()
                && !parent.exists()
            {
                fs::create_dir_all(parent)
                    .await
                    .context("Failed to create database directory")?;
            }
        }

        let options = SqliteConnectOptions::from_str(db_url)?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .context("Failed to connect to SQLite database")?;

        info!("Connected to database: {}", db_url);

        let db = Self { pool };
        db.init().await?;

        Ok(db)
    }

    /// Initialize the audit schema: one parent row per reasoning session,
    /// zero or more child trade rows. The symbol column on trades is a
    /// closed enum; additions require a migration.
    async fn init(&self) -> Result<()> {
        let mut conn = self.pool.acquire().await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS reasoning_sessions (
                id TEXT PRIMARY KEY,
                symbol TEXT NOT NULL,
                prompt TEXT NOT NULL,
                reasoning TEXT NOT NULL,
                start_time INTEGER NOT NULL,
                end_time INTEGER NOT NULL,
                success BOOLEAN NOT NULL,
                error TEXT,
                created_at INTEGER DEFAULT (strftime('%s', 'now'))
            );
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("Failed to create reasoning_sessions table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS trades (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL REFERENCES reasoning_sessions(id),
                symbol TEXT NOT NULL CHECK (symbol IN ('BTC','ETH','BNB','SOL','DOGE')),
                operation TEXT NOT NULL CHECK (operation IN ('Buy','Sell','Hold')),
                leverage INTEGER,
                amount TEXT,
                pricing TEXT,
                stop_loss TEXT,
                take_profit TEXT,
                created_at INTEGER DEFAULT (strftime('%s', 'now'))
            );
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("Failed to create trades table")?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_sessions_symbol_time
            ON reasoning_sessions (symbol, start_time);
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("Failed to create session index")?;

        info!("Database schema initialized.");
        Ok(())
    }
}
