use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use tokio::fs;
use tracing::info;

/// SQLite-backed storage. WAL mode for concurrent readers against the
/// single writer.
#[derive(Clone)]
pub struct Database {
    pub pool: SqlitePool,
}

impl Database {
    pub async fn new(db_url: &str) -> Result<Self> {
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

    async fn init(&self) -> Result<()> {
        let mut conn = self.pool.acquire().await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS emitted_signals (
                signal_id TEXT PRIMARY KEY,
                user_id INTEGER NOT NULL,
                symbol TEXT NOT NULL,
                side TEXT NOT NULL,
                entry TEXT NOT NULL,
                sl TEXT NOT NULL,
                tp1 TEXT NOT NULL,
                tp2 TEXT NOT NULL,
                size_usdt TEXT NOT NULL,
                leverage INTEGER NOT NULL,
                pattern TEXT NOT NULL,
                raw_score REAL NOT NULL,
                regime TEXT NOT NULL,
                composite_score REAL NOT NULL,
                composite_confidence REAL NOT NULL,
                quality_score REAL NOT NULL,
                pattern_confidence REAL NOT NULL,
                atr TEXT NOT NULL,
                volatility_pct REAL NOT NULL,
                candle_t INTEGER NOT NULL,
                status TEXT NOT NULL,
                message_ref TEXT,
                UNIQUE (user_id, symbol, side, candle_t)
            );
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("Failed to create emitted_signals table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS positions (
                signal_id TEXT PRIMARY KEY,
                user_id INTEGER NOT NULL,
                symbol TEXT NOT NULL,
                side TEXT NOT NULL,
                entry TEXT NOT NULL,
                initial_size TEXT NOT NULL,
                remaining_size TEXT NOT NULL,
                current_sl TEXT NOT NULL,
                tp1 TEXT NOT NULL,
                tp2 TEXT NOT NULL,
                tp1_hit INTEGER NOT NULL DEFAULT 0,
                trailing_active INTEGER NOT NULL DEFAULT 0,
                high_water_mark TEXT NOT NULL,
                realized_return_pct TEXT NOT NULL,
                opened_at INTEGER NOT NULL,
                last_update INTEGER NOT NULL,
                status TEXT NOT NULL,
                message_ref TEXT,
                attribution_json TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_positions_user_status
            ON positions (user_id, status);
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("Failed to create positions table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS trade_results (
                signal_id TEXT PRIMARY KEY,
                user_id INTEGER NOT NULL,
                symbol TEXT NOT NULL,
                pattern TEXT NOT NULL,
                side TEXT NOT NULL,
                entry_price TEXT NOT NULL,
                exit_price TEXT NOT NULL,
                pnl_pct REAL NOT NULL,
                is_winner INTEGER NOT NULL,
                duration_hours REAL NOT NULL,
                ai_score REAL NOT NULL,
                market_regime TEXT NOT NULL,
                composite_score REAL NOT NULL,
                composite_confidence REAL NOT NULL,
                volume_usd REAL NOT NULL,
                volatility_pct REAL NOT NULL,
                closed_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_trade_results_closed_at
            ON trade_results (closed_at);
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("Failed to create trade_results table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS parameter_snapshots (
                version INTEGER PRIMARY KEY,
                as_of INTEGER NOT NULL,
                blob TEXT NOT NULL
            );
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("Failed to create parameter_snapshots table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS correlation_events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                symbol TEXT NOT NULL,
                side TEXT NOT NULL,
                decision TEXT NOT NULL,
                reason TEXT,
                timestamp INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_correlation_events_user
            ON correlation_events (user_id, timestamp);
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("Failed to create correlation_events table")?;

        Ok(())
    }
}
