use crate::domain::parameters::ParameterSnapshot;
use crate::domain::ports::{CorrelationEvent, MessageRef, PersistencePort};
use crate::domain::position::{Position, PositionStatus, SignalAttribution};
use crate::domain::trade_result::TradeResult;
use crate::domain::types::{EmittedSignal, Side};
use anyhow::{Context, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use uuid::Uuid;

/// SQLite implementation of the persistence port. Decimals travel as
/// TEXT to keep full precision; idempotence rides on the table keys.
pub struct SqlitePersistence {
    pool: SqlitePool,
}

impl SqlitePersistence {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn decimal_column(row: &sqlx::sqlite::SqliteRow, name: &str) -> Result<Decimal> {
    let raw: String = row.try_get(name)?;
    Decimal::from_str(&raw).with_context(|| format!("Malformed decimal in column {}", name))
}

fn position_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Position> {
    let id: String = row.try_get("signal_id")?;
    let side: String = row.try_get("side")?;
    let status: String = row.try_get("status")?;
    let attribution_json: String = row.try_get("attribution_json")?;
    let attribution: SignalAttribution = serde_json::from_str(&attribution_json)
        .context("Malformed attribution_json in positions row")?;
    Ok(Position {
        signal_id: Uuid::parse_str(&id)?,
        user_id: row.try_get("user_id")?,
        symbol: row.try_get("symbol")?,
        side: Side::from_str(&side)?,
        entry: decimal_column(row, "entry")?,
        initial_size: decimal_column(row, "initial_size")?,
        remaining_size: decimal_column(row, "remaining_size")?,
        current_sl: decimal_column(row, "current_sl")?,
        tp1: decimal_column(row, "tp1")?,
        tp2: decimal_column(row, "tp2")?,
        tp1_hit: row.try_get("tp1_hit")?,
        trailing_active: row.try_get("trailing_active")?,
        high_water_mark: decimal_column(row, "high_water_mark")?,
        realized_return_pct: decimal_column(row, "realized_return_pct")?,
        opened_at: row.try_get("opened_at")?,
        last_update: row.try_get("last_update")?,
        status: PositionStatus::from_str(&status)?,
        message_ref: row.try_get("message_ref")?,
        attribution,
    })
}

#[async_trait]
impl PersistencePort for SqlitePersistence {
    async fn save_signal(&self, signal: &EmittedSignal) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO emitted_signals (
                signal_id, user_id, symbol, side, entry, sl, tp1, tp2,
                size_usdt, leverage, pattern, raw_score, regime,
                composite_score, composite_confidence, quality_score,
                pattern_confidence, atr, volatility_pct, candle_t, status,
                message_ref
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(signal.id.to_string())
        .bind(signal.user_id)
        .bind(&signal.candidate.symbol)
        .bind(signal.candidate.side.to_string())
        .bind(signal.candidate.entry.to_string())
        .bind(signal.sl.to_string())
        .bind(signal.tp1.to_string())
        .bind(signal.tp2.to_string())
        .bind(signal.size_usdt.to_string())
        .bind(signal.leverage as i64)
        .bind(signal.candidate.pattern.to_string())
        .bind(signal.candidate.raw_score)
        .bind(signal.candidate.regime_at_gen.to_string())
        .bind(signal.candidate.composite_score)
        .bind(signal.candidate.composite_confidence)
        .bind(signal.candidate.quality_score)
        .bind(signal.candidate.pattern_confidence)
        .bind(signal.candidate.atr.to_string())
        .bind(signal.candidate.volatility_pct)
        .bind(signal.candidate.candle_t)
        .bind(signal.status.to_string())
        .bind(signal.message_ref.as_deref())
        .execute(&self.pool)
        .await
        .context("Failed to save signal")?;

        Ok(result.rows_affected() > 0)
    }

    async fn attach_message_ref(&self, signal_id: Uuid, message_ref: &MessageRef) -> Result<()> {
        sqlx::query("UPDATE emitted_signals SET message_ref = ? WHERE signal_id = ?")
            .bind(&message_ref.0)
            .bind(signal_id.to_string())
            .execute(&self.pool)
            .await
            .context("Failed to attach message ref")?;
        Ok(())
    }

    async fn load_open_positions(&self, user_id: Option<i64>) -> Result<Vec<Position>> {
        let rows = match user_id {
            Some(user_id) => {
                sqlx::query(
                    "SELECT * FROM positions WHERE user_id = ? AND status IN ('OPEN', 'TP1_PARTIAL')",
                )
                .bind(user_id)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query("SELECT * FROM positions WHERE status IN ('OPEN', 'TP1_PARTIAL')")
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        let mut positions = Vec::with_capacity(rows.len());
        for row in &rows {
            positions.push(position_from_row(row)?);
        }
        Ok(positions)
    }

    async fn save_position(&self, position: &Position) -> Result<()> {
        let attribution_json = serde_json::to_string(&position.attribution)?;
        sqlx::query(
            r#"
            INSERT INTO positions (
                signal_id, user_id, symbol, side, entry, initial_size,
                remaining_size, current_sl, tp1, tp2, tp1_hit,
                trailing_active, high_water_mark, realized_return_pct,
                opened_at, last_update, status, message_ref, attribution_json
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(signal_id) DO UPDATE SET
                remaining_size = excluded.remaining_size,
                current_sl = excluded.current_sl,
                tp1_hit = excluded.tp1_hit,
                trailing_active = excluded.trailing_active,
                high_water_mark = excluded.high_water_mark,
                realized_return_pct = excluded.realized_return_pct,
                last_update = excluded.last_update,
                status = excluded.status,
                message_ref = excluded.message_ref
            "#,
        )
        .bind(position.signal_id.to_string())
        .bind(position.user_id)
        .bind(&position.symbol)
        .bind(position.side.to_string())
        .bind(position.entry.to_string())
        .bind(position.initial_size.to_string())
        .bind(position.remaining_size.to_string())
        .bind(position.current_sl.to_string())
        .bind(position.tp1.to_string())
        .bind(position.tp2.to_string())
        .bind(position.tp1_hit)
        .bind(position.trailing_active)
        .bind(position.high_water_mark.to_string())
        .bind(position.realized_return_pct.to_string())
        .bind(position.opened_at)
        .bind(position.last_update)
        .bind(position.status.to_string())
        .bind(position.message_ref.as_deref())
        .bind(attribution_json)
        .execute(&self.pool)
        .await
        .context("Failed to save position")?;
        Ok(())
    }

    async fn save_trade_result(&self, result: &TradeResult) -> Result<bool> {
        let outcome = sqlx::query(
            r#"
            INSERT OR IGNORE INTO trade_results (
                signal_id, user_id, symbol, pattern, side, entry_price,
                exit_price, pnl_pct, is_winner, duration_hours, ai_score,
                market_regime, composite_score, composite_confidence,
                volume_usd, volatility_pct, closed_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(result.signal_id.to_string())
        .bind(result.user_id)
        .bind(&result.symbol)
        .bind(result.pattern.to_string())
        .bind(result.side.to_string())
        .bind(result.entry_price.to_string())
        .bind(result.exit_price.to_string())
        .bind(result.pnl_pct)
        .bind(result.is_winner)
        .bind(result.duration_hours)
        .bind(result.ai_score)
        .bind(result.market_regime.to_string())
        .bind(result.composite_score)
        .bind(result.composite_confidence)
        .bind(result.volume_usd)
        .bind(result.volatility_pct)
        .bind(result.closed_at)
        .execute(&self.pool)
        .await
        .context("Failed to save trade result")?;

        Ok(outcome.rows_affected() > 0)
    }

    async fn load_trade_results_since(&self, since: i64) -> Result<Vec<TradeResult>> {
        let rows = sqlx::query("SELECT * FROM trade_results WHERE closed_at >= ?")
            .bind(since)
            .fetch_all(&self.pool)
            .await?;

        let mut results = Vec::with_capacity(rows.len());
        for row in &rows {
            let id: String = row.try_get("signal_id")?;
            let pattern: String = row.try_get("pattern")?;
            let side: String = row.try_get("side")?;
            let regime: String = row.try_get("market_regime")?;
            results.push(TradeResult {
                signal_id: Uuid::parse_str(&id)?,
                user_id: row.try_get("user_id")?,
                symbol: row.try_get("symbol")?,
                pattern: pattern.parse()?,
                side: Side::from_str(&side)?,
                entry_price: decimal_column(row, "entry_price")?,
                exit_price: decimal_column(row, "exit_price")?,
                pnl_pct: row.try_get("pnl_pct")?,
                is_winner: row.try_get("is_winner")?,
                duration_hours: row.try_get("duration_hours")?,
                ai_score: row.try_get("ai_score")?,
                market_regime: regime.parse()?,
                composite_score: row.try_get("composite_score")?,
                composite_confidence: row.try_get("composite_confidence")?,
                volume_usd: row.try_get("volume_usd")?,
                volatility_pct: row.try_get("volatility_pct")?,
                closed_at: row.try_get("closed_at")?,
            });
        }
        Ok(results)
    }

    async fn publish_parameter_snapshot(&self, snapshot: &ParameterSnapshot) -> Result<()> {
        let blob = serde_json::to_string(snapshot)?;
        sqlx::query(
            r#"
            INSERT INTO parameter_snapshots (version, as_of, blob)
            VALUES (?, ?, ?)
            ON CONFLICT(version) DO UPDATE SET
                as_of = excluded.as_of,
                blob = excluded.blob
            "#,
        )
        .bind(snapshot.version as i64)
        .bind(snapshot.as_of)
        .bind(blob)
        .execute(&self.pool)
        .await
        .context("Failed to publish parameter snapshot")?;
        Ok(())
    }

    async fn load_parameter_snapshot(&self) -> Result<Option<ParameterSnapshot>> {
        let row = sqlx::query(
            "SELECT blob FROM parameter_snapshots ORDER BY version DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let blob: String = row.try_get("blob")?;
                let snapshot = serde_json::from_str(&blob)
                    .context("Malformed parameter snapshot blob")?;
                Ok(Some(snapshot))
            }
            None => Ok(None),
        }
    }

    async fn record_correlation_event(&self, event: &CorrelationEvent) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO correlation_events (user_id, symbol, side, decision, reason, timestamp)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(event.user_id)
        .bind(&event.symbol)
        .bind(event.side.to_string())
        .bind(&event.decision)
        .bind(event.reason.as_deref())
        .bind(event.timestamp)
        .execute(&self.pool)
        .await
        .context("Failed to record correlation event")?;
        Ok(())
    }
}
