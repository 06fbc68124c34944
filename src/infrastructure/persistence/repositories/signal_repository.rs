use crate::domain::repositories::SignalRepository;
use crate::domain::signals::{Signal, SignalCompletion, SignalStatus};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info};
use uuid::Uuid;

pub struct SqliteSignalRepository {
    pool: SqlitePool,
}

impl SqliteSignalRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn to_millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

fn from_millis(ms: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms).context(format!("Invalid timestamp {}", ms))
}

fn parse_decimal(raw: &str) -> Result<Decimal> {
    Decimal::from_str(raw).context(format!("Invalid decimal '{}'", raw))
}

fn map_signal(row: &SqliteRow) -> Result<Signal> {
    let id: String = row.try_get("id")?;
    let targets_json: String = row.try_get("targets")?;
    let contributors_json: String = row.try_get("contributors")?;
    let exit_price: Option<String> = row.try_get("exit_price")?;
    let pnl: Option<String> = row.try_get("profit_loss_percent")?;
    let hit_target: Option<i64> = row.try_get("hit_target")?;
    let completed_at: Option<i64> = row.try_get("completed_at")?;

    Ok(Signal {
        id: Uuid::parse_str(&id).context("Invalid signal id")?,
        symbol: row.try_get("symbol")?,
        direction: row.try_get::<String, _>("direction")?.parse()?,
        entry: parse_decimal(&row.try_get::<String, _>("entry")?)?,
        stop_loss: parse_decimal(&row.try_get::<String, _>("stop_loss")?)?,
        targets: serde_json::from_str(&targets_json).context("Invalid targets payload")?,
        confidence: row.try_get("confidence")?,
        quality_score: row.try_get("quality_score")?,
        quality_tier: row.try_get::<String, _>("quality_tier")?.parse()?,
        strategy_id: row.try_get("strategy_id")?,
        contributors: serde_json::from_str(&contributors_json)
            .context("Invalid contributors payload")?,
        regime: row.try_get::<String, _>("regime")?.parse()?,
        position_size_multiplier: row.try_get("position_size_multiplier")?,
        created_at: from_millis(row.try_get("created_at")?)?,
        expires_at: from_millis(row.try_get("expires_at")?)?,
        status: row.try_get::<String, _>("status")?.parse()?,
        exit_price: exit_price.as_deref().map(parse_decimal).transpose()?,
        hit_target: hit_target.map(|t| t as u8),
        profit_loss_percent: pnl.as_deref().map(parse_decimal).transpose()?,
        completed_at: completed_at.map(from_millis).transpose()?,
        note: row.try_get("note")?,
    })
}

#[async_trait]
impl SignalRepository for SqliteSignalRepository {
    async fn save(&self, signal: &Signal) -> Result<()> {
        let targets = serde_json::to_string(&signal.targets)?;
        let contributors = serde_json::to_string(&signal.contributors)?;

        sqlx::query(
            r#"
            INSERT INTO signals (
                id, symbol, direction, entry, stop_loss, targets, confidence,
                quality_score, quality_tier, strategy_id, contributors, regime,
                position_size_multiplier, created_at, expires_at, status,
                exit_price, hit_target, profit_loss_percent, completed_at, note
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(signal.id.to_string())
        .bind(&signal.symbol)
        .bind(signal.direction.as_str())
        .bind(signal.entry.to_string())
        .bind(signal.stop_loss.to_string())
        .bind(targets)
        .bind(signal.confidence)
        .bind(signal.quality_score)
        .bind(signal.quality_tier.as_str())
        .bind(&signal.strategy_id)
        .bind(contributors)
        .bind(signal.regime.as_str())
        .bind(signal.position_size_multiplier)
        .bind(to_millis(signal.created_at))
        .bind(to_millis(signal.expires_at))
        .bind(signal.status.as_str())
        .bind(signal.exit_price.map(|p| p.to_string()))
        .bind(signal.hit_target.map(|t| t as i64))
        .bind(signal.profit_loss_percent.map(|p| p.to_string()))
        .bind(signal.completed_at.map(to_millis))
        .bind(&signal.note)
        .execute(&self.pool)
        .await
        .context("Failed to save signal")?;

        info!("Persisted signal {} for {}", signal.id, signal.symbol);
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Signal>> {
        let row = sqlx::query("SELECT * FROM signals WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(map_signal).transpose()
    }

    async fn find_active(&self) -> Result<Vec<Signal>> {
        let rows = sqlx::query("SELECT * FROM signals WHERE status = ? ORDER BY created_at ASC")
            .bind(SignalStatus::Active.as_str())
            .fetch_all(&self.pool)
            .await
            .context("Failed to load active signals")?;

        rows.iter().map(map_signal).collect()
    }

    async fn has_active_for_symbol(&self, symbol: &str) -> Result<bool> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM signals WHERE status = ? AND symbol = ?")
            .bind(SignalStatus::Active.as_str())
            .bind(symbol)
            .fetch_one(&self.pool)
            .await?;
        let n: i64 = row.try_get("n")?;
        Ok(n > 0)
    }

    async fn complete(&self, id: Uuid, completion: &SignalCompletion) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE signals SET
                status = ?,
                exit_price = ?,
                hit_target = ?,
                profit_loss_percent = ?,
                completed_at = ?,
                note = ?
            WHERE id = ? AND status = ?
            "#,
        )
        .bind(completion.status.as_str())
        .bind(completion.exit_price.map(|p| p.to_string()))
        .bind(completion.hit_target.map(|t| t as i64))
        .bind(completion.profit_loss_percent.map(|p| p.to_string()))
        .bind(to_millis(completion.completed_at))
        .bind(&completion.note)
        .bind(id.to_string())
        .bind(SignalStatus::Active.as_str())
        .execute(&self.pool)
        .await
        .context("Failed to complete signal")?;

        let applied = result.rows_affected() == 1;
        if !applied {
            debug!("Signal {} was no longer ACTIVE, completion skipped", id);
        }
        Ok(applied)
    }

    async fn published_since(&self, since: DateTime<Utc>) -> Result<Vec<DateTime<Utc>>> {
        let rows = sqlx::query(
            "SELECT created_at FROM signals WHERE created_at >= ? ORDER BY created_at ASC",
        )
        .bind(to_millis(since))
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| from_millis(row.try_get("created_at")?))
            .collect()
    }

    async fn find_recent(&self, limit: usize) -> Result<Vec<Signal>> {
        let rows = sqlx::query("SELECT * FROM signals ORDER BY created_at DESC LIMIT ?")
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(map_signal).collect()
    }
}
