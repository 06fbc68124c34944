use crate::domain::performance::StrategyPerformanceRecord;
use crate::domain::repositories::PerformanceRepository;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

pub struct SqlitePerformanceRepository {
    pool: SqlitePool,
}

impl SqlitePerformanceRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PerformanceRepository for SqlitePerformanceRepository {
    async fn upsert(&self, record: &StrategyPerformanceRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO strategy_performance (strategy_id, regime, wins, losses, expired, win_rate, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(strategy_id, regime) DO UPDATE SET
                wins = excluded.wins,
                losses = excluded.losses,
                expired = excluded.expired,
                win_rate = excluded.win_rate,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&record.strategy_id)
        .bind(record.regime.as_str())
        .bind(record.wins as i64)
        .bind(record.losses as i64)
        .bind(record.expired as i64)
        .bind(record.win_rate)
        .bind(record.updated_at.timestamp_millis())
        .execute(&self.pool)
        .await
        .context("Failed to upsert strategy performance")?;

        Ok(())
    }

    async fn load_all(&self) -> Result<Vec<StrategyPerformanceRecord>> {
        let rows = sqlx::query("SELECT * FROM strategy_performance")
            .fetch_all(&self.pool)
            .await
            .context("Failed to load strategy performance")?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let regime: String = row.try_get("regime")?;
            let updated_at: i64 = row.try_get("updated_at")?;
            records.push(StrategyPerformanceRecord {
                strategy_id: row.try_get("strategy_id")?,
                regime: regime.parse()?,
                wins: row.try_get::<i64, _>("wins")? as u32,
                losses: row.try_get::<i64, _>("losses")? as u32,
                expired: row.try_get::<i64, _>("expired")? as u32,
                win_rate: row.try_get("win_rate")?,
                updated_at: DateTime::from_timestamp_millis(updated_at).unwrap_or_else(Utc::now),
            });
        }
        Ok(records)
    }
}
