use crate::domain::performance::WeightSnapshot;
use crate::domain::repositories::WeightRepository;
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use tracing::debug;

/// Stores the weight vector and momentum as one JSON blob in a single row.
pub struct SqliteWeightRepository {
    pool: SqlitePool,
}

impl SqliteWeightRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WeightRepository for SqliteWeightRepository {
    async fn save(&self, snapshot: &WeightSnapshot) -> Result<()> {
        let payload = serde_json::to_string(snapshot).context("Failed to serialize weights")?;

        sqlx::query(
            r#"
            INSERT INTO weight_vector (id, version, payload, updated_at)
            VALUES (1, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                version = excluded.version,
                payload = excluded.payload,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(snapshot.vector.version as i64)
        .bind(payload)
        .bind(snapshot.vector.updated_at.timestamp_millis())
        .execute(&self.pool)
        .await
        .context("Failed to save weight vector")?;

        debug!("Persisted weight vector v{}", snapshot.vector.version);
        Ok(())
    }

    async fn load(&self) -> Result<Option<WeightSnapshot>> {
        let row = sqlx::query("SELECT payload FROM weight_vector WHERE id = 1")
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let payload: String = row.try_get("payload")?;
                let snapshot = serde_json::from_str(&payload).context("Invalid weight payload")?;
                Ok(Some(snapshot))
            }
            None => Ok(None),
        }
    }
}
