//! Repository abstractions
//!
//! Storage-agnostic traits for the three pieces of durable pipeline state:
//! - `SignalRepository`: published signals and their terminal outcome
//! - `PerformanceRepository`: per `(strategy, regime)` win/loss records
//! - `WeightRepository`: the versioned weight vector + momentum blob
//!
//! SQLite implementations live in `infrastructure::persistence`, in-memory
//! ones (`Arc<RwLock>`) in `infrastructure::repositories`.
//!
//! # Example
//!
//! ```rust,no_run
//! use ignitex::domain::repositories::SignalRepository;
//! use ignitex::infrastructure::repositories::InMemorySignalRepository;
//!
//! # async {
//! let repo = InMemorySignalRepository::new();
//! let active = repo.find_active().await.unwrap();
//! assert!(active.is_empty());
//! # };
//! ```

use crate::domain::performance::{StrategyPerformanceRecord, WeightSnapshot};
use crate::domain::signals::{Signal, SignalCompletion};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

#[async_trait]
pub trait SignalRepository: Send + Sync {
    /// Persist a newly published signal
    async fn save(&self, signal: &Signal) -> Result<()>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Signal>>;

    /// All signals still ACTIVE, oldest first
    async fn find_active(&self) -> Result<Vec<Signal>>;

    async fn has_active_for_symbol(&self, symbol: &str) -> Result<bool>;

    /// Atomic ACTIVE -> terminal transition. Returns `false` when the
    /// signal was not ACTIVE any more (someone else completed it).
    async fn complete(&self, id: Uuid, completion: &SignalCompletion) -> Result<bool>;

    /// Creation times of signals published at or after `since`
    async fn published_since(&self, since: DateTime<Utc>) -> Result<Vec<DateTime<Utc>>>;

    async fn find_recent(&self, limit: usize) -> Result<Vec<Signal>>;
}

#[async_trait]
pub trait PerformanceRepository: Send + Sync {
    async fn upsert(&self, record: &StrategyPerformanceRecord) -> Result<()>;

    async fn load_all(&self) -> Result<Vec<StrategyPerformanceRecord>>;
}

#[async_trait]
pub trait WeightRepository: Send + Sync {
    async fn save(&self, snapshot: &WeightSnapshot) -> Result<()>;

    async fn load(&self) -> Result<Option<WeightSnapshot>>;
}
