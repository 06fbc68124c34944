//! In-Memory Repository Implementations
//!
//! Thread-safe, in-memory implementations of the repository traits defined
//! in `domain::repositories`, backed by `Arc<RwLock>`.
//!
//! Used by the tests and by the mock mode of the server. Data is lost on
//! restart unless the same instance is shared.
//!
//! The signal and weight repositories can be told to fail the next N saves,
//! which is how the retry paths are exercised.

use crate::domain::performance::{StrategyPerformanceRecord, WeightSnapshot};
use crate::domain::repositories::{PerformanceRepository, SignalRepository, WeightRepository};
use crate::domain::signals::{Signal, SignalCompletion};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;
use uuid::Uuid;

/// In-memory implementation of SignalRepository
#[derive(Clone)]
pub struct InMemorySignalRepository {
    signals: Arc<RwLock<Vec<Signal>>>,
    failing_saves: Arc<AtomicUsize>,
}

impl InMemorySignalRepository {
    pub fn new() -> Self {
        Self {
            signals: Arc::new(RwLock::new(Vec::new())),
            failing_saves: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Makes the next `count` calls to `save` fail.
    pub fn fail_next_saves(&self, count: usize) {
        self.failing_saves.store(count, Ordering::SeqCst);
    }

    pub async fn all(&self) -> Vec<Signal> {
        self.signals.read().await.clone()
    }
}

impl Default for InMemorySignalRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SignalRepository for InMemorySignalRepository {
    async fn save(&self, signal: &Signal) -> Result<()> {
        let pending_failures = self.failing_saves.load(Ordering::SeqCst);
        if pending_failures > 0 {
            self.failing_saves.store(pending_failures - 1, Ordering::SeqCst);
            anyhow::bail!("simulated storage failure");
        }

        let mut signals = self.signals.write().await;
        if signals.iter().any(|s| s.id == signal.id) {
            anyhow::bail!("Signal {} already exists", signal.id);
        }
        signals.push(signal.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Signal>> {
        let signals = self.signals.read().await;
        Ok(signals.iter().find(|s| s.id == id).cloned())
    }

    async fn find_active(&self) -> Result<Vec<Signal>> {
        let signals = self.signals.read().await;
        let mut active: Vec<Signal> = signals.iter().filter(|s| s.is_active()).cloned().collect();
        active.sort_by_key(|s| s.created_at);
        Ok(active)
    }

    async fn has_active_for_symbol(&self, symbol: &str) -> Result<bool> {
        let signals = self.signals.read().await;
        Ok(signals.iter().any(|s| s.is_active() && s.symbol == symbol))
    }

    async fn complete(&self, id: Uuid, completion: &SignalCompletion) -> Result<bool> {
        // Write lock makes the status check and the update one step
        let mut signals = self.signals.write().await;
        match signals.iter_mut().find(|s| s.id == id) {
            Some(signal) => Ok(signal.apply(completion).is_ok()),
            None => Ok(false),
        }
    }

    async fn published_since(&self, since: DateTime<Utc>) -> Result<Vec<DateTime<Utc>>> {
        let signals = self.signals.read().await;
        let mut times: Vec<DateTime<Utc>> = signals
            .iter()
            .map(|s| s.created_at)
            .filter(|t| *t >= since)
            .collect();
        times.sort();
        Ok(times)
    }

    async fn find_recent(&self, limit: usize) -> Result<Vec<Signal>> {
        let signals = self.signals.read().await;
        let mut recent = signals.clone();
        recent.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        recent.truncate(limit);
        Ok(recent)
    }
}

/// In-memory implementation of PerformanceRepository
#[derive(Clone, Default)]
pub struct InMemoryPerformanceRepository {
    records: Arc<RwLock<HashMap<(String, String), StrategyPerformanceRecord>>>,
}

impl InMemoryPerformanceRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PerformanceRepository for InMemoryPerformanceRepository {
    async fn upsert(&self, record: &StrategyPerformanceRecord) -> Result<()> {
        self.records.write().await.insert(
            (record.strategy_id.clone(), record.regime.as_str().to_string()),
            record.clone(),
        );
        Ok(())
    }

    async fn load_all(&self) -> Result<Vec<StrategyPerformanceRecord>> {
        Ok(self.records.read().await.values().cloned().collect())
    }
}

/// In-memory implementation of WeightRepository
#[derive(Clone, Default)]
pub struct InMemoryWeightRepository {
    snapshot: Arc<RwLock<Option<WeightSnapshot>>>,
    failing_saves: Arc<AtomicUsize>,
}

impl InMemoryWeightRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` calls to `save` fail.
    pub fn fail_next_saves(&self, count: usize) {
        self.failing_saves.store(count, Ordering::SeqCst);
    }
}

#[async_trait]
impl WeightRepository for InMemoryWeightRepository {
    async fn save(&self, snapshot: &WeightSnapshot) -> Result<()> {
        let pending_failures = self.failing_saves.load(Ordering::SeqCst);
        if pending_failures > 0 {
            self.failing_saves.store(pending_failures - 1, Ordering::SeqCst);
            anyhow::bail!("simulated storage failure");
        }
        *self.snapshot.write().await = Some(snapshot.clone());
        Ok(())
    }

    async fn load(&self) -> Result<Option<WeightSnapshot>> {
        Ok(self.snapshot.read().await.clone())
    }
}
