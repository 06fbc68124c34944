use crate::domain::market::RegimeType;
use crate::domain::signals::SignalStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Win/loss tally of one strategy in one regime.
///
/// Counters only ever increase. EXPIRED outcomes are tallied separately and
/// do not move the win rate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyPerformanceRecord {
    pub strategy_id: String,
    pub regime: RegimeType,
    pub wins: u32,
    pub losses: u32,
    pub expired: u32,
    pub win_rate: f64,
    pub updated_at: DateTime<Utc>,
}

impl StrategyPerformanceRecord {
    pub fn new(strategy_id: impl Into<String>, regime: RegimeType, now: DateTime<Utc>) -> Self {
        Self {
            strategy_id: strategy_id.into(),
            regime,
            wins: 0,
            losses: 0,
            expired: 0,
            win_rate: 0.0,
            updated_at: now,
        }
    }

    /// Decided outcomes (wins + losses).
    pub fn samples(&self) -> u32 {
        self.wins + self.losses
    }

    /// All outcomes including expiries.
    pub fn total(&self) -> u32 {
        self.wins + self.losses + self.expired
    }

    pub fn record(&mut self, status: SignalStatus, now: DateTime<Utc>) {
        match status {
            SignalStatus::Success => self.wins += 1,
            SignalStatus::Failed => self.losses += 1,
            SignalStatus::Expired => self.expired += 1,
            SignalStatus::Active => return,
        }
        let samples = self.samples();
        self.win_rate = if samples == 0 {
            0.0
        } else {
            self.wins as f64 / samples as f64
        };
        self.updated_at = now;
    }
}

/// Read-only snapshot of every `(strategy, regime)` record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PerformanceBook {
    records: HashMap<(String, RegimeType), StrategyPerformanceRecord>,
}

impl PerformanceBook {
    pub fn from_records(records: Vec<StrategyPerformanceRecord>) -> Self {
        let records = records
            .into_iter()
            .map(|r| ((r.strategy_id.clone(), r.regime), r))
            .collect();
        Self { records }
    }

    pub fn get(&self, strategy_id: &str, regime: RegimeType) -> Option<&StrategyPerformanceRecord> {
        self.records.get(&(strategy_id.to_string(), regime))
    }

    /// Observed win rate once the record holds at least `min_samples`
    /// decided outcomes; `None` means "not enough history".
    pub fn win_rate_for(&self, strategy_id: &str, regime: RegimeType, min_samples: u32) -> Option<f64> {
        self.get(strategy_id, regime)
            .filter(|r| r.samples() >= min_samples.max(1))
            .map(|r| r.win_rate)
    }

    /// Outcomes of one strategy across all regimes.
    pub fn total_outcomes(&self, strategy_id: &str) -> u32 {
        self.records
            .values()
            .filter(|r| r.strategy_id == strategy_id)
            .map(|r| r.total())
            .sum()
    }

    pub fn upsert(&mut self, record: StrategyPerformanceRecord) {
        self.records
            .insert((record.strategy_id.clone(), record.regime), record);
    }

    pub fn records(&self) -> impl Iterator<Item = &StrategyPerformanceRecord> {
        self.records.values()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
