//! Learning feedback engine.
//!
//! Single writer of the performance book and the weight vector. Each
//! terminal outcome updates the `(strategy, regime)` records of every
//! credited strategy, steps the weight optimizer and feeds the rolling
//! win-rate breaker. New state is persisted, then published through watch
//! channels so the consensus aggregator and the quality gate only ever see
//! complete, stored snapshots.

use super::weight_optimizer::WeightOptimizer;
use crate::application::strategies::{DisableReason, StrategyRegistry};
use crate::config::LearningConfig;
use crate::domain::performance::{PerformanceBook, StrategyPerformanceRecord, WeightSnapshot};
use crate::domain::repositories::{PerformanceRepository, WeightRepository};
use crate::domain::signals::{Signal, SignalOutcome, SignalStatus};
use crate::infrastructure::observability::Metrics;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc, watch};
use tracing::{info, warn};

pub struct FeedbackEngine {
    optimizer: WeightOptimizer,
    perf_repo: Arc<dyn PerformanceRepository>,
    weight_repo: Arc<dyn WeightRepository>,
    registry: Arc<StrategyRegistry>,
    book_tx: watch::Sender<Arc<PerformanceBook>>,
    weights_tx: watch::Sender<Arc<WeightSnapshot>>,
    /// Rolling decided outcomes per strategy, `true` for a win
    windows: Mutex<HashMap<String, VecDeque<bool>>>,
    /// Outcomes whose state could not be stored yet
    pending: Mutex<VecDeque<(SignalOutcome, DateTime<Utc>)>>,
    metrics: Option<Metrics>,
}

impl FeedbackEngine {
    /// Restores the book and the weight snapshot from storage. Strategies
    /// missing from a stored vector join at the equal weight.
    pub async fn load(
        config: LearningConfig,
        perf_repo: Arc<dyn PerformanceRepository>,
        weight_repo: Arc<dyn WeightRepository>,
        registry: Arc<StrategyRegistry>,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        let records = perf_repo
            .load_all()
            .await
            .context("Failed to load strategy performance records")?;
        let book = PerformanceBook::from_records(records);

        let ids = registry.strategy_ids();
        let snapshot = match weight_repo
            .load()
            .await
            .context("Failed to load weight snapshot")?
        {
            Some(mut stored) => {
                let before = stored.vector.weights.len();
                stored.vector.ensure_strategies(ids.as_slice());
                for id in &ids {
                    stored.momentum.entry(id.clone()).or_insert(0.0);
                }
                if stored.vector.weights.len() != before {
                    let pinned: BTreeSet<String> = stored
                        .vector
                        .weights
                        .keys()
                        .filter(|id| book.total_outcomes(id) < config.min_samples)
                        .cloned()
                        .collect();
                    stored
                        .vector
                        .renormalize(&pinned, config.min_weight, config.max_weight);
                }
                stored
            }
            None => WeightSnapshot::initial(ids.as_slice(), now),
        };

        info!(
            "FeedbackEngine: loaded {} performance records, weights v{}",
            book.len(),
            snapshot.vector.version
        );

        let (book_tx, _) = watch::channel(Arc::new(book));
        let (weights_tx, _) = watch::channel(Arc::new(snapshot));

        Ok(Self {
            optimizer: WeightOptimizer::new(config),
            perf_repo,
            weight_repo,
            registry,
            book_tx,
            weights_tx,
            windows: Mutex::new(HashMap::new()),
            pending: Mutex::new(VecDeque::new()),
            metrics: None,
        })
    }

    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        let snapshot = self.current_weights();
        for (id, w) in &snapshot.vector.weights {
            metrics.set_strategy_weight(id, *w);
        }
        self.metrics = Some(metrics);
        self
    }

    pub fn book_receiver(&self) -> watch::Receiver<Arc<PerformanceBook>> {
        self.book_tx.subscribe()
    }

    pub fn weights_receiver(&self) -> watch::Receiver<Arc<WeightSnapshot>> {
        self.weights_tx.subscribe()
    }

    pub fn current_weights(&self) -> Arc<WeightSnapshot> {
        self.weights_tx.borrow().clone()
    }

    pub fn current_book(&self) -> Arc<PerformanceBook> {
        self.book_tx.borrow().clone()
    }

    /// Seeds the breaker windows from stored signals (any order).
    pub async fn restore_breaker_windows(&self, signals: &[Signal]) {
        let mut completed: Vec<&Signal> = signals
            .iter()
            .filter(|s| matches!(s.status, SignalStatus::Success | SignalStatus::Failed))
            .collect();
        completed.sort_by_key(|s| s.completed_at.unwrap_or(s.created_at));

        let window_len = self.optimizer.config().breaker_window.max(1);
        let mut windows = self.windows.lock().await;
        for signal in completed {
            let won = signal.status == SignalStatus::Success;
            let contributors = signal.outcome().map(|o| o.credited_strategies()).unwrap_or_default();
            for id in contributors {
                push_bounded(windows.entry(id).or_default(), won, window_len);
            }
        }
        info!("FeedbackEngine: breaker windows restored for {} strategies", windows.len());
    }

    /// Folds one terminal outcome into the learning state.
    ///
    /// State is published only after it has been stored. When storage
    /// fails the outcome is kept, the published snapshots stay where they
    /// were, and the error is returned; the next call retries the kept
    /// outcomes first, in arrival order.
    pub async fn process(&self, outcome: &SignalOutcome, now: DateTime<Utc>) -> Result<Arc<WeightSnapshot>> {
        if !outcome.status.is_terminal() {
            anyhow::bail!("Outcome of {} is not terminal", outcome.signal_id);
        }
        // One outcome at a time; the window lock doubles as the writer lock
        let mut windows = self.windows.lock().await;
        let mut pending = self.pending.lock().await;
        pending.push_back((outcome.clone(), now));

        let mut latest = self.current_weights();
        while let Some((next_outcome, at)) = pending.pop_front() {
            match self.apply(&mut *windows, &next_outcome, at).await {
                Ok(snapshot) => latest = snapshot,
                Err(e) => {
                    pending.push_front((next_outcome, at));
                    return Err(e.context(format!(
                        "Learning state not stored, {} outcome(s) held for retry",
                        pending.len()
                    )));
                }
            }
        }
        Ok(latest)
    }

    /// Outcomes waiting for storage to recover.
    pub async fn pending_outcomes(&self) -> usize {
        self.pending.lock().await.len()
    }

    async fn apply(
        &self,
        windows: &mut HashMap<String, VecDeque<bool>>,
        outcome: &SignalOutcome,
        now: DateTime<Utc>,
    ) -> Result<Arc<WeightSnapshot>> {
        let credited = outcome.credited_strategies();

        let mut book = (**self.book_tx.borrow()).clone();
        let mut touched = Vec::with_capacity(credited.len());
        for id in &credited {
            let mut record = book
                .get(id, outcome.regime)
                .cloned()
                .unwrap_or_else(|| StrategyPerformanceRecord::new(id.clone(), outcome.regime, now));
            record.record(outcome.status, now);
            book.upsert(record.clone());
            touched.push(record);
        }

        let current = self.weights_tx.borrow().clone();
        let next = self.optimizer.apply(&current, outcome, &book, now);

        // Upserts are computed from the published book, so a retry rewrites
        // the same rows
        for record in &touched {
            self.perf_repo.upsert(record).await.with_context(|| {
                format!(
                    "Failed to persist record {}/{}",
                    record.strategy_id, record.regime
                )
            })?;
        }
        self.weight_repo
            .save(&next)
            .await
            .with_context(|| format!("Failed to persist weights v{}", next.vector.version))?;

        self.book_tx.send_replace(Arc::new(book));
        let next = Arc::new(next);
        self.weights_tx.send_replace(next.clone());

        if let Some(metrics) = &self.metrics {
            for (id, w) in &next.vector.weights {
                metrics.set_strategy_weight(id, *w);
            }
        }

        info!(
            "FeedbackEngine [{}]: {} in {} credited to {:?}, weights v{}",
            outcome.symbol,
            outcome.status,
            outcome.regime,
            credited,
            next.vector.version
        );

        if outcome.status != SignalStatus::Expired {
            let config = self.optimizer.config();
            let window_len = config.breaker_window.max(1);
            for id in &credited {
                let window = windows.entry(id.clone()).or_default();
                push_bounded(window, outcome.is_win(), window_len);
                if window.len() < window_len {
                    continue;
                }
                let rate = window.iter().filter(|w| **w).count() as f64 / window.len() as f64;
                if rate < config.breaker_floor
                    && self.registry.disable(id, DisableReason::PoorWinRate(rate)).await
                {
                    window.clear();
                }
            }
        }

        Ok(next)
    }

    /// Drains outcomes until the channel closes or shutdown is signalled.
    pub async fn run(
        self: Arc<Self>,
        mut outcome_rx: mpsc::Receiver<SignalOutcome>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!("FeedbackEngine: started");
        loop {
            tokio::select! {
                maybe = outcome_rx.recv() => {
                    let Some(outcome) = maybe else { break };
                    if let Err(e) = self.process(&outcome, Utc::now()).await {
                        warn!("FeedbackEngine: {:#}", e);
                    }
                }
                _ = shutdown.changed() => {
                    while let Ok(outcome) = outcome_rx.try_recv() {
                        if let Err(e) = self.process(&outcome, Utc::now()).await {
                            warn!("FeedbackEngine: {:#}", e);
                        }
                    }
                    break;
                }
            }
        }
        let held = self.pending_outcomes().await;
        if held > 0 {
            warn!("FeedbackEngine: stopped with {} outcome(s) not stored", held);
        } else {
            info!("FeedbackEngine: stopped");
        }
    }
}

fn push_bounded(window: &mut VecDeque<bool>, value: bool, len: usize) {
    window.push_back(value);
    while window.len() > len {
        window.pop_front();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EnsembleConfig;
    use crate::domain::market::RegimeType;
    use crate::domain::signals::{Direction, strategy_ids};
    use crate::infrastructure::repositories::{
        InMemoryPerformanceRepository, InMemoryWeightRepository,
    };
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    async fn engine(config: LearningConfig) -> (FeedbackEngine, Arc<StrategyRegistry>, InMemoryWeightRepository) {
        let registry = Arc::new(StrategyRegistry::with_default_strategies(EnsembleConfig::default()));
        let weights = InMemoryWeightRepository::new();
        let engine = FeedbackEngine::load(
            config,
            Arc::new(InMemoryPerformanceRepository::new()),
            Arc::new(weights.clone()),
            registry.clone(),
            Utc::now(),
        )
        .await
        .unwrap();
        (engine, registry, weights)
    }

    fn outcome(status: SignalStatus, contributors: &[&str]) -> SignalOutcome {
        let pnl = match status {
            SignalStatus::Success => Some(dec!(4)),
            SignalStatus::Failed => Some(dec!(-2)),
            _ => None,
        };
        SignalOutcome {
            signal_id: Uuid::new_v4(),
            symbol: "ETHUSDT".to_string(),
            direction: Direction::Short,
            status,
            strategy_id: contributors[0].to_string(),
            contributors: contributors.iter().map(|s| s.to_string()).collect(),
            regime: RegimeType::BearMomentum,
            profit_loss_percent: pnl,
            completed_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_outcome_updates_book_and_persists_weights() {
        let (engine, _, weight_repo) = engine(LearningConfig::default()).await;
        let mut book_rx = engine.book_receiver();
        let ids = [strategy_ids::ZSCORE_MR, strategy_ids::RSI_REVERSAL];

        let next = engine
            .process(&outcome(SignalStatus::Success, &ids), Utc::now())
            .await
            .unwrap();
        assert_eq!(next.vector.version, 1);
        assert!(next.vector.is_normalized());
        assert!(book_rx.has_changed().unwrap());

        let book = book_rx.borrow_and_update().clone();
        for id in ids {
            let record = book.get(id, RegimeType::BearMomentum).unwrap();
            assert_eq!(record.wins, 1);
            assert_eq!(record.win_rate, 1.0);
        }
        let stored = weight_repo.load().await.unwrap().unwrap();
        assert_eq!(stored.vector.version, 1);
    }

    #[tokio::test]
    async fn test_expired_counted_separately() {
        let (engine, _, _) = engine(LearningConfig::default()).await;
        engine
            .process(&outcome(SignalStatus::Expired, &[strategy_ids::VOLUME_SURGE]), Utc::now())
            .await
            .unwrap();
        let book = engine.current_book();
        let record = book.get(strategy_ids::VOLUME_SURGE, RegimeType::BearMomentum).unwrap();
        assert_eq!(record.expired, 1);
        assert_eq!(record.samples(), 0);
    }

    #[tokio::test]
    async fn test_poor_rolling_win_rate_disables_strategy() {
        let config = LearningConfig {
            breaker_window: 5,
            ..LearningConfig::default()
        };
        let (engine, registry, _) = engine(config).await;
        let id = strategy_ids::BOLLINGER_BREAKOUT;

        engine.process(&outcome(SignalStatus::Success, &[id]), Utc::now()).await.unwrap();
        for _ in 0..3 {
            engine.process(&outcome(SignalStatus::Failed, &[id]), Utc::now()).await.unwrap();
        }
        assert!(registry.is_enabled(id).await);

        // Fifth decided outcome: 1/5 = 20% < 35%
        engine.process(&outcome(SignalStatus::Failed, &[id]), Utc::now()).await.unwrap();
        assert!(!registry.is_enabled(id).await);
    }

    #[tokio::test]
    async fn test_weights_stay_normalized_over_mixed_history() {
        let (engine, _, _) = engine(LearningConfig::default()).await;
        for i in 0..60 {
            let status = if i % 3 == 0 { SignalStatus::Failed } else { SignalStatus::Success };
            let id = strategy_ids::ALL[i % strategy_ids::ALL.len()];
            let snapshot = engine.process(&outcome(status, &[id]), Utc::now()).await.unwrap();
            assert!(snapshot.vector.is_normalized());
        }
    }

    #[tokio::test]
    async fn test_restore_breaker_windows_ignores_expired() {
        let config = LearningConfig {
            breaker_window: 2,
            ..LearningConfig::default()
        };
        let (engine, registry, _) = engine(config).await;
        let now = Utc::now();

        let mut failed = crate::domain::signals::signal::tests::long_signal(now);
        let completion = failed.evaluate(dec!(97), now).unwrap();
        failed.apply(&completion).unwrap();
        let mut expired = crate::domain::signals::signal::tests::long_signal(now);
        let completion = expired.expire_without_price(now + chrono::Duration::hours(5), "gap").unwrap();
        expired.apply(&completion).unwrap();

        engine.restore_breaker_windows(&[failed, expired]).await;
        engine
            .process(&outcome(SignalStatus::Failed, &[strategy_ids::TREND_ALIGNMENT]), now)
            .await
            .unwrap();
        assert!(!registry.is_enabled(strategy_ids::TREND_ALIGNMENT).await);
        // StatMomentum only has the restored failure: window not full yet
        assert!(registry.is_enabled(strategy_ids::STAT_MOMENTUM).await);
    }

    #[tokio::test]
    async fn test_storage_failure_holds_state_until_stored() {
        let (engine, _, weight_repo) = engine(LearningConfig::default()).await;
        let mut weights_rx = engine.weights_receiver();
        let first = outcome(SignalStatus::Success, &[strategy_ids::ZSCORE_MR]);
        let second = outcome(SignalStatus::Failed, &[strategy_ids::RSI_REVERSAL]);

        weight_repo.fail_next_saves(1);
        assert!(engine.process(&first, Utc::now()).await.is_err());
        assert_eq!(engine.pending_outcomes().await, 1);
        assert!(!weights_rx.has_changed().unwrap());
        assert_eq!(engine.current_weights().vector.version, 0);
        assert!(engine.current_book().get(strategy_ids::ZSCORE_MR, RegimeType::BearMomentum).is_none());
        assert!(weight_repo.load().await.unwrap().is_none());

        // Next outcome stores the held one first
        let next = engine.process(&second, Utc::now()).await.unwrap();
        assert_eq!(next.vector.version, 2);
        assert_eq!(engine.pending_outcomes().await, 0);
        assert_eq!(weight_repo.load().await.unwrap().unwrap().vector.version, 2);

        let book = engine.current_book();
        assert_eq!(book.get(strategy_ids::ZSCORE_MR, RegimeType::BearMomentum).unwrap().wins, 1);
        assert_eq!(book.get(strategy_ids::RSI_REVERSAL, RegimeType::BearMomentum).unwrap().losses, 1);
    }
}
