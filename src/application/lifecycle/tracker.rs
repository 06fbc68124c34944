//! Signal lifecycle tracker.
//!
//! Owns every ACTIVE signal from publication to its terminal status. A
//! heartbeat fetches the latest prices in one batch and evaluates each
//! signal against them; the terminal write is a check-and-set in the
//! repository, so each signal produces exactly one outcome even if two
//! heartbeats observe the same crossing.

use crate::domain::ports::MarketDataService;
use crate::domain::repositories::SignalRepository;
use crate::domain::signals::{Signal, SignalCompletion, SignalOutcome};
use crate::infrastructure::event_bus::EventBus;
use crate::infrastructure::observability::Metrics;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc, watch};
use tracing::{debug, info, warn};
use uuid::Uuid;

const FEED_GAP_NOTE: &str = "expired without a price: feed unavailable";
const LAST_PRICE_NOTE: &str = "expired at last known price: feed unavailable";

pub struct SignalLifecycleTracker {
    active: Mutex<HashMap<Uuid, Signal>>,
    /// Latest price successfully fetched for each active signal
    last_prices: Mutex<HashMap<Uuid, Decimal>>,
    signal_repo: Arc<dyn SignalRepository>,
    market_data: Arc<dyn MarketDataService>,
    outcome_tx: mpsc::Sender<SignalOutcome>,
    event_bus: EventBus,
    metrics: Option<Metrics>,
    heartbeat_guard: Mutex<()>,
}

impl SignalLifecycleTracker {
    pub fn new(
        signal_repo: Arc<dyn SignalRepository>,
        market_data: Arc<dyn MarketDataService>,
        outcome_tx: mpsc::Sender<SignalOutcome>,
        event_bus: EventBus,
    ) -> Self {
        Self {
            active: Mutex::new(HashMap::new()),
            last_prices: Mutex::new(HashMap::new()),
            signal_repo,
            market_data,
            outcome_tx,
            event_bus,
            metrics: None,
            heartbeat_guard: Mutex::new(()),
        }
    }

    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Takes ownership of a freshly published signal.
    pub async fn track(&self, signal: Signal) {
        if !signal.is_active() {
            return;
        }
        let mut active = self.active.lock().await;
        if active.contains_key(&signal.id) {
            return;
        }
        debug!("SignalLifecycleTracker [{}]: tracking {}", signal.symbol, signal.id);
        active.insert(signal.id, signal);
        self.update_gauge(active.len());
    }

    /// Reloads ACTIVE signals after a restart. Already tracked ids are kept
    /// as they are.
    pub async fn resume_from_repository(&self) -> Result<usize> {
        let stored = self
            .signal_repo
            .find_active()
            .await
            .context("Failed to load active signals")?;

        let mut active = self.active.lock().await;
        let mut resumed = 0;
        for signal in stored {
            if let std::collections::hash_map::Entry::Vacant(slot) = active.entry(signal.id) {
                slot.insert(signal);
                resumed += 1;
            }
        }
        self.update_gauge(active.len());
        info!("SignalLifecycleTracker: resumed {} active signals", resumed);
        Ok(resumed)
    }

    pub async fn active_count(&self) -> usize {
        self.active.lock().await.len()
    }

    pub async fn active_signals(&self) -> Vec<Signal> {
        let mut signals: Vec<Signal> = self.active.lock().await.values().cloned().collect();
        signals.sort_by_key(|s| s.created_at);
        signals
    }

    /// One evaluation pass. Skipped when a previous pass is still running.
    pub async fn heartbeat(&self, now: DateTime<Utc>) -> Result<Vec<SignalOutcome>> {
        let Ok(_guard) = self.heartbeat_guard.try_lock() else {
            debug!("SignalLifecycleTracker: previous heartbeat still running, skipping");
            return Ok(Vec::new());
        };

        let snapshot: Vec<Signal> = self.active.lock().await.values().cloned().collect();
        if snapshot.is_empty() {
            return Ok(Vec::new());
        }

        let symbols: Vec<String> = snapshot
            .iter()
            .map(|s| s.symbol.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let prices = match self.market_data.get_prices(symbols).await {
            Ok(prices) => prices,
            Err(e) => {
                warn!("SignalLifecycleTracker: price fetch failed: {:#}", e);
                HashMap::new()
            }
        };

        let mut outcomes = Vec::new();
        for signal in snapshot {
            let completion = match prices.get(&signal.symbol) {
                Some(price) => {
                    self.last_prices.lock().await.insert(signal.id, *price);
                    signal.evaluate(*price, now)
                }
                None => match self.last_prices.lock().await.get(&signal.id) {
                    Some(last) => signal.expire_at_last_price(*last, now, LAST_PRICE_NOTE),
                    None => signal.expire_without_price(now, FEED_GAP_NOTE),
                },
            };
            let Some(completion) = completion else {
                continue;
            };
            if let Some(outcome) = self.complete(signal, completion).await {
                outcomes.push(outcome);
            }
        }
        Ok(outcomes)
    }

    async fn complete(&self, mut signal: Signal, completion: SignalCompletion) -> Option<SignalOutcome> {
        match self.signal_repo.complete(signal.id, &completion).await {
            Ok(true) => {}
            Ok(false) => {
                warn!(
                    "SignalLifecycleTracker [{}]: {} already terminal in storage, dropping",
                    signal.symbol, signal.id
                );
                self.forget(signal.id).await;
                return None;
            }
            Err(e) => {
                // Still ACTIVE; the next heartbeat tries again
                warn!(
                    "SignalLifecycleTracker [{}]: failed to store completion of {}: {:#}",
                    signal.symbol, signal.id, e
                );
                return None;
            }
        }

        if let Err(e) = signal.apply(&completion) {
            warn!("SignalLifecycleTracker [{}]: {}", signal.symbol, e);
        }
        self.forget(signal.id).await;

        info!(
            "SignalLifecycleTracker [{}]: {} {} exit {} P/L {}% target {}{}",
            signal.symbol,
            signal.id,
            signal.status,
            signal
                .exit_price
                .map(|p| p.to_string())
                .unwrap_or_else(|| "n/a".to_string()),
            signal
                .profit_loss_percent
                .map(|p| p.to_string())
                .unwrap_or_else(|| "n/a".to_string()),
            signal
                .hit_target
                .map(|t| t.to_string())
                .unwrap_or_else(|| "-".to_string()),
            signal
                .note
                .as_deref()
                .map(|n| format!(" ({})", n))
                .unwrap_or_default()
        );

        if let Some(metrics) = &self.metrics {
            metrics.inc_outcome(signal.status.as_str());
        }
        self.event_bus.signal_completed(&signal);

        let outcome = signal.outcome()?;
        if self.outcome_tx.send(outcome.clone()).await.is_err() {
            warn!("SignalLifecycleTracker: learning engine gone, outcome of {} not delivered", signal.id);
        }
        Some(outcome)
    }

    async fn forget(&self, id: Uuid) {
        self.last_prices.lock().await.remove(&id);
        let mut active = self.active.lock().await;
        active.remove(&id);
        self.update_gauge(active.len());
    }

    fn update_gauge(&self, count: usize) {
        if let Some(metrics) = &self.metrics {
            metrics.active_signals.set(count as f64);
        }
    }

    /// Consumes published signals and runs the heartbeat until shutdown.
    /// A heartbeat in progress finishes before the loop exits.
    pub async fn run(
        self: Arc<Self>,
        mut published_rx: mpsc::Receiver<Signal>,
        heartbeat_interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!(
            "SignalLifecycleTracker: started (heartbeat {:?})",
            heartbeat_interval
        );
        let mut interval = tokio::time::interval(heartbeat_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                Some(signal) = published_rx.recv() => {
                    self.track(signal).await;
                }
                _ = interval.tick() => {
                    if let Err(e) = self.heartbeat(Utc::now()).await {
                        warn!("SignalLifecycleTracker: heartbeat failed: {:#}", e);
                    }
                }
                _ = shutdown.changed() => {
                    // Pick up anything published just before shutdown
                    while let Ok(signal) = published_rx.try_recv() {
                        self.track(signal).await;
                    }
                    info!("SignalLifecycleTracker: stopped with {} active signals", self.active_count().await);
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::signals::SignalStatus;
    use crate::domain::signals::signal::tests::long_signal;
    use crate::infrastructure::mock::MockMarketDataService;
    use crate::infrastructure::repositories::InMemorySignalRepository;
    use chrono::Duration as ChronoDuration;
    use rust_decimal_macros::dec;

    struct Harness {
        tracker: SignalLifecycleTracker,
        repo: InMemorySignalRepository,
        mock: MockMarketDataService,
        outcome_rx: mpsc::Receiver<SignalOutcome>,
    }

    fn harness() -> Harness {
        let repo = InMemorySignalRepository::new();
        let mock = MockMarketDataService::new();
        let (outcome_tx, outcome_rx) = mpsc::channel(16);
        let tracker = SignalLifecycleTracker::new(
            Arc::new(repo.clone()),
            Arc::new(mock.clone()),
            outcome_tx,
            EventBus::new(),
        );
        Harness {
            tracker,
            repo,
            mock,
            outcome_rx,
        }
    }

    #[tokio::test]
    async fn test_target_hit_completes_once() {
        let mut h = harness();
        let now = Utc::now();
        let signal = long_signal(now);
        h.repo.save(&signal).await.unwrap();
        h.tracker.track(signal.clone()).await;

        h.mock.set_price("BTCUSDT", dec!(105.5)).await;
        let outcomes = h.tracker.heartbeat(now).await.unwrap();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].status, SignalStatus::Success);
        assert_eq!(h.outcome_rx.recv().await.unwrap().signal_id, signal.id);

        let stored = h.repo.find_by_id(signal.id).await.unwrap().unwrap();
        assert_eq!(stored.hit_target, Some(1));
        assert_eq!(stored.profit_loss_percent, Some(dec!(5.5)));

        // Tracking the same signal again must not produce a second outcome
        h.tracker.track(signal).await;
        assert!(h.tracker.heartbeat(now).await.unwrap().is_empty());
        assert!(h.outcome_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_missing_price_keeps_active_until_expiry() {
        let h = harness();
        let now = Utc::now();
        let signal = long_signal(now);
        h.repo.save(&signal).await.unwrap();
        h.tracker.track(signal.clone()).await;

        h.mock.fail_prices(true);
        assert!(h.tracker.heartbeat(now + ChronoDuration::hours(1)).await.unwrap().is_empty());
        assert_eq!(h.tracker.active_count().await, 1);

        let outcomes = h.tracker.heartbeat(now + ChronoDuration::hours(5)).await.unwrap();
        assert_eq!(outcomes[0].status, SignalStatus::Expired);
        let stored = h.repo.find_by_id(signal.id).await.unwrap().unwrap();
        assert_eq!(stored.note.as_deref(), Some(FEED_GAP_NOTE));
        assert!(stored.exit_price.is_none());
    }

    #[tokio::test]
    async fn test_feed_gap_expires_at_last_seen_price() {
        let h = harness();
        let now = Utc::now();
        let signal = long_signal(now);
        h.repo.save(&signal).await.unwrap();
        h.tracker.track(signal.clone()).await;

        h.mock.set_price("BTCUSDT", dec!(101)).await;
        assert!(h.tracker.heartbeat(now + ChronoDuration::hours(1)).await.unwrap().is_empty());

        h.mock.fail_prices(true);
        assert!(h.tracker.heartbeat(now + ChronoDuration::hours(2)).await.unwrap().is_empty());
        let outcomes = h.tracker.heartbeat(now + ChronoDuration::hours(5)).await.unwrap();
        assert_eq!(outcomes[0].status, SignalStatus::Expired);
        assert_eq!(outcomes[0].profit_loss_percent, Some(dec!(1)));

        let stored = h.repo.find_by_id(signal.id).await.unwrap().unwrap();
        assert_eq!(stored.exit_price, Some(dec!(101)));
        assert_eq!(stored.note.as_deref(), Some(LAST_PRICE_NOTE));
        assert!(h.tracker.last_prices.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_resume_skips_tracked() {
        let h = harness();
        let now = Utc::now();
        let a = long_signal(now);
        let b = long_signal(now);
        h.repo.save(&a).await.unwrap();
        h.repo.save(&b).await.unwrap();
        h.tracker.track(a).await;

        assert_eq!(h.tracker.resume_from_repository().await.unwrap(), 1);
        assert_eq!(h.tracker.active_count().await, 2);
    }

    #[tokio::test]
    async fn test_stop_hit_fails() {
        let h = harness();
        let now = Utc::now();
        let signal = long_signal(now);
        h.repo.save(&signal).await.unwrap();
        h.tracker.track(signal).await;

        h.mock.set_price("BTCUSDT", dec!(97.5)).await;
        let outcomes = h.tracker.heartbeat(now).await.unwrap();
        assert_eq!(outcomes[0].status, SignalStatus::Failed);
        assert!(outcomes[0].realized_return() < 0.0);
        assert_eq!(h.tracker.active_count().await, 0);
    }
}
