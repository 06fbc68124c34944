//! Per-symbol regime state with last-value publication.
//!
//! The service is the single writer of `RegimeState`. Each symbol has a
//! `watch` channel, so readers always see a complete snapshot and never
//! wait on the detector.

use super::detector::MarketRegimeDetector;
use crate::config::RegimeConfig;
use crate::domain::market::RegimeState;
use crate::domain::ports::MarketDataService;
use crate::infrastructure::event_bus::EventBus;
use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, watch};
use tracing::{debug, info, warn};

pub struct RegimeService {
    detector: MarketRegimeDetector,
    market_data: Arc<dyn MarketDataService>,
    event_bus: EventBus,
    channels: HashMap<String, watch::Sender<RegimeState>>,
    last_refresh: Mutex<HashMap<String, DateTime<Utc>>>,
    interval: Duration,
    max_age: Duration,
    lookback: usize,
}

impl RegimeService {
    pub fn new(
        config: RegimeConfig,
        symbols: &[String],
        market_data: Arc<dyn MarketDataService>,
        event_bus: EventBus,
    ) -> Self {
        let now = Utc::now();
        let channels = symbols
            .iter()
            .map(|s| {
                let (tx, _rx) = watch::channel(RegimeState::neutral(s.clone(), now));
                (s.clone(), tx)
            })
            .collect();

        let detector = MarketRegimeDetector::new(config.clone());
        let lookback = detector.required_candles().max(config.slow_period * 2);
        Self {
            detector,
            market_data,
            event_bus,
            channels,
            last_refresh: Mutex::new(HashMap::new()),
            interval: Duration::seconds(config.reevaluation_interval_secs as i64),
            max_age: Duration::seconds(config.max_state_age_secs),
            lookback,
        }
    }

    pub fn symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.channels.keys().cloned().collect();
        symbols.sort();
        symbols
    }

    /// Live view of a symbol's regime. `None` for unknown symbols.
    pub fn subscribe(&self, symbol: &str) -> Option<watch::Receiver<RegimeState>> {
        self.channels.get(symbol).map(|tx| tx.subscribe())
    }

    /// Current regime, or the neutral default when the last evaluation is
    /// older than the allowed age.
    ///
    /// The first read that finds a classified state stale replaces it with
    /// the neutral state and announces the change.
    pub fn current(&self, symbol: &str, now: DateTime<Utc>) -> RegimeState {
        let Some(tx) = self.channels.get(symbol) else {
            return RegimeState::neutral(symbol, now);
        };

        let fallback = RegimeState::neutral(symbol, now);
        let mut expired = None;
        tx.send_if_modified(|state| {
            if state.neutral || !state.is_stale(now, self.max_age) {
                return false;
            }
            expired = Some(std::mem::replace(state, fallback.clone()));
            true
        });
        if let Some(previous) = expired {
            warn!(
                "RegimeService [{}]: {} state is stale, falling back to NEUTRAL",
                symbol, previous.regime
            );
            self.event_bus.regime_changed(&previous, &fallback);
        }

        let state = tx.borrow().clone();
        if state.is_stale(now, self.max_age) {
            debug!("RegimeService [{}]: state stale, using neutral default", symbol);
            return RegimeState::neutral(symbol, now);
        }
        state
    }

    /// Re-evaluates one symbol unless it was evaluated within the interval.
    /// Returns whether an evaluation ran.
    pub async fn refresh(&self, symbol: &str, now: DateTime<Utc>) -> Result<bool> {
        {
            let mut last = self.last_refresh.lock().await;
            if let Some(at) = last.get(symbol)
                && now - *at < self.interval
            {
                return Ok(false);
            }
            last.insert(symbol.to_string(), now);
        }
        self.evaluate(symbol, now).await?;
        Ok(true)
    }

    /// Evaluates one symbol unconditionally and publishes the new state.
    pub async fn evaluate(&self, symbol: &str, now: DateTime<Utc>) -> Result<RegimeState> {
        let tx = self
            .channels
            .get(symbol)
            .with_context(|| format!("Unknown symbol {}", symbol))?;

        let candles = self
            .market_data
            .get_candles(symbol, self.lookback)
            .await
            .context(format!("Failed to load candles for {}", symbol))?;

        let next = self.detector.detect(symbol, &candles, now);
        let previous = tx.send_replace(next.clone());

        if previous.label() != next.label() {
            info!(
                "RegimeService [{}]: {} -> {} (confidence {:.0})",
                symbol,
                previous.label().map_or("NEUTRAL", |r| r.as_str()),
                next.label().map_or("NEUTRAL", |r| r.as_str()),
                next.confidence
            );
            self.event_bus.regime_changed(&previous, &next);
        }
        Ok(next)
    }

    /// One timer pass over every symbol. Failures leave the old state to age.
    pub async fn refresh_all(&self, now: DateTime<Utc>) {
        for symbol in self.symbols() {
            if let Err(e) = self.refresh(&symbol, now).await {
                warn!("RegimeService [{}]: evaluation failed: {:#}", symbol, e);
                // Surface the neutral fallback if the old state has aged out
                self.current(&symbol, now);
            }
        }
    }

    /// Snapshot of every symbol's regime label for status reporting.
    pub fn labels(&self, now: DateTime<Utc>) -> Vec<(String, String)> {
        self.symbols()
            .into_iter()
            .map(|s| {
                let state = self.current(&s, now);
                let label = if state.neutral {
                    "NEUTRAL".to_string()
                } else {
                    state.regime.as_str().to_string()
                };
                (s, label)
            })
            .collect()
    }
}
