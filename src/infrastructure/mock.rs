use crate::domain::errors::MarketDataError;
use crate::domain::market::{Candle, Tick};
use crate::domain::ports::MarketDataService;
use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{
    RwLock,
    mpsc::{self, Receiver, Sender},
};
use tokio::task::JoinHandle;
use tracing::{debug, info};

const CANDLE_MS: i64 = 60_000;
const TICKS_PER_CANDLE: u32 = 12;
const MAX_CANDLES: usize = 1_000;

/// In-process market data adapter.
///
/// Holds last prices and candle history per symbol. Tests drive it through
/// `set_price` / `push_candles` / `fail_prices`; the server's mock mode runs
/// a seeded random walk with `start_simulation`.
#[derive(Clone)]
pub struct MockMarketDataService {
    subscribers: Arc<RwLock<Vec<Sender<Tick>>>>,
    prices: Arc<RwLock<HashMap<String, Decimal>>>,
    candles: Arc<RwLock<HashMap<String, Vec<Candle>>>>,
    prices_failing: Arc<AtomicBool>,
}

impl Default for MockMarketDataService {
    fn default() -> Self {
        Self::new()
    }
}

impl MockMarketDataService {
    pub fn new() -> Self {
        Self {
            subscribers: Arc::new(RwLock::new(Vec::new())),
            prices: Arc::new(RwLock::new(HashMap::new())),
            candles: Arc::new(RwLock::new(HashMap::new())),
            prices_failing: Arc::new(AtomicBool::new(false)),
        }
    }

    pub async fn set_price(&self, symbol: &str, price: Decimal) {
        self.prices.write().await.insert(symbol.to_string(), price);
    }

    /// Appends candles and moves the last price to the final close.
    pub async fn push_candles(&self, symbol: &str, candles: Vec<Candle>) {
        if let Some(last) = candles.last() {
            self.set_price(symbol, last.close).await;
        }
        let mut store = self.candles.write().await;
        let history = store.entry(symbol.to_string()).or_default();
        history.extend(candles);
        if history.len() > MAX_CANDLES {
            let excess = history.len() - MAX_CANDLES;
            history.drain(..excess);
        }
    }

    /// While set, `get_prices` fails as if the feed were down.
    pub fn fail_prices(&self, failing: bool) {
        self.prices_failing.store(failing, Ordering::SeqCst);
    }

    /// Sends a tick to every live subscriber and records its price.
    pub async fn publish(&self, tick: Tick) {
        self.set_price(&tick.symbol, tick.price).await;

        let mut subs = self.subscribers.write().await;
        // Drop subscribers whose receiver is gone
        subs.retain(|tx| !tx.is_closed());
        for tx in subs.iter() {
            if tx.try_send(tick.clone()).is_err() {
                debug!("MockMarketDataService: subscriber lagging, tick for {} dropped", tick.symbol);
            }
        }
    }

    /// Seeds history and starts a random walk producing ticks and candles.
    pub async fn start_simulation(
        &self,
        symbols: Vec<String>,
        seed: Option<u64>,
        tick_interval: Duration,
        history: usize,
    ) -> JoinHandle<()> {
        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_rng(&mut rand::rng()),
        };

        let now_ms = Utc::now().timestamp_millis();
        let mut state: HashMap<String, f64> = HashMap::new();
        for symbol in &symbols {
            let base = base_price(symbol);
            let candles = random_walk_candles(
                symbol,
                base,
                history,
                0.0,
                0.6,
                rng.random(),
                now_ms - history as i64 * CANDLE_MS,
            );
            let last_close = candles
                .last()
                .and_then(|c| c.close.to_f64())
                .unwrap_or(base);
            self.push_candles(symbol, candles).await;
            state.insert(symbol.clone(), last_close);
        }

        info!(
            "MockMarketDataService: Starting price simulation for {:?} (seed {:?})",
            symbols, seed
        );

        let service = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            let mut building: HashMap<String, Vec<f64>> = HashMap::new();

            loop {
                interval.tick().await;
                for symbol in &symbols {
                    let current = state.get(symbol).copied().unwrap_or(100.0);
                    let change_pct: f64 = rng.random_range(-0.25..0.25);
                    let next = (current * (1.0 + change_pct / 100.0)).max(0.01);
                    state.insert(symbol.clone(), next);

                    let price = Decimal::from_f64(next).unwrap_or(Decimal::ZERO).round_dp(4);
                    let half_spread = (price * Decimal::new(5, 5)).round_dp(6);
                    let volume = Decimal::from_f64(rng.random_range(0.5..5.0))
                        .unwrap_or(Decimal::ONE)
                        .round_dp(3);
                    let tick = Tick::new(symbol.clone(), price, Utc::now().timestamp_millis())
                        .with_quote(price - half_spread, price + half_spread)
                        .with_volume(volume);
                    service.publish(tick).await;

                    let bucket = building.entry(symbol.clone()).or_default();
                    bucket.push(next);
                    if bucket.len() as u32 >= TICKS_PER_CANDLE {
                        let volume = rng.random_range(800.0..1500.0);
                        let candle = candle_from_prices(symbol, bucket, volume, Utc::now().timestamp_millis());
                        bucket.clear();
                        if let Some(candle) = candle {
                            service.push_candles(symbol, vec![candle]).await;
                        }
                    }
                }
            }
        })
    }
}

#[async_trait]
impl MarketDataService for MockMarketDataService {
    async fn subscribe(&self, symbols: Vec<String>) -> Result<Receiver<Tick>> {
        let (tx, rx) = mpsc::channel(1024);
        self.subscribers.write().await.push(tx);
        info!("MockMarketDataService: subscribed to {:?}", symbols);
        Ok(rx)
    }

    async fn get_candles(&self, symbol: &str, lookback: usize) -> Result<Vec<Candle>> {
        let store = self.candles.read().await;
        let history = store.get(symbol).map(|v| v.as_slice()).unwrap_or(&[]);
        let start = history.len().saturating_sub(lookback);
        Ok(history[start..].to_vec())
    }

    async fn get_prices(&self, symbols: Vec<String>) -> Result<HashMap<String, Decimal>> {
        if self.prices_failing.load(Ordering::SeqCst) {
            return Err(MarketDataError::FeedUnavailable {
                reason: "simulated price feed outage".to_string(),
            }
            .into());
        }
        let prices = self.prices.read().await;
        Ok(symbols
            .into_iter()
            .filter_map(|s| prices.get(&s).map(|p| (s, *p)))
            .collect())
    }
}

fn base_price(symbol: &str) -> f64 {
    if symbol.contains("BTC") {
        96_000.0
    } else if symbol.contains("ETH") {
        3_400.0
    } else if symbol.contains("SOL") {
        180.0
    } else {
        100.0
    }
}

fn candle_from_prices(symbol: &str, prices: &[f64], volume: f64, timestamp: i64) -> Option<Candle> {
    let open = *prices.first()?;
    let close = *prices.last()?;
    let high = prices.iter().copied().fold(f64::MIN, f64::max);
    let low = prices.iter().copied().fold(f64::MAX, f64::min);
    Some(Candle {
        symbol: symbol.to_string(),
        open: Decimal::from_f64(open)?.round_dp(4),
        high: Decimal::from_f64(high)?.round_dp(4),
        low: Decimal::from_f64(low)?.round_dp(4),
        close: Decimal::from_f64(close)?.round_dp(4),
        volume: Decimal::from_f64(volume)?.round_dp(2),
        timestamp,
    })
}

/// Seeded synthetic OHLC history.
///
/// `drift_pct` is the mean close-to-close move per candle, `vol_pct` the
/// size of the random component. Deterministic for a given seed.
pub fn random_walk_candles(
    symbol: &str,
    start: f64,
    count: usize,
    drift_pct: f64,
    vol_pct: f64,
    seed: u64,
    start_ts: i64,
) -> Vec<Candle> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut candles = Vec::with_capacity(count);
    let mut price = start;

    for i in 0..count {
        let open = price;
        let shock: f64 = if vol_pct > 0.0 {
            rng.random_range(-vol_pct..vol_pct)
        } else {
            0.0
        };
        let close = (open * (1.0 + (drift_pct + shock) / 100.0)).max(0.01);
        let wick = open.max(close) * rng.random_range(0.0..(vol_pct.max(0.05) / 200.0));
        let high = open.max(close) + wick;
        let low = (open.min(close) - wick).max(0.005);
        let volume = rng.random_range(900.0..1100.0);

        if let Some(candle) = candle_from_prices(
            symbol,
            &[open, high, low, close],
            volume,
            start_ts + i as i64 * CANDLE_MS,
        ) {
            candles.push(candle);
        }
        price = close;
    }
    candles
}
