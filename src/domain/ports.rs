use crate::domain::market::{Candle, Tick};
use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use tokio::sync::mpsc::Receiver;

/// Inbound market data boundary.
#[async_trait]
pub trait MarketDataService: Send + Sync {
    /// Tick stream for the given symbols.
    async fn subscribe(&self, symbols: Vec<String>) -> Result<Receiver<Tick>>;

    /// Most recent `lookback` closed candles, oldest first.
    async fn get_candles(&self, symbol: &str, lookback: usize) -> Result<Vec<Candle>>;

    /// Latest known prices. Symbols without a price are absent from the map.
    async fn get_prices(&self, symbols: Vec<String>) -> Result<HashMap<String, Decimal>>;
}
