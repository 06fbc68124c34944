//! Pipeline-wide settings: symbols, cycle cadence, storage and the mock feed.

use super::env::{parse_list, parse_string, parse_u64, parse_usize};
use anyhow::{Context, Result};
use std::env;

#[derive(Debug, Clone)]
pub struct PipelineEnvConfig {
    pub symbols: Vec<String>,
    /// Minimum time between two evaluation cycles of the same symbol
    pub min_cycle_interval_ms: u64,
    pub candle_lookback: usize,
    /// Per-symbol tick queue; overflowing ticks are dropped (last price wins)
    pub tick_channel_capacity: usize,
    pub database_url: String,
    pub mock_seed: Option<u64>,
    pub mock_tick_interval_ms: u64,
}

impl Default for PipelineEnvConfig {
    fn default() -> Self {
        Self {
            symbols: vec!["BTCUSDT".to_string(), "ETHUSDT".to_string()],
            min_cycle_interval_ms: 5_000,
            candle_lookback: 120,
            tick_channel_capacity: 64,
            database_url: "sqlite://ignitex.db".to_string(),
            mock_seed: None,
            mock_tick_interval_ms: 1_000,
        }
    }
}

impl PipelineEnvConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let mock_seed = match env::var("MOCK_SEED") {
            Ok(raw) => Some(raw.parse::<u64>().context("Failed to parse MOCK_SEED")?),
            Err(_) => None,
        };

        Ok(Self {
            symbols: parse_list("SYMBOLS", &defaults.symbols.join(",")),
            min_cycle_interval_ms: parse_u64("MIN_CYCLE_INTERVAL_MS", defaults.min_cycle_interval_ms)?,
            candle_lookback: parse_usize("CANDLE_LOOKBACK", defaults.candle_lookback)?,
            tick_channel_capacity: parse_usize("TICK_CHANNEL_CAPACITY", defaults.tick_channel_capacity)?,
            database_url: parse_string("DATABASE_URL", &defaults.database_url),
            mock_seed,
            mock_tick_interval_ms: parse_u64("MOCK_TICK_INTERVAL_MS", defaults.mock_tick_interval_ms)?,
        })
    }
}
