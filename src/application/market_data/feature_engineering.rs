use crate::application::market_data::indicators::{self, Bands};
use crate::domain::market::{Candle, Tick};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

/// Indicator windows used to enrich a tick for the strategies.
#[derive(Debug, Clone)]
pub struct FeatureConfig {
    pub fast_sma: usize,
    pub slow_sma: usize,
    pub trend_sma: usize,
    pub ema_fast: usize,
    pub ema_slow: usize,
    pub macd_signal: usize,
    pub rsi_period: usize,
    pub atr_period: usize,
    pub bb_period: usize,
    pub bb_std_dev: f64,
    pub zscore_period: usize,
    pub momentum_period: usize,
    pub volume_period: usize,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            fast_sma: 10,
            slow_sma: 30,
            trend_sma: 50,
            ema_fast: 12,
            ema_slow: 26,
            macd_signal: 9,
            rsi_period: 14,
            atr_period: 14,
            bb_period: 20,
            bb_std_dev: 2.0,
            zscore_period: 20,
            momentum_period: 10,
            volume_period: 20,
        }
    }
}

/// Enriched market data for one symbol at one tick.
///
/// Every indicator is optional; strategies must degrade when one is missing.
#[derive(Debug, Clone)]
pub struct AnalysisContext {
    pub symbol: String,
    pub current_price: Decimal,
    pub price_f64: f64,
    pub timestamp: i64,
    pub candles: Vec<Candle>,
    pub closes: Vec<f64>,

    pub fast_sma: Option<f64>,
    pub slow_sma: Option<f64>,
    pub trend_sma: Option<f64>,
    pub ema_fast: Option<f64>,
    pub ema_slow: Option<f64>,
    pub macd_histogram: Option<f64>,
    pub rsi: Option<f64>,
    pub atr: Option<f64>,
    pub bands: Option<Bands>,
    pub zscore: Option<f64>,
    /// Price change over `momentum_period` candles, in ATR units
    pub momentum_normalized: Option<f64>,
    pub volume_ratio: Option<f64>,
    pub spread_pct: Option<f64>,
}

impl AnalysisContext {
    pub fn atr_pct(&self) -> Option<f64> {
        let atr = self.atr?;
        (self.price_f64 > 0.0).then(|| atr / self.price_f64 * 100.0)
    }

    pub fn bb_width_pct(&self) -> Option<f64> {
        self.bands.and_then(|b| b.width_pct())
    }

    pub fn last_candle(&self) -> Option<&Candle> {
        self.candles.last()
    }
}

/// Builds `AnalysisContext`s from a tick and the symbol's candle history.
#[derive(Debug, Clone, Default)]
pub struct FeatureEngineeringService {
    config: FeatureConfig,
}

impl FeatureEngineeringService {
    pub fn new(config: FeatureConfig) -> Self {
        Self { config }
    }

    /// Longest window any feature needs.
    pub fn warmup_candles(&self) -> usize {
        let c = &self.config;
        [
            c.trend_sma,
            c.ema_slow + c.macd_signal,
            c.bb_period,
            c.rsi_period + 1,
            c.atr_period + 1,
            c.volume_period + 1,
        ]
        .into_iter()
        .max()
        .unwrap_or(0)
    }

    pub fn build(&self, tick: &Tick, candles: Vec<Candle>) -> AnalysisContext {
        let c = &self.config;
        let closes = indicators::closes(&candles);
        let volumes = indicators::volumes(&candles);
        let price = tick.price.to_f64().unwrap_or(0.0);

        let atr = indicators::atr(&candles, c.atr_period);
        let momentum_normalized = match (atr, closes.len().checked_sub(c.momentum_period + 1)) {
            (Some(atr), Some(idx)) if atr > 0.0 => Some((price - closes[idx]) / atr),
            _ => None,
        };

        AnalysisContext {
            symbol: tick.symbol.clone(),
            current_price: tick.price,
            price_f64: price,
            timestamp: tick.timestamp,
            fast_sma: indicators::sma(&closes, c.fast_sma),
            slow_sma: indicators::sma(&closes, c.slow_sma),
            trend_sma: indicators::sma(&closes, c.trend_sma),
            ema_fast: indicators::ema(&closes, c.ema_fast),
            ema_slow: indicators::ema(&closes, c.ema_slow),
            macd_histogram: indicators::macd_histogram(&closes, c.ema_fast, c.ema_slow, c.macd_signal),
            rsi: indicators::rsi(&closes, c.rsi_period),
            atr,
            bands: indicators::bollinger(&closes, c.bb_period, c.bb_std_dev),
            zscore: indicators::zscore(&closes, c.zscore_period, price),
            momentum_normalized,
            volume_ratio: indicators::volume_ratio(&volumes, c.volume_period),
            spread_pct: tick.spread_pct(),
            closes,
            candles,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::mock::random_walk_candles;
    use rust_decimal_macros::dec;

    #[test]
    fn test_short_history_leaves_indicators_empty() {
        let service = FeatureEngineeringService::default();
        let candles = random_walk_candles("BTCUSDT", 100.0, 5, 0.0, 0.5, 1, 0);
        let ctx = service.build(&Tick::new("BTCUSDT", dec!(100), 0), candles);
        assert!(ctx.trend_sma.is_none());
        assert!(ctx.rsi.is_none());
        assert!(ctx.atr.is_none());
    }

    #[test]
    fn test_full_history_populates_indicators() {
        let service = FeatureEngineeringService::default();
        let candles = random_walk_candles("BTCUSDT", 100.0, 120, 0.05, 0.5, 3, 0);
        let last = candles.last().unwrap().close;
        let ctx = service.build(&Tick::new("BTCUSDT", last, 0), candles);
        assert!(ctx.trend_sma.is_some());
        assert!(ctx.macd_histogram.is_some());
        assert!(ctx.atr_pct().unwrap() > 0.0);
        assert!(ctx.bb_width_pct().unwrap() > 0.0);
        assert!(ctx.volume_ratio.is_some());
    }
}
