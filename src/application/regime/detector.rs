use crate::application::market_data::indicators;
use crate::config::RegimeConfig;
use crate::domain::market::{Candle, RegimeState, RegimeType};
use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;

/// Indicator readings the classification is made from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegimeReadings {
    pub price: f64,
    pub fast_sma: f64,
    pub mid_sma: f64,
    pub slow_sma: f64,
    pub rsi: f64,
    pub atr_pct: f64,
    pub bb_width_pct: f64,
    pub volume_ratio: f64,
}

impl RegimeReadings {
    fn bull_aligned(&self) -> bool {
        self.price > self.fast_sma && self.fast_sma > self.mid_sma && self.mid_sma > self.slow_sma
    }

    fn bear_aligned(&self) -> bool {
        self.price < self.fast_sma && self.fast_sma < self.mid_sma && self.mid_sma < self.slow_sma
    }

    /// Fast/slow separation in percent of price.
    fn trend_spread_pct(&self) -> f64 {
        if self.price <= 0.0 {
            return 0.0;
        }
        (self.fast_sma - self.slow_sma).abs() / self.price * 100.0
    }
}

/// Classifies a symbol's candle history into one of seven regimes.
///
/// Checks run in a fixed order and the first match wins: volatility
/// breakout, directional momentum, accumulation squeeze, directional
/// range, then choppy as the catch-all.
#[derive(Debug, Clone)]
pub struct MarketRegimeDetector {
    config: RegimeConfig,
}

impl MarketRegimeDetector {
    pub fn new(config: RegimeConfig) -> Self {
        Self { config }
    }

    pub fn required_candles(&self) -> usize {
        self.config.required_candles()
    }

    pub fn readings(&self, candles: &[Candle]) -> Option<RegimeReadings> {
        if candles.len() < self.required_candles() {
            return None;
        }
        let c = &self.config;
        let closes = indicators::closes(candles);
        let volumes = indicators::volumes(candles);
        let price = candles.last()?.close.to_f64()?;
        if price <= 0.0 {
            return None;
        }

        let bands = indicators::bollinger(&closes, c.bb_period, c.bb_std_dev)?;
        Some(RegimeReadings {
            price,
            fast_sma: indicators::sma(&closes, c.fast_period)?,
            mid_sma: indicators::sma(&closes, c.mid_period)?,
            slow_sma: indicators::sma(&closes, c.slow_period)?,
            rsi: indicators::rsi(&closes, c.rsi_period)?,
            atr_pct: indicators::atr(candles, c.atr_period)? / price * 100.0,
            bb_width_pct: bands.width_pct()?,
            volume_ratio: indicators::volume_ratio(&volumes, c.volume_period).unwrap_or(1.0),
        })
    }

    /// Regime plus the confidence (0-100) of the classification itself.
    pub fn classify(&self, r: &RegimeReadings) -> (RegimeType, f64) {
        let c = &self.config;

        let volatile = r.atr_pct >= c.volatile_atr_pct;
        let expanding = r.bb_width_pct >= c.breakout_bb_width_pct && r.volume_ratio >= c.volume_surge_ratio;
        if volatile || expanding {
            let atr_excess = (r.atr_pct / c.volatile_atr_pct - 1.0).max(0.0);
            let volume_excess = (r.volume_ratio / c.volume_surge_ratio - 1.0).max(0.0);
            let confidence = 55.0 + (atr_excess + volume_excess) * 25.0;
            return (RegimeType::VolatileBreakout, confidence.min(95.0));
        }

        if r.bull_aligned() && r.rsi >= c.bull_rsi {
            let confidence = 55.0 + (r.rsi - c.bull_rsi) * 1.5 + (r.trend_spread_pct() * 5.0).min(15.0);
            return (RegimeType::BullMomentum, confidence.min(95.0));
        }
        if r.bear_aligned() && r.rsi <= c.bear_rsi {
            let confidence = 55.0 + (c.bear_rsi - r.rsi) * 1.5 + (r.trend_spread_pct() * 5.0).min(15.0);
            return (RegimeType::BearMomentum, confidence.min(95.0));
        }

        if r.bb_width_pct <= c.squeeze_bb_width_pct && r.volume_ratio >= c.accumulation_volume_ratio {
            let tightness = 1.0 - r.bb_width_pct / c.squeeze_bb_width_pct;
            let confidence = 50.0 + tightness * 20.0 + (r.volume_ratio - c.accumulation_volume_ratio) * 10.0;
            return (RegimeType::Accumulation, confidence.min(90.0));
        }

        if r.bb_width_pct <= c.range_max_bb_width_pct {
            let rsi_mid = (c.bull_rsi + c.bear_rsi) / 2.0;
            let containment = 1.0 - r.bb_width_pct / c.range_max_bb_width_pct;
            if r.price >= r.slow_sma && r.rsi >= c.bear_rsi {
                let confidence = 50.0 + containment * 20.0 + (r.rsi - rsi_mid).max(0.0);
                return (RegimeType::BullRange, confidence.min(85.0));
            }
            if r.price < r.slow_sma && r.rsi <= c.bull_rsi {
                let confidence = 50.0 + containment * 20.0 + (rsi_mid - r.rsi).max(0.0);
                return (RegimeType::BearRange, confidence.min(85.0));
            }
        }

        // Nothing lines up: confidence shrinks as the picture gets clearer
        let clarity = (r.trend_spread_pct() * 10.0).min(20.0);
        (RegimeType::Choppy, 60.0 - clarity)
    }

    /// Full evaluation. Too little history yields the neutral state.
    pub fn detect(&self, symbol: &str, candles: &[Candle], now: DateTime<Utc>) -> RegimeState {
        match self.readings(candles) {
            Some(readings) => {
                let (regime, confidence) = self.classify(&readings);
                RegimeState::classified(symbol, regime, confidence, now)
            }
            None => RegimeState::neutral(symbol, now),
        }
    }
}
