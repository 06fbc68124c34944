//! Regime detector windows, classification thresholds and cadence.

use super::env::{parse_f64, parse_i64, parse_u64, parse_usize};
use anyhow::Result;

#[derive(Debug, Clone)]
pub struct RegimeConfig {
    pub reevaluation_interval_secs: u64,
    /// States older than this are replaced by the neutral default on read
    pub max_state_age_secs: i64,
    pub min_candles: usize,

    pub fast_period: usize,
    pub mid_period: usize,
    pub slow_period: usize,
    pub rsi_period: usize,
    pub atr_period: usize,
    pub bb_period: usize,
    pub bb_std_dev: f64,
    pub volume_period: usize,

    pub bull_rsi: f64,
    pub bear_rsi: f64,
    pub volatile_atr_pct: f64,
    pub breakout_bb_width_pct: f64,
    pub volume_surge_ratio: f64,
    pub squeeze_bb_width_pct: f64,
    pub accumulation_volume_ratio: f64,
    pub range_max_bb_width_pct: f64,
}

impl Default for RegimeConfig {
    fn default() -> Self {
        Self {
            reevaluation_interval_secs: 60,
            max_state_age_secs: 300,
            min_candles: 55,
            fast_period: 10,
            mid_period: 20,
            slow_period: 50,
            rsi_period: 14,
            atr_period: 14,
            bb_period: 20,
            bb_std_dev: 2.0,
            volume_period: 20,
            bull_rsi: 55.0,
            bear_rsi: 45.0,
            volatile_atr_pct: 3.0,
            breakout_bb_width_pct: 8.0,
            volume_surge_ratio: 1.8,
            squeeze_bb_width_pct: 3.0,
            accumulation_volume_ratio: 1.2,
            range_max_bb_width_pct: 6.0,
        }
    }
}

impl RegimeConfig {
    pub fn from_env() -> Result<Self> {
        let d = Self::default();
        Ok(Self {
            reevaluation_interval_secs: parse_u64("REGIME_INTERVAL_SECS", d.reevaluation_interval_secs)?.max(1),
            max_state_age_secs: parse_i64("REGIME_MAX_AGE_SECS", d.max_state_age_secs)?,
            min_candles: parse_usize("REGIME_MIN_CANDLES", d.min_candles)?,
            fast_period: parse_usize("REGIME_FAST_PERIOD", d.fast_period)?,
            mid_period: parse_usize("REGIME_MID_PERIOD", d.mid_period)?,
            slow_period: parse_usize("REGIME_SLOW_PERIOD", d.slow_period)?,
            rsi_period: parse_usize("REGIME_RSI_PERIOD", d.rsi_period)?,
            atr_period: parse_usize("REGIME_ATR_PERIOD", d.atr_period)?,
            bb_period: parse_usize("REGIME_BB_PERIOD", d.bb_period)?,
            bb_std_dev: parse_f64("REGIME_BB_STD_DEV", d.bb_std_dev)?,
            volume_period: parse_usize("REGIME_VOLUME_PERIOD", d.volume_period)?,
            bull_rsi: parse_f64("REGIME_BULL_RSI", d.bull_rsi)?,
            bear_rsi: parse_f64("REGIME_BEAR_RSI", d.bear_rsi)?,
            volatile_atr_pct: parse_f64("REGIME_VOLATILE_ATR_PCT", d.volatile_atr_pct)?,
            breakout_bb_width_pct: parse_f64("REGIME_BREAKOUT_BB_WIDTH_PCT", d.breakout_bb_width_pct)?,
            volume_surge_ratio: parse_f64("REGIME_VOLUME_SURGE_RATIO", d.volume_surge_ratio)?,
            squeeze_bb_width_pct: parse_f64("REGIME_SQUEEZE_BB_WIDTH_PCT", d.squeeze_bb_width_pct)?,
            accumulation_volume_ratio: parse_f64("REGIME_ACCUMULATION_VOLUME_RATIO", d.accumulation_volume_ratio)?,
            range_max_bb_width_pct: parse_f64("REGIME_RANGE_MAX_BB_WIDTH_PCT", d.range_max_bb_width_pct)?,
        })
    }

    /// Candles needed before a classification is attempted.
    pub fn required_candles(&self) -> usize {
        self.min_candles
            .max(self.slow_period + 1)
            .max(self.bb_period + 1)
            .max(self.volume_period + 1)
    }
}
