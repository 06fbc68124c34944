//! Quality gate configuration.
//!
//! Every threshold that can stop a candidate lives here, next to the
//! neutral default it interacts with, so they are tuned together.

use super::env::{parse_f64, parse_f64_list, parse_i64, parse_u32, parse_u64, parse_usize};
use crate::domain::errors::ConfigError;
use anyhow::Result;
use tracing::warn;

/// Factor weights of the 0-100 quality score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FactorWeights {
    pub confidence: f64,
    pub win_probability: f64,
    pub volatility: f64,
    pub regime: f64,
    pub risk_reward: f64,
    pub strategy_win_rate: f64,
    pub session: f64,
}

impl Default for FactorWeights {
    fn default() -> Self {
        Self {
            confidence: 30.0,
            win_probability: 20.0,
            volatility: 15.0,
            regime: 10.0,
            risk_reward: 10.0,
            strategy_win_rate: 10.0,
            session: 5.0,
        }
    }
}

impl FactorWeights {
    pub fn sum(&self) -> f64 {
        self.confidence
            + self.win_probability
            + self.volatility
            + self.regime
            + self.risk_reward
            + self.strategy_win_rate
            + self.session
    }
}

#[derive(Debug, Clone)]
pub struct QualityGateConfig {
    // Score thresholds
    pub min_accept_score: f64,
    pub excellent_score: f64,

    // Hard floors
    pub min_win_probability: f64,
    /// Single floor for the strategy win-rate factor, seasoned or not
    pub min_strategy_win_rate: f64,
    /// Win rate assumed for strategies without enough history
    pub neutral_win_rate: f64,
    pub win_rate_min_samples: u32,

    pub factor_weights: FactorWeights,

    // Volatility band (ATR as % of price)
    pub ideal_atr_pct_min: f64,
    pub ideal_atr_pct_max: f64,
    /// Risk/reward (first target) that earns the full factor
    pub full_score_risk_reward: f64,

    // Publication budget
    pub daily_limit: u32,
    pub hourly_cap: u32,
    pub min_spacing_minutes: i64,
    pub queue_capacity: usize,
    pub candidate_ttl_seconds: i64,
    pub flush_interval_secs: u64,

    // Signal construction
    pub stop_atr_multiple: f64,
    pub fallback_stop_pct: f64,
    pub target_r_multiples: Vec<f64>,
    pub signal_ttl_minutes: i64,

    pub persist_retry_delay_ms: u64,
}

impl Default for QualityGateConfig {
    fn default() -> Self {
        Self {
            min_accept_score: 65.0,
            excellent_score: 85.0,
            min_win_probability: 0.45,
            min_strategy_win_rate: 0.45,
            neutral_win_rate: 0.5,
            win_rate_min_samples: 5,
            factor_weights: FactorWeights::default(),
            ideal_atr_pct_min: 0.5,
            ideal_atr_pct_max: 3.0,
            full_score_risk_reward: 3.0,
            daily_limit: 8,
            hourly_cap: 2,
            min_spacing_minutes: 30,
            queue_capacity: 10,
            candidate_ttl_seconds: 600,
            flush_interval_secs: 60,
            stop_atr_multiple: 1.5,
            fallback_stop_pct: 0.02,
            target_r_multiples: vec![1.5, 2.5, 4.0],
            signal_ttl_minutes: 240,
            persist_retry_delay_ms: 200,
        }
    }
}

impl QualityGateConfig {
    pub fn from_env() -> Result<Self> {
        let d = Self::default();
        let w = d.factor_weights;
        Ok(Self {
            min_accept_score: parse_f64("GATE_MIN_ACCEPT_SCORE", d.min_accept_score)?,
            excellent_score: parse_f64("GATE_EXCELLENT_SCORE", d.excellent_score)?,
            min_win_probability: parse_f64("GATE_MIN_WIN_PROBABILITY", d.min_win_probability)?,
            min_strategy_win_rate: parse_f64("GATE_MIN_STRATEGY_WIN_RATE", d.min_strategy_win_rate)?,
            neutral_win_rate: parse_f64("GATE_NEUTRAL_WIN_RATE", d.neutral_win_rate)?,
            win_rate_min_samples: parse_u32("GATE_WIN_RATE_MIN_SAMPLES", d.win_rate_min_samples)?,
            factor_weights: FactorWeights {
                confidence: parse_f64("GATE_WEIGHT_CONFIDENCE", w.confidence)?,
                win_probability: parse_f64("GATE_WEIGHT_WIN_PROBABILITY", w.win_probability)?,
                volatility: parse_f64("GATE_WEIGHT_VOLATILITY", w.volatility)?,
                regime: parse_f64("GATE_WEIGHT_REGIME", w.regime)?,
                risk_reward: parse_f64("GATE_WEIGHT_RISK_REWARD", w.risk_reward)?,
                strategy_win_rate: parse_f64("GATE_WEIGHT_STRATEGY_WIN_RATE", w.strategy_win_rate)?,
                session: parse_f64("GATE_WEIGHT_SESSION", w.session)?,
            },
            ideal_atr_pct_min: parse_f64("GATE_IDEAL_ATR_PCT_MIN", d.ideal_atr_pct_min)?,
            ideal_atr_pct_max: parse_f64("GATE_IDEAL_ATR_PCT_MAX", d.ideal_atr_pct_max)?,
            full_score_risk_reward: parse_f64("GATE_FULL_SCORE_RISK_REWARD", d.full_score_risk_reward)?,
            daily_limit: parse_u32("BUDGET_DAILY_LIMIT", d.daily_limit)?,
            hourly_cap: parse_u32("BUDGET_HOURLY_CAP", d.hourly_cap)?,
            min_spacing_minutes: parse_i64("BUDGET_MIN_SPACING_MINUTES", d.min_spacing_minutes)?,
            queue_capacity: parse_usize("BUDGET_QUEUE_CAPACITY", d.queue_capacity)?,
            candidate_ttl_seconds: parse_i64("BUDGET_CANDIDATE_TTL_SECONDS", d.candidate_ttl_seconds)?,
            flush_interval_secs: parse_u64("BUDGET_FLUSH_INTERVAL_SECS", d.flush_interval_secs)?.max(1),
            stop_atr_multiple: parse_f64("SIGNAL_STOP_ATR_MULTIPLE", d.stop_atr_multiple)?,
            fallback_stop_pct: parse_f64("SIGNAL_FALLBACK_STOP_PCT", d.fallback_stop_pct)?,
            target_r_multiples: parse_f64_list("SIGNAL_TARGET_R_MULTIPLES", &d.target_r_multiples)?,
            signal_ttl_minutes: parse_i64("SIGNAL_TTL_MINUTES", d.signal_ttl_minutes)?,
            persist_retry_delay_ms: parse_u64("GATE_PERSIST_RETRY_DELAY_MS", d.persist_retry_delay_ms)?,
        })
    }

    /// Rejects settings that can never publish anything sensible.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let sum = self.factor_weights.sum();
        if (sum - 100.0).abs() > 1e-6 {
            return Err(ConfigError::FactorWeightSum { sum });
        }
        if self.excellent_score < self.min_accept_score {
            return Err(ConfigError::ThresholdOrder {
                excellent: self.excellent_score,
                min_accept: self.min_accept_score,
            });
        }
        if self.target_r_multiples.is_empty() || self.target_r_multiples.len() > 3 {
            return Err(ConfigError::InvalidValue {
                key: "SIGNAL_TARGET_R_MULTIPLES".to_string(),
                reason: format!("expected 1 to 3 values, got {}", self.target_r_multiples.len()),
            });
        }
        if self
            .target_r_multiples
            .windows(2)
            .any(|pair| pair[1] <= pair[0])
            || self.target_r_multiples[0] <= 0.0
        {
            return Err(ConfigError::InvalidValue {
                key: "SIGNAL_TARGET_R_MULTIPLES".to_string(),
                reason: "must be positive and strictly increasing".to_string(),
            });
        }
        if self.stop_atr_multiple <= 0.0 || self.fallback_stop_pct <= 0.0 {
            return Err(ConfigError::InvalidValue {
                key: "SIGNAL_STOP_ATR_MULTIPLE/SIGNAL_FALLBACK_STOP_PCT".to_string(),
                reason: "must be positive".to_string(),
            });
        }
        if self.signal_ttl_minutes <= 0 {
            return Err(ConfigError::InvalidValue {
                key: "SIGNAL_TTL_MINUTES".to_string(),
                reason: "must be positive".to_string(),
            });
        }
        if self.neutral_win_rate < self.min_strategy_win_rate {
            warn!(
                "QualityGateConfig: neutral win rate {:.2} is below the strategy win-rate floor {:.2}; strategies without history will never pass",
                self.neutral_win_rate, self.min_strategy_win_rate
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let cfg = QualityGateConfig::default();
        assert!(cfg.validate().is_ok());
        assert!((cfg.factor_weights.sum() - 100.0).abs() < 1e-9);
        assert!(cfg.neutral_win_rate >= cfg.min_strategy_win_rate);
    }

    #[test]
    fn test_factor_weights_must_sum_to_100() {
        let mut cfg = QualityGateConfig::default();
        cfg.factor_weights.session = 10.0;
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::FactorWeightSum { sum: 105.0 })
        );
    }

    #[test]
    fn test_excellent_below_minimum_rejected() {
        let cfg = QualityGateConfig {
            excellent_score: 60.0,
            ..QualityGateConfig::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::ThresholdOrder { .. })
        ));
    }

    #[test]
    fn test_targets_must_increase() {
        let cfg = QualityGateConfig {
            target_r_multiples: vec![2.0, 1.0],
            ..QualityGateConfig::default()
        };
        assert!(cfg.validate().is_err());
    }
}
