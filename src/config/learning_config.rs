//! Feedback engine: weight update dynamics and the win-rate breaker.

use super::env::{parse_f64, parse_u32, parse_usize};
use crate::domain::errors::ConfigError;
use anyhow::Result;

#[derive(Debug, Clone)]
pub struct LearningConfig {
    /// alpha
    pub learning_rate: f64,
    /// beta
    pub momentum: f64,
    /// lambda, pull toward equal weighting
    pub decay: f64,
    pub min_weight: f64,
    pub max_weight: f64,
    /// Outcomes a strategy needs before its weight may leave equal
    pub min_samples: u32,
    /// Realised return (percent) that maps to a full-size gradient
    pub return_scale_pct: f64,
    /// Gradient multiplier for EXPIRED outcomes
    pub expired_damping: f64,
    /// K: rolling outcome window of the win-rate breaker
    pub breaker_window: usize,
    pub breaker_floor: f64,
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.05,
            momentum: 0.9,
            decay: 0.01,
            min_weight: 0.05,
            max_weight: 0.40,
            min_samples: 5,
            return_scale_pct: 5.0,
            expired_damping: 0.5,
            breaker_window: 20,
            breaker_floor: 0.35,
        }
    }
}

impl LearningConfig {
    pub fn from_env() -> Result<Self> {
        let d = Self::default();
        Ok(Self {
            learning_rate: parse_f64("LEARNING_RATE", d.learning_rate)?,
            momentum: parse_f64("LEARNING_MOMENTUM", d.momentum)?,
            decay: parse_f64("LEARNING_DECAY", d.decay)?,
            min_weight: parse_f64("LEARNING_MIN_WEIGHT", d.min_weight)?,
            max_weight: parse_f64("LEARNING_MAX_WEIGHT", d.max_weight)?,
            min_samples: parse_u32("LEARNING_MIN_SAMPLES", d.min_samples)?,
            return_scale_pct: parse_f64("LEARNING_RETURN_SCALE_PCT", d.return_scale_pct)?,
            expired_damping: parse_f64("LEARNING_EXPIRED_DAMPING", d.expired_damping)?,
            breaker_window: parse_usize("LEARNING_BREAKER_WINDOW", d.breaker_window)?,
            breaker_floor: parse_f64("LEARNING_BREAKER_FLOOR", d.breaker_floor)?,
        })
    }

    /// Bounds must admit the equal weight of `strategy_count` strategies.
    pub fn validate(&self, strategy_count: usize) -> Result<(), ConfigError> {
        if !(0.0..1.0).contains(&self.momentum) {
            return Err(ConfigError::InvalidValue {
                key: "LEARNING_MOMENTUM".to_string(),
                reason: format!("{} not in [0, 1)", self.momentum),
            });
        }
        if self.return_scale_pct <= 0.0 {
            return Err(ConfigError::InvalidValue {
                key: "LEARNING_RETURN_SCALE_PCT".to_string(),
                reason: "must be positive".to_string(),
            });
        }
        if strategy_count > 0 {
            let equal = 1.0 / strategy_count as f64;
            if self.min_weight > equal || self.max_weight < equal {
                return Err(ConfigError::InvalidValue {
                    key: "LEARNING_MIN_WEIGHT/LEARNING_MAX_WEIGHT".to_string(),
                    reason: format!(
                        "[{}, {}] does not contain the equal weight {:.4}",
                        self.min_weight, self.max_weight, equal
                    ),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_bounds_fit_six_strategies() {
        assert!(LearningConfig::default().validate(6).is_ok());
    }

    #[test]
    fn test_bounds_excluding_equal_weight_rejected() {
        let cfg = LearningConfig {
            min_weight: 0.3,
            ..LearningConfig::default()
        };
        assert!(cfg.validate(6).is_err());
    }
}
