//! Seven-factor quality score.
//!
//! Each factor is normalised to 0..=1 and multiplied by its weight from
//! `FactorWeights`; the weights sum to 100 so the total is a 0-100 score.

use crate::config::QualityGateConfig;
use crate::domain::errors::GateRejection;
use crate::domain::market::{RegimeState, RegimeType};
use crate::domain::performance::PerformanceBook;
use serde::Serialize;

/// Normalised factor values (0..=1).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FactorScores {
    pub confidence: f64,
    pub win_probability: f64,
    pub volatility: f64,
    pub regime: f64,
    pub risk_reward: f64,
    pub strategy_win_rate: f64,
    pub session: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct QualityScore {
    pub total: f64,
    pub factors: FactorScores,
}

pub struct ScoringInput<'a> {
    pub weighted_confidence: f64,
    pub win_probability: f64,
    pub atr_pct: Option<f64>,
    pub regime: &'a RegimeState,
    pub contributors: &'a [String],
    pub risk_reward: f64,
    pub strategy_win_rate: f64,
    /// UTC hour of evaluation
    pub hour: u32,
}

/// Win rate the gate uses for a strategy in a regime, and whether it comes
/// from real history.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedWinRate {
    pub win_rate: f64,
    pub seasoned: bool,
}

#[derive(Debug, Clone)]
pub struct QualityScorer {
    config: QualityGateConfig,
}

impl QualityScorer {
    pub fn new(config: QualityGateConfig) -> Self {
        Self { config }
    }

    /// History-based win rate, or the neutral default below the sample
    /// minimum. One floor applies to both cases.
    pub fn resolve_win_rate(&self, book: &PerformanceBook, strategy_id: &str, regime: RegimeType) -> ResolvedWinRate {
        match book.win_rate_for(strategy_id, regime, self.config.win_rate_min_samples) {
            Some(win_rate) => ResolvedWinRate { win_rate, seasoned: true },
            None => ResolvedWinRate {
                win_rate: self.config.neutral_win_rate,
                seasoned: false,
            },
        }
    }

    pub fn check_win_rate_floor(&self, strategy_id: &str, resolved: ResolvedWinRate) -> Result<(), GateRejection> {
        if resolved.win_rate < self.config.min_strategy_win_rate {
            return Err(GateRejection::StrategyWinRateTooLow {
                strategy_id: strategy_id.to_string(),
                win_rate: resolved.win_rate,
                min: self.config.min_strategy_win_rate,
            });
        }
        Ok(())
    }

    pub fn check_win_probability_floor(&self, probability: f64) -> Result<(), GateRejection> {
        if probability < self.config.min_win_probability {
            return Err(GateRejection::WinProbabilityTooLow {
                probability,
                min: self.config.min_win_probability,
            });
        }
        Ok(())
    }

    pub fn score(&self, input: &ScoringInput<'_>) -> QualityScore {
        let factors = FactorScores {
            confidence: (input.weighted_confidence / 100.0).clamp(0.0, 1.0),
            win_probability: input.win_probability.clamp(0.0, 1.0),
            volatility: self.volatility_factor(input.atr_pct),
            regime: regime_factor(input.regime, input.contributors),
            risk_reward: (input.risk_reward / self.config.full_score_risk_reward).clamp(0.0, 1.0),
            strategy_win_rate: input.strategy_win_rate.clamp(0.0, 1.0),
            session: session_factor(input.hour),
        };

        let w = &self.config.factor_weights;
        let total = factors.confidence * w.confidence
            + factors.win_probability * w.win_probability
            + factors.volatility * w.volatility
            + factors.regime * w.regime
            + factors.risk_reward * w.risk_reward
            + factors.strategy_win_rate * w.strategy_win_rate
            + factors.session * w.session;

        QualityScore {
            total: total.clamp(0.0, 100.0),
            factors,
        }
    }

    /// Full marks inside the ideal ATR band, linear decay outside it.
    fn volatility_factor(&self, atr_pct: Option<f64>) -> f64 {
        let min = self.config.ideal_atr_pct_min;
        let max = self.config.ideal_atr_pct_max;
        match atr_pct {
            None => 0.5,
            Some(v) if v <= 0.0 => 0.0,
            Some(v) if v < min => v / min,
            Some(v) if v <= max => 1.0,
            Some(v) => (max / v).clamp(0.0, 1.0),
        }
    }
}

/// Quality adjustment mapped from -5..=10 onto 0..=1 (70%), plus the share
/// of contributors the regime recommends (30%).
fn regime_factor(regime: &RegimeState, contributors: &[String]) -> f64 {
    let adjustment = ((regime.quality_adjustment + 5.0) / 15.0).clamp(0.0, 1.0);
    let recommended = if contributors.is_empty() {
        0.0
    } else {
        contributors.iter().filter(|c| regime.recommends(c)).count() as f64 / contributors.len() as f64
    };
    0.7 * adjustment + 0.3 * recommended
}

/// Liquidity by UTC hour.
fn session_factor(hour: u32) -> f64 {
    match hour {
        13..=16 => 1.0, // London/New York overlap
        7..=12 => 0.8,
        17..=20 => 0.7,
        21..=23 => 0.6,
        _ => 0.5,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::performance::StrategyPerformanceRecord;
    use crate::domain::signals::SignalStatus;
    use chrono::Utc;

    fn scorer() -> QualityScorer {
        QualityScorer::new(QualityGateConfig::default())
    }

    #[test]
    fn test_perfect_inputs_score_100() {
        let regime = RegimeState::classified("BTCUSDT", RegimeType::BullMomentum, 90.0, Utc::now());
        let contributors = vec!["TrendAlignment".to_string()];
        let score = scorer().score(&ScoringInput {
            weighted_confidence: 100.0,
            win_probability: 1.0,
            atr_pct: Some(1.0),
            regime: &regime,
            contributors: &contributors,
            risk_reward: 3.0,
            strategy_win_rate: 1.0,
            hour: 14,
        });
        assert!((score.total - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_volatility_band() {
        let s = scorer();
        assert_eq!(s.volatility_factor(Some(1.0)), 1.0);
        assert_eq!(s.volatility_factor(Some(0.25)), 0.5);
        assert_eq!(s.volatility_factor(Some(6.0)), 0.5);
        assert_eq!(s.volatility_factor(None), 0.5);
    }

    #[test]
    fn test_new_strategy_gets_neutral_rate_and_passes_floor() {
        let s = scorer();
        let book = PerformanceBook::default();
        let resolved = s.resolve_win_rate(&book, "BrandNew", RegimeType::Choppy);
        assert_eq!(resolved.win_rate, 0.5);
        assert!(!resolved.seasoned);
        assert!(s.check_win_rate_floor("BrandNew", resolved).is_ok());
    }

    #[test]
    fn test_seasoned_losing_strategy_fails_same_floor() {
        let s = scorer();
        let now = Utc::now();
        let mut record = StrategyPerformanceRecord::new("Loser", RegimeType::Choppy, now);
        for _ in 0..2 {
            record.record(SignalStatus::Success, now);
        }
        for _ in 0..6 {
            record.record(SignalStatus::Failed, now);
        }
        let book = PerformanceBook::from_records(vec![record]);

        let resolved = s.resolve_win_rate(&book, "Loser", RegimeType::Choppy);
        assert!(resolved.seasoned);
        assert_eq!(resolved.win_rate, 0.25);
        assert!(matches!(
            s.check_win_rate_floor("Loser", resolved),
            Err(GateRejection::StrategyWinRateTooLow { .. })
        ));
    }

    #[test]
    fn test_session_table() {
        assert_eq!(session_factor(14), 1.0);
        assert_eq!(session_factor(3), 0.5);
    }
}
