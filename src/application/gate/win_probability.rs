//! Secondary win-probability model consulted by the quality gate.

use serde::Serialize;

/// Inputs available to a win-probability model at gate time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WinFeatures {
    pub weighted_confidence: f64,
    pub agreement_score: f64,
    pub directional_votes: usize,
    pub risk_reward: f64,
    pub strategy_win_rate: f64,
    pub regime_adjustment: f64,
    pub atr_pct: Option<f64>,
}

/// Interface for win-probability models
pub trait WinProbabilityModel: Send + Sync {
    /// Probability (0.0 to 1.0) that the candidate reaches its first target
    fn predict(&self, features: &WinFeatures) -> Result<f64, String>;

    fn name(&self) -> &str;

    fn version(&self) -> &str;
}

/// Hand-fitted logistic model over the consensus features.
#[derive(Debug, Clone)]
pub struct LogisticWinModel {
    pub intercept: f64,
    pub confidence_coef: f64,
    pub agreement_coef: f64,
    pub votes_coef: f64,
    pub risk_reward_coef: f64,
    pub win_rate_coef: f64,
    pub regime_coef: f64,
}

impl Default for LogisticWinModel {
    fn default() -> Self {
        Self {
            intercept: -3.2,
            confidence_coef: 0.025,
            agreement_coef: 0.01,
            votes_coef: 0.05,
            risk_reward_coef: 0.15,
            win_rate_coef: 1.5,
            regime_coef: 0.03,
        }
    }
}

impl WinProbabilityModel for LogisticWinModel {
    fn predict(&self, f: &WinFeatures) -> Result<f64, String> {
        let z = self.intercept
            + self.confidence_coef * f.weighted_confidence
            + self.agreement_coef * f.agreement_score
            + self.votes_coef * f.directional_votes as f64
            + self.risk_reward_coef * f.risk_reward
            + self.win_rate_coef * f.strategy_win_rate
            + self.regime_coef * f.regime_adjustment;

        if !z.is_finite() {
            return Err(format!("non-finite logit from features {:?}", f));
        }
        Ok(1.0 / (1.0 + (-z).exp()))
    }

    fn name(&self) -> &str {
        "logistic"
    }

    fn version(&self) -> &str {
        "1"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn features(confidence: f64, agreement: f64) -> WinFeatures {
        WinFeatures {
            weighted_confidence: confidence,
            agreement_score: agreement,
            directional_votes: 4,
            risk_reward: 1.5,
            strategy_win_rate: 0.5,
            regime_adjustment: 0.0,
            atr_pct: Some(1.0),
        }
    }

    #[test]
    fn test_probability_in_range_and_monotonic() {
        let model = LogisticWinModel::default();
        let weak = model.predict(&features(50.0, 55.0)).unwrap();
        let strong = model.predict(&features(85.0, 95.0)).unwrap();
        assert!((0.0..=1.0).contains(&weak));
        assert!((0.0..=1.0).contains(&strong));
        assert!(strong > weak);
    }

    #[test]
    fn test_nan_input_is_an_error() {
        let model = LogisticWinModel::default();
        assert!(model.predict(&features(f64::NAN, 50.0)).is_err());
    }
}
