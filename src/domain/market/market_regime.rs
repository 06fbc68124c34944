use crate::domain::signals::strategy_ids::{
    BOLLINGER_BREAKOUT, RSI_REVERSAL, STAT_MOMENTUM, TREND_ALIGNMENT, VOLUME_SURGE, ZSCORE_MR,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Consensus threshold used whenever no trustworthy classification exists
/// (insufficient history or an expired regime state).
pub const NEUTRAL_CONSENSUS_THRESHOLD: f64 = 50.0;

/// Market regime classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RegimeType {
    BullMomentum,
    BearMomentum,
    BullRange,
    BearRange,
    Choppy,
    VolatileBreakout,
    Accumulation,
}

impl RegimeType {
    pub const ALL: [RegimeType; 7] = [
        RegimeType::BullMomentum,
        RegimeType::BearMomentum,
        RegimeType::BullRange,
        RegimeType::BearRange,
        RegimeType::Choppy,
        RegimeType::VolatileBreakout,
        RegimeType::Accumulation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RegimeType::BullMomentum => "BULL_MOMENTUM",
            RegimeType::BearMomentum => "BEAR_MOMENTUM",
            RegimeType::BullRange => "BULL_RANGE",
            RegimeType::BearRange => "BEAR_RANGE",
            RegimeType::Choppy => "CHOPPY",
            RegimeType::VolatileBreakout => "VOLATILE_BREAKOUT",
            RegimeType::Accumulation => "ACCUMULATION",
        }
    }

    /// Static adaptation table for this regime.
    pub fn profile(&self) -> RegimeProfile {
        match self {
            RegimeType::BullMomentum => RegimeProfile {
                consensus_threshold: 42.0,
                quality_adjustment: 10.0,
                recommended_strategies: &[TREND_ALIGNMENT, STAT_MOMENTUM, BOLLINGER_BREAKOUT],
                position_size_multiplier: 1.5,
            },
            RegimeType::BearMomentum => RegimeProfile {
                consensus_threshold: 44.0,
                quality_adjustment: 8.0,
                recommended_strategies: &[TREND_ALIGNMENT, STAT_MOMENTUM, BOLLINGER_BREAKOUT],
                position_size_multiplier: 1.3,
            },
            RegimeType::BullRange => RegimeProfile {
                consensus_threshold: 48.0,
                quality_adjustment: 3.0,
                recommended_strategies: &[ZSCORE_MR, RSI_REVERSAL, TREND_ALIGNMENT],
                position_size_multiplier: 1.1,
            },
            RegimeType::BearRange => RegimeProfile {
                consensus_threshold: 50.0,
                quality_adjustment: 0.0,
                recommended_strategies: &[ZSCORE_MR, RSI_REVERSAL],
                position_size_multiplier: 0.9,
            },
            RegimeType::Choppy => RegimeProfile {
                consensus_threshold: 58.0,
                quality_adjustment: -5.0,
                recommended_strategies: &[ZSCORE_MR, RSI_REVERSAL],
                position_size_multiplier: 0.6,
            },
            RegimeType::VolatileBreakout => RegimeProfile {
                consensus_threshold: 52.0,
                quality_adjustment: 5.0,
                recommended_strategies: &[BOLLINGER_BREAKOUT, VOLUME_SURGE, STAT_MOMENTUM],
                position_size_multiplier: 0.8,
            },
            RegimeType::Accumulation => RegimeProfile {
                consensus_threshold: 50.0,
                quality_adjustment: 2.0,
                recommended_strategies: &[VOLUME_SURGE, ZSCORE_MR],
                position_size_multiplier: 1.0,
            },
        }
    }
}

impl fmt::Display for RegimeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for RegimeType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RegimeType::ALL
            .iter()
            .copied()
            .find(|r| r.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| anyhow::anyhow!("Invalid regime: {}", s))
    }
}

/// Per-regime adaptation parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegimeProfile {
    /// Weighted vote share (percent) a direction must exceed to form consensus
    pub consensus_threshold: f64,
    /// Added to confidence and agreement before quality tier comparison
    pub quality_adjustment: f64,
    pub recommended_strategies: &'static [&'static str],
    pub position_size_multiplier: f64,
}

/// Latest regime classification for one symbol.
///
/// Written only by the regime service; every other stage reads snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimeState {
    pub symbol: String,
    pub regime: RegimeType,
    /// Confidence of the classification itself (0-100)
    pub confidence: f64,
    pub adaptive_consensus_threshold: f64,
    pub quality_adjustment: f64,
    pub recommended_strategies: Vec<String>,
    pub position_size_multiplier: f64,
    pub evaluated_at: DateTime<Utc>,
    /// True when the state is the fallback rather than a real classification
    pub neutral: bool,
}

impl RegimeState {
    pub fn classified(
        symbol: impl Into<String>,
        regime: RegimeType,
        confidence: f64,
        evaluated_at: DateTime<Utc>,
    ) -> Self {
        let profile = regime.profile();
        Self {
            symbol: symbol.into(),
            regime,
            confidence: confidence.clamp(0.0, 100.0),
            adaptive_consensus_threshold: profile.consensus_threshold,
            quality_adjustment: profile.quality_adjustment,
            recommended_strategies: profile
                .recommended_strategies
                .iter()
                .map(|s| s.to_string())
                .collect(),
            position_size_multiplier: profile.position_size_multiplier,
            evaluated_at,
            neutral: false,
        }
    }

    /// Fallback state: CHOPPY label with a neutral threshold and no adjustment.
    pub fn neutral(symbol: impl Into<String>, evaluated_at: DateTime<Utc>) -> Self {
        Self {
            symbol: symbol.into(),
            regime: RegimeType::Choppy,
            confidence: 0.0,
            adaptive_consensus_threshold: NEUTRAL_CONSENSUS_THRESHOLD,
            quality_adjustment: 0.0,
            recommended_strategies: Vec::new(),
            position_size_multiplier: 1.0,
            evaluated_at,
            neutral: true,
        }
    }

    pub fn is_stale(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        now - self.evaluated_at > max_age
    }

    /// The classified regime, `None` for the fallback state.
    pub fn label(&self) -> Option<RegimeType> {
        (!self.neutral).then_some(self.regime)
    }

    pub fn recommends(&self, strategy_id: &str) -> bool {
        self.recommended_strategies.iter().any(|s| s == strategy_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_table_ranges() {
        for regime in RegimeType::ALL {
            let p = regime.profile();
            assert!((42.0..=58.0).contains(&p.consensus_threshold), "{}", regime);
            assert!((-5.0..=10.0).contains(&p.quality_adjustment), "{}", regime);
            assert!((0.6..=1.5).contains(&p.position_size_multiplier), "{}", regime);
            assert!(!p.recommended_strategies.is_empty());
        }
    }

    #[test]
    fn test_regime_round_trips_through_str() {
        for regime in RegimeType::ALL {
            assert_eq!(regime.as_str().parse::<RegimeType>().unwrap(), regime);
        }
        assert!("SIDEWAYS".parse::<RegimeType>().is_err());
    }

    #[test]
    fn test_neutral_state() {
        let state = RegimeState::neutral("ETHUSDT", Utc::now());
        assert_eq!(state.regime, RegimeType::Choppy);
        assert_eq!(state.adaptive_consensus_threshold, 50.0);
        assert_eq!(state.quality_adjustment, 0.0);
        assert!(state.neutral);
    }

    #[test]
    fn test_staleness() {
        let now = Utc::now();
        let state = RegimeState::classified("BTCUSDT", RegimeType::BullMomentum, 80.0, now);
        assert!(!state.is_stale(now + Duration::minutes(4), Duration::minutes(5)));
        assert!(state.is_stale(now + Duration::minutes(6), Duration::minutes(5)));
    }
}
