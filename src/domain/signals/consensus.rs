use crate::domain::market::RegimeType;
use crate::domain::signals::opinion::Direction;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum QualityTier {
    Low,
    Medium,
    High,
}

impl QualityTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            QualityTier::High => "HIGH",
            QualityTier::Medium => "MEDIUM",
            QualityTier::Low => "LOW",
        }
    }

    /// Tier derivation. The regime adjustment is added to confidence and
    /// agreement before comparison, never to the thresholds themselves.
    pub fn classify(
        weighted_confidence: f64,
        agreement_score: f64,
        directional_votes: usize,
        quality_adjustment: f64,
        thresholds: &TierThresholds,
    ) -> QualityTier {
        let confidence = weighted_confidence + quality_adjustment;
        let agreement = agreement_score + quality_adjustment;

        if confidence >= thresholds.high_confidence
            && agreement >= thresholds.high_agreement
            && directional_votes >= thresholds.high_min_votes
        {
            QualityTier::High
        } else if confidence >= thresholds.medium_confidence
            && agreement >= thresholds.medium_agreement
            && directional_votes >= thresholds.medium_min_votes
        {
            QualityTier::Medium
        } else {
            QualityTier::Low
        }
    }
}

impl fmt::Display for QualityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for QualityTier {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "HIGH" => Ok(QualityTier::High),
            "MEDIUM" => Ok(QualityTier::Medium),
            "LOW" => Ok(QualityTier::Low),
            _ => anyhow::bail!("Invalid quality tier: {}", s),
        }
    }
}

/// Pre-adjustment tier thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TierThresholds {
    pub high_confidence: f64,
    pub high_agreement: f64,
    pub high_min_votes: usize,
    pub medium_confidence: f64,
    pub medium_agreement: f64,
    pub medium_min_votes: usize,
}

impl Default for TierThresholds {
    fn default() -> Self {
        Self {
            high_confidence: 70.0,
            high_agreement: 75.0,
            high_min_votes: 4,
            medium_confidence: 55.0,
            medium_agreement: 60.0,
            medium_min_votes: 3,
        }
    }
}

/// A strategy's part in the winning bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contribution {
    pub strategy_id: String,
    pub weight: f64,
    pub confidence: f64,
    /// weight x confidence / 100
    pub contribution: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusResult {
    pub symbol: String,
    pub direction: Direction,
    /// Weight-averaged confidence of the winning bucket (0-100)
    pub weighted_confidence: f64,
    /// Winning bucket weight over total directional weight (0-100)
    pub agreement_score: f64,
    /// Winning bucket vote share over total weight (0-100)
    pub vote_share: f64,
    pub opposing_share: f64,
    pub votes_for: usize,
    pub votes_against: usize,
    pub quality_tier: QualityTier,
    pub regime_at_evaluation: RegimeType,
    pub threshold_used: f64,
    pub quality_adjustment: f64,
    /// Sorted by contribution, largest first
    pub contributors: Vec<Contribution>,
}

impl ConsensusResult {
    /// Strategy credited as the signal's originator.
    pub fn primary_strategy(&self) -> Option<&str> {
        self.contributors.first().map(|c| c.strategy_id.as_str())
    }

    pub fn contributor_ids(&self) -> Vec<String> {
        self.contributors
            .iter()
            .map(|c| c.strategy_id.clone())
            .collect()
    }

    pub fn directional_votes(&self) -> usize {
        self.votes_for + self.votes_against
    }
}

/// Why a cycle ended without a direction. Carries the losing shares so the
/// rejection can be diagnosed from logs alone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoConsensus {
    pub symbol: String,
    pub long_share: f64,
    pub short_share: f64,
    pub threshold_used: f64,
    pub opinions: usize,
    pub regime_at_evaluation: RegimeType,
    pub reason: String,
}

impl fmt::Display for NoConsensus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (long {:.1}%, short {:.1}%, threshold {:.1}%, {} opinions, regime {})",
            self.reason,
            self.long_share,
            self.short_share,
            self.threshold_used,
            self.opinions,
            self.regime_at_evaluation
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConsensusDecision {
    Reached(ConsensusResult),
    NotReached(NoConsensus),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_without_adjustment() {
        let t = TierThresholds::default();
        assert_eq!(QualityTier::classify(72.0, 80.0, 4, 0.0, &t), QualityTier::High);
        assert_eq!(QualityTier::classify(72.0, 80.0, 3, 0.0, &t), QualityTier::Medium);
        assert_eq!(QualityTier::classify(56.0, 61.0, 3, 0.0, &t), QualityTier::Medium);
        assert_eq!(QualityTier::classify(56.0, 61.0, 2, 0.0, &t), QualityTier::Low);
    }

    #[test]
    fn test_trend_adjustment_promotes_tier() {
        let t = TierThresholds::default();
        // 62/68 is MEDIUM on its own, +10 lifts both above the HIGH bar
        assert_eq!(QualityTier::classify(62.0, 68.0, 4, 0.0, &t), QualityTier::Medium);
        assert_eq!(QualityTier::classify(62.0, 68.0, 4, 10.0, &t), QualityTier::High);
    }

    #[test]
    fn test_choppy_adjustment_demotes_tier() {
        let t = TierThresholds::default();
        assert_eq!(QualityTier::classify(57.0, 62.0, 3, 0.0, &t), QualityTier::Medium);
        assert_eq!(QualityTier::classify(57.0, 62.0, 3, -5.0, &t), QualityTier::Low);
    }

    #[test]
    fn test_adjustment_cannot_replace_votes() {
        let t = TierThresholds::default();
        assert_eq!(QualityTier::classify(95.0, 95.0, 2, 10.0, &t), QualityTier::Low);
    }
}
