//! Quality tier thresholds (pre regime adjustment).

use super::env::{parse_f64, parse_usize};
use crate::domain::signals::TierThresholds;
use anyhow::Result;

#[derive(Debug, Clone, Default)]
pub struct ConsensusConfig {
    pub tiers: TierThresholds,
}

impl ConsensusConfig {
    pub fn from_env() -> Result<Self> {
        let d = TierThresholds::default();
        Ok(Self {
            tiers: TierThresholds {
                high_confidence: parse_f64("TIER_HIGH_CONFIDENCE", d.high_confidence)?,
                high_agreement: parse_f64("TIER_HIGH_AGREEMENT", d.high_agreement)?,
                high_min_votes: parse_usize("TIER_HIGH_MIN_VOTES", d.high_min_votes)?,
                medium_confidence: parse_f64("TIER_MEDIUM_CONFIDENCE", d.medium_confidence)?,
                medium_agreement: parse_f64("TIER_MEDIUM_AGREEMENT", d.medium_agreement)?,
                medium_min_votes: parse_usize("TIER_MEDIUM_MIN_VOTES", d.medium_min_votes)?,
            },
        })
    }
}
