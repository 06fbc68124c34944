use crate::config::ConsensusConfig;
use crate::domain::market::RegimeState;
use crate::domain::performance::WeightVector;
use crate::domain::signals::{
    ConsensusDecision, ConsensusResult, Contribution, Direction, NoConsensus, QualityTier,
    StrategyOpinion,
};
use tracing::debug;

#[derive(Default)]
struct Bucket {
    /// sum of weight x confidence / 100
    score: f64,
    /// sum of raw weights
    weight: f64,
    votes: usize,
    contributions: Vec<Contribution>,
}

impl Bucket {
    fn add(&mut self, strategy_id: &str, weight: f64, confidence: f64) {
        let contribution = weight * confidence / 100.0;
        self.score += contribution;
        self.weight += weight;
        self.votes += 1;
        self.contributions.push(Contribution {
            strategy_id: strategy_id.to_string(),
            weight,
            confidence,
            contribution,
        });
    }
}

/// Weighted vote over one cycle's opinions.
///
/// Vote share per direction is `sum(w x c/100)` over the total weight of
/// every strategy that voted, neutral ones included. A direction wins when
/// its share exceeds the regime's adaptive threshold and the other
/// direction's share; equal shares are no consensus.
#[derive(Debug, Clone, Default)]
pub struct ConsensusAggregator {
    config: ConsensusConfig,
}

impl ConsensusAggregator {
    pub fn new(config: ConsensusConfig) -> Self {
        Self { config }
    }

    pub fn aggregate(
        &self,
        symbol: &str,
        opinions: &[StrategyOpinion],
        weights: &WeightVector,
        regime: &RegimeState,
    ) -> ConsensusDecision {
        let threshold = regime.adaptive_consensus_threshold;
        let fallback = weights.equal_weight();

        let mut long = Bucket::default();
        let mut short = Bucket::default();
        let mut total_weight = 0.0;

        for opinion in opinions.iter().filter(|o| o.is_valid()) {
            let weight = weights.get(&opinion.strategy_id).unwrap_or(fallback);
            if weight <= 0.0 {
                continue;
            }
            total_weight += weight;
            match opinion.direction {
                Some(Direction::Long) => long.add(&opinion.strategy_id, weight, opinion.confidence),
                Some(Direction::Short) => short.add(&opinion.strategy_id, weight, opinion.confidence),
                None => {}
            }
        }

        let no_consensus = |long_share: f64, short_share: f64, reason: &str| {
            ConsensusDecision::NotReached(NoConsensus {
                symbol: symbol.to_string(),
                long_share,
                short_share,
                threshold_used: threshold,
                opinions: opinions.len(),
                regime_at_evaluation: regime.regime,
                reason: reason.to_string(),
            })
        };

        if total_weight <= 0.0 {
            return no_consensus(0.0, 0.0, "no opinions");
        }

        let long_share = long.score / total_weight * 100.0;
        let short_share = short.score / total_weight * 100.0;

        let (direction, winner, loser, share, opposing) = if long_share > short_share {
            (Direction::Long, long, short, long_share, short_share)
        } else if short_share > long_share {
            (Direction::Short, short, long, short_share, long_share)
        } else {
            let reason = if long_share == 0.0 {
                "no directional votes"
            } else {
                "long and short shares tied"
            };
            return no_consensus(long_share, short_share, reason);
        };

        if share <= threshold {
            return no_consensus(long_share, short_share, "vote share below adaptive threshold");
        }

        let directional_weight = winner.weight + loser.weight;
        let agreement_score = winner.weight / directional_weight * 100.0;
        let weighted_confidence = winner.score / winner.weight * 100.0;
        let directional_votes = winner.votes + loser.votes;

        let quality_tier = QualityTier::classify(
            weighted_confidence,
            agreement_score,
            directional_votes,
            regime.quality_adjustment,
            &self.config.tiers,
        );

        let mut contributors = winner.contributions;
        contributors.sort_by(|a, b| b.contribution.total_cmp(&a.contribution));

        debug!(
            "ConsensusAggregator [{}]: {} share {:.1}% (threshold {:.1}%) confidence {:.1} agreement {:.1} tier {}",
            symbol, direction, share, threshold, weighted_confidence, agreement_score, quality_tier
        );

        ConsensusDecision::Reached(ConsensusResult {
            symbol: symbol.to_string(),
            direction,
            weighted_confidence,
            agreement_score,
            vote_share: share,
            opposing_share: opposing,
            votes_for: winner.votes,
            votes_against: loser.votes,
            quality_tier,
            regime_at_evaluation: regime.regime,
            threshold_used: threshold,
            quality_adjustment: regime.quality_adjustment,
            contributors,
        })
    }
}
