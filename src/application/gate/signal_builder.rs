use crate::config::QualityGateConfig;
use crate::domain::errors::GateRejection;
use crate::domain::market::RegimeState;
use crate::domain::signals::{ConsensusResult, Direction, Signal, SignalStatus};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use uuid::Uuid;

/// Entry, stop and targets for a candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeLevels {
    pub entry: Decimal,
    pub stop_loss: Decimal,
    pub targets: Vec<Decimal>,
    /// Reward to the first target over the risk to the stop
    pub risk_reward: f64,
}

/// Turns an accepted consensus into a concrete signal.
#[derive(Debug, Clone)]
pub struct SignalBuilder {
    stop_atr_multiple: f64,
    fallback_stop_pct: f64,
    target_r_multiples: Vec<f64>,
    ttl: Duration,
}

impl SignalBuilder {
    pub fn new(config: &QualityGateConfig) -> Self {
        Self {
            stop_atr_multiple: config.stop_atr_multiple,
            fallback_stop_pct: config.fallback_stop_pct,
            target_r_multiples: config.target_r_multiples.clone(),
            ttl: Duration::minutes(config.signal_ttl_minutes),
        }
    }

    /// Risk distance is ATR x multiple, or a fixed share of entry when ATR
    /// is unknown. `None` for a non-positive price.
    pub fn levels(&self, direction: Direction, entry: Decimal, atr: Option<f64>) -> Option<TradeLevels> {
        let entry_f = entry.to_f64()?;
        if entry_f <= 0.0 {
            return None;
        }

        let risk = match atr {
            Some(atr) if atr.is_finite() && atr > 0.0 => atr * self.stop_atr_multiple,
            _ => entry_f * self.fallback_stop_pct,
        };
        // Keeps the long stop and the furthest short target above zero
        let furthest = self.target_r_multiples.last().copied().unwrap_or(1.0).max(1.0);
        let risk = risk.min(entry_f / (furthest + 1.0));

        let dp = entry.scale().max(2);
        let price = |offset: f64| Decimal::from_f64(entry_f + direction.sign() * offset).map(|p| p.round_dp(dp));

        let stop_loss = price(-risk)?;
        let targets: Vec<Decimal> = self
            .target_r_multiples
            .iter()
            .map(|r| price(risk * r))
            .collect::<Option<_>>()?;

        let first_reward = (targets.first()?.to_f64()? - entry_f).abs();
        let actual_risk = (entry_f - stop_loss.to_f64()?).abs();
        let risk_reward = if actual_risk > 0.0 {
            first_reward / actual_risk
        } else {
            0.0
        };

        Some(TradeLevels {
            entry,
            stop_loss,
            targets,
            risk_reward,
        })
    }

    pub fn build(
        &self,
        consensus: &ConsensusResult,
        levels: TradeLevels,
        quality_score: f64,
        regime: &RegimeState,
        now: DateTime<Utc>,
    ) -> Signal {
        Signal {
            id: Uuid::new_v4(),
            symbol: consensus.symbol.clone(),
            direction: consensus.direction,
            entry: levels.entry,
            stop_loss: levels.stop_loss,
            targets: levels.targets,
            confidence: consensus.weighted_confidence,
            quality_score,
            quality_tier: consensus.quality_tier,
            strategy_id: consensus.primary_strategy().unwrap_or_default().to_string(),
            contributors: consensus.contributor_ids(),
            regime: consensus.regime_at_evaluation,
            position_size_multiplier: regime.position_size_multiplier,
            created_at: now,
            expires_at: now + self.ttl,
            status: SignalStatus::Active,
            exit_price: None,
            hit_target: None,
            profit_loss_percent: None,
            completed_at: None,
            note: None,
        }
    }

    /// Re-anchors a queued signal on the current price at publication.
    ///
    /// Stop and targets keep their distance from entry, so risk and the R
    /// multiples are unchanged. Fails when the price has already reached
    /// the old stop or first target, or when a shifted level would not be
    /// positive. The lifetime restarts at `now`.
    pub fn reprice(&self, signal: &mut Signal, price: Decimal, now: DateTime<Utc>) -> Result<(), GateRejection> {
        let sign = match signal.direction {
            Direction::Long => Decimal::ONE,
            Direction::Short => Decimal::NEGATIVE_ONE,
        };
        let crossed = |level: &'static str| GateRejection::PriceCrossedLevel {
            level,
            price,
            entry: signal.entry,
        };
        if (price - signal.stop_loss) * sign <= Decimal::ZERO {
            return Err(crossed("stop"));
        }
        if let Some(first) = signal.targets.first()
            && (*first - price) * sign <= Decimal::ZERO
        {
            return Err(crossed("first target"));
        }

        let shift = price - signal.entry;
        let stop_loss = signal.stop_loss + shift;
        let targets: Vec<Decimal> = signal.targets.iter().map(|t| *t + shift).collect();
        if stop_loss <= Decimal::ZERO || targets.iter().any(|t| *t <= Decimal::ZERO) {
            return Err(crossed("zero bound"));
        }

        signal.entry = price;
        signal.stop_loss = stop_loss;
        signal.targets = targets;
        signal.created_at = now;
        signal.expires_at = now + self.ttl;
        Ok(())
    }
}
