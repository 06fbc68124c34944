use crate::application::strategies::traits::{AnalysisContext, SignalStrategy};
use crate::domain::signals::strategy_ids::STAT_MOMENTUM;
use crate::domain::signals::{Direction, StrategyOpinion};

/// Statistical Momentum Strategy
///
/// ATR-normalized momentum: `(price - price_N) / ATR`. Normalizing by
/// volatility keeps the threshold comparable across assets.
/// Beyond the threshold the strategy votes in the move's direction, with
/// optional trend confirmation and an exhaustion penalty at RSI extremes.
#[derive(Debug, Clone)]
pub struct StatisticalMomentumStrategy {
    pub momentum_threshold: f64,
    pub trend_confirmation: bool,
}

impl StatisticalMomentumStrategy {
    pub fn new(momentum_threshold: f64, trend_confirmation: bool) -> Self {
        Self {
            momentum_threshold,
            trend_confirmation,
        }
    }

    fn trend_confirms(&self, ctx: &AnalysisContext, direction: Direction) -> Option<bool> {
        if !self.trend_confirmation {
            return Some(true);
        }
        let trend = ctx.trend_sma.or(ctx.slow_sma)?;
        Some(match direction {
            Direction::Long => ctx.price_f64 > trend,
            Direction::Short => ctx.price_f64 < trend,
        })
    }
}

impl Default for StatisticalMomentumStrategy {
    fn default() -> Self {
        Self::new(1.0, true)
    }
}

impl SignalStrategy for StatisticalMomentumStrategy {
    fn id(&self) -> &str {
        STAT_MOMENTUM
    }

    fn analyze(&self, ctx: &AnalysisContext) -> Option<StrategyOpinion> {
        let momentum = ctx.momentum_normalized?;
        if !momentum.is_finite() {
            return None;
        }

        if momentum.abs() < self.momentum_threshold {
            return Some(StrategyOpinion::neutral(
                self.id(),
                &ctx.symbol,
                format!("Momentum {:.2} ATR below threshold", momentum),
            ));
        }

        let direction = if momentum > 0.0 {
            Direction::Long
        } else {
            Direction::Short
        };

        let mut confidence = 50.0 + ((momentum.abs() - self.momentum_threshold) * 12.0).min(36.0);

        match self.trend_confirms(ctx, direction) {
            Some(true) => confidence += 5.0,
            Some(false) => {
                return Some(StrategyOpinion::neutral(
                    self.id(),
                    &ctx.symbol,
                    format!("Momentum {:.2} ATR against trend", momentum),
                ));
            }
            // no trend reference yet
            None => confidence -= 10.0,
        }

        if let Some(rsi) = ctx.rsi
            && !(20.0..=80.0).contains(&rsi)
        {
            confidence -= 10.0;
        }

        Some(StrategyOpinion::directional(
            self.id(),
            &ctx.symbol,
            direction,
            confidence,
            format!("Normalized momentum {:.2} ATR {}", momentum, direction),
        ))
    }
}
