use super::traits::{AnalysisContext, SignalStrategy};
use crate::domain::signals::strategy_ids::RSI_REVERSAL;
use crate::domain::signals::{Direction, StrategyOpinion};

/// RSI extremes, faded.
#[derive(Debug, Clone)]
pub struct RsiReversalStrategy {
    pub oversold: f64,
    pub overbought: f64,
}

impl Default for RsiReversalStrategy {
    fn default() -> Self {
        Self {
            oversold: 30.0,
            overbought: 70.0,
        }
    }
}

impl SignalStrategy for RsiReversalStrategy {
    fn id(&self) -> &str {
        RSI_REVERSAL
    }

    fn analyze(&self, ctx: &AnalysisContext) -> Option<StrategyOpinion> {
        let rsi = ctx.rsi?;
        if !rsi.is_finite() {
            return None;
        }

        let (direction, depth) = if rsi <= self.oversold {
            (Direction::Long, self.oversold - rsi)
        } else if rsi >= self.overbought {
            (Direction::Short, rsi - self.overbought)
        } else {
            return Some(StrategyOpinion::neutral(
                self.id(),
                &ctx.symbol,
                format!("RSI {:.1} in neutral zone", rsi),
            ));
        };

        let mut confidence = 50.0 + depth * 2.0;

        // Histogram turning back toward the reversal
        if let Some(hist) = ctx.macd_histogram
            && hist * direction.sign() > 0.0
        {
            confidence += 10.0;
        }

        Some(StrategyOpinion::directional(
            self.id(),
            &ctx.symbol,
            direction,
            confidence,
            format!("RSI {:.1} reversal {}", rsi, direction),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::strategies::traits::test_support::bare_context;

    #[test]
    fn test_oversold_long() {
        let strategy = RsiReversalStrategy::default();
        let mut ctx = bare_context(100.0);
        ctx.rsi = Some(20.0);
        let op = strategy.analyze(&ctx).unwrap();
        assert_eq!(op.direction, Some(Direction::Long));
        assert_eq!(op.confidence, 70.0);
    }

    #[test]
    fn test_overbought_short_with_macd_turn() {
        let strategy = RsiReversalStrategy::default();
        let mut ctx = bare_context(100.0);
        ctx.rsi = Some(75.0);
        ctx.macd_histogram = Some(-0.2);
        let op = strategy.analyze(&ctx).unwrap();
        assert_eq!(op.direction, Some(Direction::Short));
        assert_eq!(op.confidence, 70.0);
    }

    #[test]
    fn test_extreme_rsi_is_clamped() {
        let strategy = RsiReversalStrategy::default();
        let mut ctx = bare_context(100.0);
        ctx.rsi = Some(0.0);
        ctx.macd_histogram = Some(1.0);
        assert!(strategy.analyze(&ctx).unwrap().confidence <= 100.0);
    }

    #[test]
    fn test_mid_rsi_neutral() {
        let strategy = RsiReversalStrategy::default();
        let mut ctx = bare_context(100.0);
        ctx.rsi = Some(50.0);
        assert!(strategy.analyze(&ctx).unwrap().direction.is_none());
    }
}
