use super::traits::{AnalysisContext, SignalStrategy};
use crate::domain::signals::strategy_ids::BOLLINGER_BREAKOUT;
use crate::domain::signals::{Direction, StrategyOpinion};

/// Bollinger Band breakout.
///
/// A close outside the bands with expanding volume is read as the start of
/// a move rather than an extreme to fade.
#[derive(Debug, Clone)]
pub struct BollingerBreakoutStrategy {
    /// Volume ratio (current / average) that confirms a breakout
    pub volume_multiplier: f64,
    pub missing_volume_penalty: f64,
}

impl Default for BollingerBreakoutStrategy {
    fn default() -> Self {
        Self {
            volume_multiplier: 1.2,
            missing_volume_penalty: 10.0,
        }
    }
}

impl SignalStrategy for BollingerBreakoutStrategy {
    fn id(&self) -> &str {
        BOLLINGER_BREAKOUT
    }

    fn analyze(&self, ctx: &AnalysisContext) -> Option<StrategyOpinion> {
        let bands = ctx.bands?;
        let price = ctx.price_f64;

        let (direction, excess) = if price > bands.upper {
            (Direction::Long, price - bands.upper)
        } else if price < bands.lower {
            (Direction::Short, bands.lower - price)
        } else {
            return Some(StrategyOpinion::neutral(
                self.id(),
                &ctx.symbol,
                format!(
                    "Price {:.4} inside bands [{:.4}, {:.4}]",
                    price, bands.lower, bands.upper
                ),
            ));
        };

        let mut confidence = 55.0;
        if price > 0.0 {
            confidence += (excess / price * 100.0 * 10.0).min(15.0);
        }

        match ctx.volume_ratio {
            Some(ratio) if ratio >= self.volume_multiplier => {
                confidence += ((ratio - self.volume_multiplier) * 10.0).min(15.0) + 5.0;
            }
            Some(ratio) => {
                return Some(StrategyOpinion::neutral(
                    self.id(),
                    &ctx.symbol,
                    format!("Band break without volume (ratio {:.2})", ratio),
                ));
            }
            None => confidence -= self.missing_volume_penalty,
        }

        Some(StrategyOpinion::directional(
            self.id(),
            &ctx.symbol,
            direction,
            confidence,
            format!(
                "Bollinger breakout {}: price {:.4} bands [{:.4}, {:.4}] volume {}",
                direction,
                price,
                bands.lower,
                bands.upper,
                ctx.volume_ratio
                    .map(|r| format!("{:.2}x", r))
                    .unwrap_or_else(|| "n/a".to_string())
            ),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::market_data::indicators::Bands;
    use crate::application::strategies::traits::test_support::bare_context;

    fn bands() -> Bands {
        Bands {
            upper: 105.0,
            middle: 100.0,
            lower: 95.0,
        }
    }

    #[test]
    fn test_upper_break_with_volume_is_long() {
        let strategy = BollingerBreakoutStrategy::default();
        let mut ctx = bare_context(106.0);
        ctx.bands = Some(bands());
        ctx.volume_ratio = Some(2.0);
        let op = strategy.analyze(&ctx).unwrap();
        assert_eq!(op.direction, Some(Direction::Long));
        assert!(op.confidence > 60.0);
    }

    #[test]
    fn test_lower_break_is_short() {
        let strategy = BollingerBreakoutStrategy::default();
        let mut ctx = bare_context(94.0);
        ctx.bands = Some(bands());
        ctx.volume_ratio = Some(1.5);
        let op = strategy.analyze(&ctx).unwrap();
        assert_eq!(op.direction, Some(Direction::Short));
    }

    #[test]
    fn test_break_on_thin_volume_is_neutral() {
        let strategy = BollingerBreakoutStrategy::default();
        let mut ctx = bare_context(106.0);
        ctx.bands = Some(bands());
        ctx.volume_ratio = Some(0.7);
        assert!(strategy.analyze(&ctx).unwrap().direction.is_none());
    }

    #[test]
    fn test_missing_volume_degrades() {
        let strategy = BollingerBreakoutStrategy::default();
        let mut ctx = bare_context(106.0);
        ctx.bands = Some(bands());
        let op = strategy.analyze(&ctx).unwrap();
        assert_eq!(op.direction, Some(Direction::Long));
        assert!(op.confidence < 60.0);
    }

    #[test]
    fn test_no_bands_no_opinion() {
        let strategy = BollingerBreakoutStrategy::default();
        assert!(strategy.analyze(&bare_context(100.0)).is_none());
    }
}
