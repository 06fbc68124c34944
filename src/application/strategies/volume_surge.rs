use super::traits::{AnalysisContext, SignalStrategy};
use crate::domain::signals::strategy_ids::VOLUME_SURGE;
use crate::domain::signals::{Direction, StrategyOpinion};

/// Abnormal volume behind a directional candle.
#[derive(Debug, Clone)]
pub struct VolumeSurgeStrategy {
    pub surge_ratio: f64,
    pub max_confidence: f64,
}

impl Default for VolumeSurgeStrategy {
    fn default() -> Self {
        Self {
            surge_ratio: 2.0,
            max_confidence: 85.0,
        }
    }
}

impl SignalStrategy for VolumeSurgeStrategy {
    fn id(&self) -> &str {
        VOLUME_SURGE
    }

    fn analyze(&self, ctx: &AnalysisContext) -> Option<StrategyOpinion> {
        let ratio = ctx.volume_ratio?;
        let candle = ctx.last_candle()?;

        if ratio < self.surge_ratio {
            return Some(StrategyOpinion::neutral(
                self.id(),
                &ctx.symbol,
                format!("Volume {:.2}x average, no surge", ratio),
            ));
        }

        let direction = if candle.is_bullish() {
            Direction::Long
        } else if candle.is_bearish() {
            Direction::Short
        } else {
            return Some(StrategyOpinion::neutral(
                self.id(),
                &ctx.symbol,
                format!("Volume {:.2}x on a doji", ratio),
            ));
        };

        let mut confidence = (50.0 + (ratio - self.surge_ratio) * 10.0).min(self.max_confidence);

        // Surge in the direction of the short-term average
        if let Some(fast) = ctx.fast_sma {
            let with_trend = (ctx.price_f64 - fast) * direction.sign() > 0.0;
            confidence += if with_trend { 5.0 } else { -5.0 };
        }

        Some(StrategyOpinion::directional(
            self.id(),
            &ctx.symbol,
            direction,
            confidence,
            format!("Volume surge {:.2}x on {} candle", ratio, direction),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::strategies::traits::test_support::bare_context;
    use crate::domain::market::Candle;
    use rust_decimal_macros::dec;

    fn candle(open: rust_decimal::Decimal, close: rust_decimal::Decimal) -> Candle {
        Candle {
            symbol: "BTCUSDT".to_string(),
            open,
            high: open.max(close) + dec!(1),
            low: open.min(close) - dec!(1),
            close,
            volume: dec!(5000),
            timestamp: 0,
        }
    }

    #[test]
    fn test_bullish_surge() {
        let strategy = VolumeSurgeStrategy::default();
        let mut ctx = bare_context(102.0);
        ctx.candles = vec![candle(dec!(100), dec!(102))];
        ctx.volume_ratio = Some(3.0);
        ctx.fast_sma = Some(100.0);
        let op = strategy.analyze(&ctx).unwrap();
        assert_eq!(op.direction, Some(Direction::Long));
        assert_eq!(op.confidence, 65.0);
    }

    #[test]
    fn test_bearish_surge() {
        let strategy = VolumeSurgeStrategy::default();
        let mut ctx = bare_context(98.0);
        ctx.candles = vec![candle(dec!(100), dec!(98))];
        ctx.volume_ratio = Some(2.5);
        let op = strategy.analyze(&ctx).unwrap();
        assert_eq!(op.direction, Some(Direction::Short));
    }

    #[test]
    fn test_normal_volume_is_neutral() {
        let strategy = VolumeSurgeStrategy::default();
        let mut ctx = bare_context(102.0);
        ctx.candles = vec![candle(dec!(100), dec!(102))];
        ctx.volume_ratio = Some(1.1);
        assert!(strategy.analyze(&ctx).unwrap().direction.is_none());
    }

    #[test]
    fn test_confidence_is_capped() {
        let strategy = VolumeSurgeStrategy::default();
        let mut ctx = bare_context(102.0);
        ctx.candles = vec![candle(dec!(100), dec!(102))];
        ctx.volume_ratio = Some(50.0);
        assert!(strategy.analyze(&ctx).unwrap().confidence <= 85.0);
    }
}
