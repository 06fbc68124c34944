use super::traits::{AnalysisContext, SignalStrategy};
use crate::domain::signals::strategy_ids::TREND_ALIGNMENT;
use crate::domain::signals::{Direction, StrategyOpinion};

/// Multi-period moving average alignment.
///
/// LONG when price > fast > slow > trend, SHORT on the mirror ordering.
/// Without the trend average the fast/slow pair alone is used at reduced
/// confidence. MACD and RSI agreement add confidence.
#[derive(Debug, Clone)]
pub struct TrendAlignmentStrategy {
    pub base_confidence: f64,
    pub missing_trend_penalty: f64,
}

impl Default for TrendAlignmentStrategy {
    fn default() -> Self {
        Self {
            base_confidence: 55.0,
            missing_trend_penalty: 15.0,
        }
    }
}

impl TrendAlignmentStrategy {
    fn aligned(direction: Direction, values: &[f64]) -> bool {
        values.windows(2).all(|w| match direction {
            Direction::Long => w[0] > w[1],
            Direction::Short => w[0] < w[1],
        })
    }
}

impl SignalStrategy for TrendAlignmentStrategy {
    fn id(&self) -> &str {
        TREND_ALIGNMENT
    }

    fn analyze(&self, ctx: &AnalysisContext) -> Option<StrategyOpinion> {
        let fast = ctx.fast_sma?;
        let slow = ctx.slow_sma?;
        let price = ctx.price_f64;

        let mut chain = vec![price, fast, slow];
        if let Some(trend) = ctx.trend_sma {
            chain.push(trend);
        }

        let direction = [Direction::Long, Direction::Short]
            .into_iter()
            .find(|d| Self::aligned(*d, &chain));

        let Some(direction) = direction else {
            return Some(StrategyOpinion::neutral(
                self.id(),
                &ctx.symbol,
                "Moving averages not aligned".to_string(),
            ));
        };

        let mut confidence = self.base_confidence;

        // Separation between fast and slow, in percent of price, rewards
        // established trends
        if price > 0.0 {
            let spread_pct = (fast - slow).abs() / price * 100.0;
            confidence += (spread_pct * 10.0).min(15.0);
        }
        if ctx.trend_sma.is_none() {
            confidence -= self.missing_trend_penalty;
        }
        if let Some(hist) = ctx.macd_histogram
            && hist * direction.sign() > 0.0
        {
            confidence += 10.0;
        }
        if let Some(rsi) = ctx.rsi {
            let healthy = match direction {
                Direction::Long => (50.0..72.0).contains(&rsi),
                Direction::Short => (28.0..50.0).contains(&rsi),
            };
            if healthy {
                confidence += 5.0;
            } else if !(25.0..=75.0).contains(&rsi) {
                // exhausted
                confidence -= 10.0;
            }
        }

        Some(StrategyOpinion::directional(
            self.id(),
            &ctx.symbol,
            direction,
            confidence,
            format!(
                "Trend aligned {}: price {:.4} fast {:.4} slow {:.4} trend {}",
                direction,
                price,
                fast,
                slow,
                ctx.trend_sma
                    .map(|t| format!("{:.4}", t))
                    .unwrap_or_else(|| "n/a".to_string())
            ),
        ))
    }
}
