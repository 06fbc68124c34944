use crate::application::strategies::traits::{AnalysisContext, SignalStrategy};
use crate::domain::signals::strategy_ids::ZSCORE_MR;
use crate::domain::signals::{Direction, StrategyOpinion};
use statrs::statistics::{Data, Distribution};

/// Z-Score Mean Reversion Strategy
///
/// Fades statistically stretched prices:
/// - LONG when Z-Score <= -entry (price far below its rolling mean)
/// - SHORT when Z-Score >= +entry
///
/// Confidence grows with the stretch and is cut when a strong trend
/// (price far from the trend average) makes reversion less likely.
#[derive(Debug, Clone)]
pub struct ZScoreMeanReversionStrategy {
    pub lookback_period: usize,
    pub entry_threshold: f64,
    pub max_trend_distance_pct: f64,
}

impl ZScoreMeanReversionStrategy {
    pub fn new(lookback_period: usize, entry_threshold: f64) -> Self {
        Self {
            lookback_period,
            entry_threshold,
            max_trend_distance_pct: 5.0,
        }
    }

    /// Z-Score over the strategy's own window; falls back to the shared one.
    fn calculate_zscore(&self, ctx: &AnalysisContext) -> Option<f64> {
        if ctx.closes.len() < self.lookback_period {
            return ctx.zscore;
        }

        let window: Vec<f64> = ctx.closes[ctx.closes.len() - self.lookback_period..].to_vec();
        let data = Data::new(window);
        let mean = data.mean()?;
        let std_dev = data.std_dev()?;

        if std_dev <= f64::EPSILON {
            return None;
        }
        Some((ctx.price_f64 - mean) / std_dev)
    }
}

impl Default for ZScoreMeanReversionStrategy {
    fn default() -> Self {
        Self::new(20, 2.0)
    }
}

impl SignalStrategy for ZScoreMeanReversionStrategy {
    fn id(&self) -> &str {
        ZSCORE_MR
    }

    fn analyze(&self, ctx: &AnalysisContext) -> Option<StrategyOpinion> {
        let zscore = self.calculate_zscore(ctx)?;
        if !zscore.is_finite() {
            return None;
        }

        if zscore.abs() < self.entry_threshold {
            return Some(StrategyOpinion::neutral(
                self.id(),
                &ctx.symbol,
                format!("Z-Score {:.2} inside +/-{:.1}", zscore, self.entry_threshold),
            ));
        }

        let direction = if zscore < 0.0 {
            Direction::Long
        } else {
            Direction::Short
        };

        let mut confidence = 55.0 + ((zscore.abs() - self.entry_threshold) * 15.0).min(30.0);

        if let Some(trend) = ctx.trend_sma
            && trend > 0.0
        {
            let distance_pct = (ctx.price_f64 - trend) / trend * 100.0;
            // Price stretched against a runaway trend
            let against_trend = distance_pct * direction.sign() < 0.0;
            if against_trend && distance_pct.abs() > self.max_trend_distance_pct {
                confidence -= 15.0;
            }
        }

        if let Some(rsi) = ctx.rsi {
            let confirms = match direction {
                Direction::Long => rsi < 35.0,
                Direction::Short => rsi > 65.0,
            };
            if confirms {
                confidence += 5.0;
            }
        }

        Some(StrategyOpinion::directional(
            self.id(),
            &ctx.symbol,
            direction,
            confidence,
            format!(
                "Mean reversion {}: Z-Score={:.2} (threshold {:.1})",
                direction, zscore, self.entry_threshold
            ),
        ))
    }
}
