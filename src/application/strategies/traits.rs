use crate::domain::signals::StrategyOpinion;

pub use crate::application::market_data::feature_engineering::AnalysisContext;

/// A stateless pattern detector.
///
/// `analyze` takes `&self` only: calling it twice with the same context
/// yields the same opinion. `None` means the strategy could not form a view
/// (missing data); `Some` with no direction is an explicit neutral vote.
pub trait SignalStrategy: Send + Sync {
    fn id(&self) -> &str;

    fn analyze(&self, ctx: &AnalysisContext) -> Option<StrategyOpinion>;
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::AnalysisContext;
    use rust_decimal::Decimal;
    use rust_decimal::prelude::FromPrimitive;

    /// Context with no indicators at all.
    pub(crate) fn bare_context(price: f64) -> AnalysisContext {
        AnalysisContext {
            symbol: "BTCUSDT".to_string(),
            current_price: Decimal::from_f64(price).unwrap_or(Decimal::ZERO),
            price_f64: price,
            timestamp: 0,
            candles: Vec::new(),
            closes: Vec::new(),
            fast_sma: None,
            slow_sma: None,
            trend_sma: None,
            ema_fast: None,
            ema_slow: None,
            macd_histogram: None,
            rsi: None,
            atr: None,
            bands: None,
            zscore: None,
            momentum_normalized: None,
            volume_ratio: None,
            spread_pct: None,
        }
    }
}
