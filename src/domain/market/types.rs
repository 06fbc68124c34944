use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

/// Canonical tick delivered by the market data adapter.
///
/// Ticks are ephemeral: they are consumed by the pipeline and never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    pub symbol: String,
    pub price: Decimal,
    pub bid: Decimal,
    pub ask: Decimal,
    pub volume: Decimal,
    /// Epoch milliseconds (UTC)
    pub timestamp: i64,
}

impl Tick {
    pub fn new(symbol: impl Into<String>, price: Decimal, timestamp: i64) -> Self {
        Self {
            symbol: symbol.into(),
            price,
            bid: price,
            ask: price,
            volume: Decimal::ZERO,
            timestamp,
        }
    }

    pub fn with_quote(mut self, bid: Decimal, ask: Decimal) -> Self {
        self.bid = bid;
        self.ask = ask;
        self
    }

    pub fn with_volume(mut self, volume: Decimal) -> Self {
        self.volume = volume;
        self
    }

    pub fn datetime(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.timestamp).unwrap_or_else(Utc::now)
    }

    /// Bid/ask spread as a percentage of the mid price.
    pub fn spread_pct(&self) -> Option<f64> {
        let mid = (self.bid + self.ask) / Decimal::TWO;
        if mid <= Decimal::ZERO || self.ask < self.bid {
            return None;
        }
        ((self.ask - self.bid) / mid * Decimal::ONE_HUNDRED).to_f64()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Candle {
    pub symbol: String,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
    pub timestamp: i64,
}

impl Candle {
    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    pub fn is_bearish(&self) -> bool {
        self.close < self.open
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_spread_pct() {
        let tick = Tick::new("BTCUSDT", dec!(100), 0).with_quote(dec!(99.5), dec!(100.5));
        let spread = tick.spread_pct().unwrap();
        assert!((spread - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_crossed_quote_has_no_spread() {
        let tick = Tick::new("BTCUSDT", dec!(100), 0).with_quote(dec!(101), dec!(100));
        assert!(tick.spread_pct().is_none());
    }
}
