//! Last-value technical indicators over candle history.
//!
//! Each function returns `None` when the history is shorter than the
//! indicator needs, so callers can degrade instead of failing.

use crate::domain::market::Candle;
use rust_decimal::prelude::ToPrimitive;
use statrs::statistics::{Data, Distribution};
use ta::Next;
use ta::indicators::{
    AverageTrueRange, BollingerBands, ExponentialMovingAverage,
    MovingAverageConvergenceDivergence, RelativeStrengthIndex, SimpleMovingAverage,
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bands {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
}

impl Bands {
    /// Band width as a percentage of the middle band.
    pub fn width_pct(&self) -> Option<f64> {
        (self.middle > 0.0).then(|| (self.upper - self.lower) / self.middle * 100.0)
    }
}

pub fn closes(candles: &[Candle]) -> Vec<f64> {
    candles.iter().filter_map(|c| c.close.to_f64()).collect()
}

pub fn volumes(candles: &[Candle]) -> Vec<f64> {
    candles.iter().filter_map(|c| c.volume.to_f64()).collect()
}

pub fn sma(values: &[f64], period: usize) -> Option<f64> {
    if period == 0 || values.len() < period {
        return None;
    }
    let mut sma = SimpleMovingAverage::new(period).ok()?;
    values.iter().map(|v| sma.next(*v)).last()
}

pub fn ema(values: &[f64], period: usize) -> Option<f64> {
    if period == 0 || values.len() < period {
        return None;
    }
    let mut ema = ExponentialMovingAverage::new(period).ok()?;
    values.iter().map(|v| ema.next(*v)).last()
}

pub fn rsi(values: &[f64], period: usize) -> Option<f64> {
    if period == 0 || values.len() <= period {
        return None;
    }
    let mut rsi = RelativeStrengthIndex::new(period).ok()?;
    values.iter().map(|v| rsi.next(*v)).last()
}

pub fn atr(candles: &[Candle], period: usize) -> Option<f64> {
    if period == 0 || candles.len() <= period {
        return None;
    }
    let mut atr = AverageTrueRange::new(period).ok()?;
    let mut last = None;
    for candle in candles {
        let close = candle.close.to_f64()?;
        let high = candle.high.to_f64()?.max(close);
        let low = candle.low.to_f64()?.min(close);
        let open = candle.open.to_f64()?.clamp(low, high);
        let item = ta::DataItem::builder()
            .high(high)
            .low(low)
            .close(close)
            .open(open)
            .volume(candle.volume.to_f64().unwrap_or(0.0).max(0.0))
            .build()
            .ok()?;
        last = Some(atr.next(&item));
    }
    last
}

pub fn bollinger(values: &[f64], period: usize, std_dev: f64) -> Option<Bands> {
    if period == 0 || values.len() < period {
        return None;
    }
    let mut bb = BollingerBands::new(period, std_dev).ok()?;
    let out = values.iter().map(|v| bb.next(*v)).last()?;
    Some(Bands {
        upper: out.upper,
        middle: out.average,
        lower: out.lower,
    })
}

pub fn macd_histogram(values: &[f64], fast: usize, slow: usize, signal: usize) -> Option<f64> {
    if values.len() < slow + signal {
        return None;
    }
    let mut macd = MovingAverageConvergenceDivergence::new(fast, slow, signal).ok()?;
    values.iter().map(|v| macd.next(*v).histogram).last()
}

/// (price - mean) / std over the last `period` values.
pub fn zscore(values: &[f64], period: usize, price: f64) -> Option<f64> {
    if period < 2 || values.len() < period {
        return None;
    }
    let window = Data::new(values[values.len() - period..].to_vec());
    let mean = window.mean()?;
    let std_dev = window.std_dev()?;
    if std_dev <= f64::EPSILON {
        return None;
    }
    Some((price - mean) / std_dev)
}

/// Last value over the mean of the `period` values before it.
pub fn volume_ratio(volumes: &[f64], period: usize) -> Option<f64> {
    if period == 0 || volumes.len() <= period {
        return None;
    }
    let last = *volumes.last()?;
    let prior = &volumes[volumes.len() - 1 - period..volumes.len() - 1];
    let mean = Data::new(prior.to_vec()).mean()?;
    (mean > 0.0).then(|| last / mean)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sma_requires_history() {
        assert_eq!(sma(&[1.0, 2.0], 3), None);
        assert_eq!(sma(&[1.0, 2.0, 3.0], 3), Some(2.0));
    }

    #[test]
    fn test_rsi_of_rising_series_is_high() {
        let values: Vec<f64> = (0..40).map(|i| 100.0 + i as f64).collect();
        assert!(rsi(&values, 14).unwrap() > 70.0);
    }

    #[test]
    fn test_zscore_flat_series_is_none() {
        assert_eq!(zscore(&[5.0; 30], 20, 5.0), None);
    }

    #[test]
    fn test_volume_ratio() {
        let mut vols = vec![100.0; 20];
        vols.push(300.0);
        assert!((volume_ratio(&vols, 20).unwrap() - 3.0).abs() < 1e-9);
    }
}
