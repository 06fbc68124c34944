//! Stable identifiers of the built-in detectors.
//!
//! Used as keys in the weight vector, in performance records and in the
//! regime recommendation table, so they must never be renamed.

pub const TREND_ALIGNMENT: &str = "TrendAlignment";
pub const STAT_MOMENTUM: &str = "StatMomentum";
pub const ZSCORE_MR: &str = "ZScoreMR";
pub const BOLLINGER_BREAKOUT: &str = "BollingerBreakout";
pub const VOLUME_SURGE: &str = "VolumeSurge";
pub const RSI_REVERSAL: &str = "RsiReversal";

pub const ALL: [&str; 6] = [
    TREND_ALIGNMENT,
    STAT_MOMENTUM,
    ZSCORE_MR,
    BOLLINGER_BREAKOUT,
    VOLUME_SURGE,
    RSI_REVERSAL,
];
