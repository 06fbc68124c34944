use crate::domain::signals::SignalStatus;
use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

/// Per-strategy evaluation faults. Never propagated past the ensemble:
/// each one is downgraded to "no opinion" and counted by the breaker.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StrategyFault {
    #[error("Strategy {strategy_id} panicked: {message}")]
    Panicked { strategy_id: String, message: String },

    #[error("Strategy {strategy_id} timed out after {timeout_ms}ms")]
    TimedOut { strategy_id: String, timeout_ms: u64 },

    #[error("Strategy {strategy_id} produced invalid output: {reason}")]
    InvalidOutput { strategy_id: String, reason: String },
}

impl StrategyFault {
    pub fn strategy_id(&self) -> &str {
        match self {
            StrategyFault::Panicked { strategy_id, .. }
            | StrategyFault::TimedOut { strategy_id, .. }
            | StrategyFault::InvalidOutput { strategy_id, .. } => strategy_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            StrategyFault::Panicked { .. } => "panic",
            StrategyFault::TimedOut { .. } => "timeout",
            StrategyFault::InvalidOutput { .. } => "invalid_output",
        }
    }
}

/// Reasons a candidate is not published. Each carries the failing value and
/// the limit it was held against.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum GateRejection {
    #[error("Quality score too low: {score:.1} < {min:.1}")]
    QualityTooLow { score: f64, min: f64 },

    #[error("Win probability too low: {probability:.3} < {min:.3}")]
    WinProbabilityTooLow { probability: f64, min: f64 },

    #[error("Strategy {strategy_id} win rate too low: {win_rate:.3} < {min:.3}")]
    StrategyWinRateTooLow {
        strategy_id: String,
        win_rate: f64,
        min: f64,
    },

    #[error("Daily budget exhausted: {published} >= {limit}")]
    DailyBudgetExhausted { published: u32, limit: u32 },

    #[error("Hourly cap reached: {published} >= {limit}")]
    HourlyCapReached { published: u32, limit: u32 },

    #[error("Too soon after last publication: {elapsed_secs}s < {min_secs}s")]
    TooSoon { elapsed_secs: i64, min_secs: i64 },

    #[error("Symbol {symbol} already has an active signal")]
    ActiveSignalExists { symbol: String },

    #[error("Queue full: score {score:.1} <= lowest queued {lowest:.1}")]
    QueueFull { score: f64, lowest: f64 },

    #[error("Candidate stale: age {age_secs}s > {ttl_secs}s")]
    Stale { age_secs: i64, ttl_secs: i64 },

    #[error("Price {price} already crossed the {level} of the queued signal (entry {entry})")]
    PriceCrossedLevel {
        level: &'static str,
        price: Decimal,
        entry: Decimal,
    },

    #[error("No current price for {symbol}")]
    PriceUnavailable { symbol: String },

    #[error("Shutting down: no new candidates admitted")]
    ShuttingDown,

    #[error("Persistence failed after retry: {reason}")]
    PersistenceFailed { reason: String },
}

impl GateRejection {
    /// Stable label for metrics and events.
    pub fn code(&self) -> &'static str {
        match self {
            GateRejection::QualityTooLow { .. } => "quality_too_low",
            GateRejection::WinProbabilityTooLow { .. } => "win_probability_too_low",
            GateRejection::StrategyWinRateTooLow { .. } => "strategy_win_rate_too_low",
            GateRejection::DailyBudgetExhausted { .. } => "daily_budget_exhausted",
            GateRejection::HourlyCapReached { .. } => "hourly_cap_reached",
            GateRejection::TooSoon { .. } => "too_soon",
            GateRejection::ActiveSignalExists { .. } => "active_signal_exists",
            GateRejection::QueueFull { .. } => "queue_full",
            GateRejection::Stale { .. } => "stale",
            GateRejection::PriceCrossedLevel { .. } => "price_crossed_level",
            GateRejection::PriceUnavailable { .. } => "price_unavailable",
            GateRejection::ShuttingDown => "shutting_down",
            GateRejection::PersistenceFailed { .. } => "persistence_failed",
        }
    }

    /// Budget-type rejections: the candidate was fine, the timing was not.
    pub fn is_budget(&self) -> bool {
        matches!(
            self,
            GateRejection::DailyBudgetExhausted { .. }
                | GateRejection::HourlyCapReached { .. }
                | GateRejection::TooSoon { .. }
        )
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SignalStateError {
    #[error("Signal {id} already terminal ({status})")]
    AlreadyTerminal { id: Uuid, status: SignalStatus },

    #[error("Signal {id}: completion status must be terminal")]
    NotTerminal { id: Uuid },
}

/// Errors related to market data and connectivity
#[derive(Debug, Error)]
pub enum MarketDataError {
    #[error("No price available for {symbol}")]
    PriceUnavailable { symbol: String },

    #[error("Invalid market data for {symbol}: {reason}")]
    InvalidData { symbol: String, reason: String },

    #[error("Feed unavailable: {reason}")]
    FeedUnavailable { reason: String },
}

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("Quality factor weights must sum to 100, got {sum:.2}")]
    FactorWeightSum { sum: f64 },

    #[error("Excellent threshold {excellent:.1} must be >= minimum accept {min_accept:.1}")]
    ThresholdOrder { excellent: f64, min_accept: f64 },

    #[error("Invalid value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },
}
