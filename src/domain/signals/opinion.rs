use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Long => "LONG",
            Direction::Short => "SHORT",
        }
    }

    pub fn opposite(&self) -> Direction {
        match self {
            Direction::Long => Direction::Short,
            Direction::Short => Direction::Long,
        }
    }

    /// +1 for long, -1 for short.
    pub fn sign(&self) -> f64 {
        match self {
            Direction::Long => 1.0,
            Direction::Short => -1.0,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Direction {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "LONG" => Ok(Direction::Long),
            "SHORT" => Ok(Direction::Short),
            _ => anyhow::bail!("Invalid direction: {}", s),
        }
    }
}

/// One detector's view of one symbol for one cycle.
///
/// `direction == None` is an explicit neutral vote: the strategy looked and
/// saw nothing. It still counts toward the total weight of the cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyOpinion {
    pub strategy_id: String,
    pub symbol: String,
    pub direction: Option<Direction>,
    /// 0-100, ordinal quality score (not a calibrated probability)
    pub confidence: f64,
    pub reasoning: String,
}

impl StrategyOpinion {
    pub fn long(strategy_id: &str, symbol: &str, confidence: f64, reasoning: String) -> Self {
        Self::directional(strategy_id, symbol, Direction::Long, confidence, reasoning)
    }

    pub fn short(strategy_id: &str, symbol: &str, confidence: f64, reasoning: String) -> Self {
        Self::directional(strategy_id, symbol, Direction::Short, confidence, reasoning)
    }

    pub fn directional(
        strategy_id: &str,
        symbol: &str,
        direction: Direction,
        confidence: f64,
        reasoning: String,
    ) -> Self {
        Self {
            strategy_id: strategy_id.to_string(),
            symbol: symbol.to_string(),
            direction: Some(direction),
            confidence: confidence.clamp(0.0, 100.0),
            reasoning,
        }
    }

    pub fn neutral(strategy_id: &str, symbol: &str, reasoning: String) -> Self {
        Self {
            strategy_id: strategy_id.to_string(),
            symbol: symbol.to_string(),
            direction: None,
            confidence: 0.0,
            reasoning,
        }
    }

    pub fn is_directional(&self) -> bool {
        self.direction.is_some()
    }

    /// Confidence must be a finite number in range for the vote to be usable.
    pub fn is_valid(&self) -> bool {
        self.confidence.is_finite() && (0.0..=100.0).contains(&self.confidence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confidence_is_clamped() {
        let op = StrategyOpinion::long("A", "BTCUSDT", 140.0, String::new());
        assert_eq!(op.confidence, 100.0);
        assert!(op.is_valid());
    }

    #[test]
    fn test_nan_confidence_is_invalid() {
        let mut op = StrategyOpinion::short("A", "BTCUSDT", 50.0, String::new());
        op.confidence = f64::NAN;
        assert!(!op.is_valid());
    }

    #[test]
    fn test_direction_parse() {
        assert_eq!("long".parse::<Direction>().unwrap(), Direction::Long);
        assert_eq!(Direction::Short.opposite(), Direction::Long);
        assert!("flat".parse::<Direction>().is_err());
    }
}
