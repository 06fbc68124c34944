use crate::domain::errors::SignalStateError;
use crate::domain::market::RegimeType;
use crate::domain::signals::consensus::QualityTier;
use crate::domain::signals::opinion::Direction;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignalStatus {
    Active,
    Success,
    Failed,
    Expired,
}

impl SignalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalStatus::Active => "ACTIVE",
            SignalStatus::Success => "SUCCESS",
            SignalStatus::Failed => "FAILED",
            SignalStatus::Expired => "EXPIRED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, SignalStatus::Active)
    }
}

impl fmt::Display for SignalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SignalStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "ACTIVE" => Ok(SignalStatus::Active),
            "SUCCESS" => Ok(SignalStatus::Success),
            "FAILED" => Ok(SignalStatus::Failed),
            "EXPIRED" => Ok(SignalStatus::Expired),
            _ => anyhow::bail!("Invalid signal status: {}", s),
        }
    }
}

/// A published signal.
///
/// Everything except the completion fields is fixed at creation. The
/// completion fields are written once, by [`Signal::apply`], when the
/// signal leaves `ACTIVE`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub id: Uuid,
    pub symbol: String,
    pub direction: Direction,
    pub entry: Decimal,
    pub stop_loss: Decimal,
    /// 1 to 3 targets, ordered nearest first
    pub targets: Vec<Decimal>,
    pub confidence: f64,
    pub quality_score: f64,
    pub quality_tier: QualityTier,
    /// Largest contributor of the winning bucket
    pub strategy_id: String,
    pub contributors: Vec<String>,
    pub regime: RegimeType,
    pub position_size_multiplier: f64,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,

    pub status: SignalStatus,
    pub exit_price: Option<Decimal>,
    /// 1-based index of the furthest target reached
    pub hit_target: Option<u8>,
    pub profit_loss_percent: Option<Decimal>,
    pub completed_at: Option<DateTime<Utc>>,
    pub note: Option<String>,
}

/// Terminal transition computed from a price observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalCompletion {
    pub status: SignalStatus,
    pub exit_price: Option<Decimal>,
    pub hit_target: Option<u8>,
    pub profit_loss_percent: Option<Decimal>,
    pub completed_at: DateTime<Utc>,
    pub note: Option<String>,
}

impl Signal {
    pub fn is_active(&self) -> bool {
        self.status == SignalStatus::Active
    }

    /// Signed return in percent for an exit at `price`.
    pub fn return_pct_at(&self, price: Decimal) -> Decimal {
        if self.entry.is_zero() {
            return Decimal::ZERO;
        }
        let raw = match self.direction {
            Direction::Long => (price - self.entry) / self.entry,
            Direction::Short => (self.entry - price) / self.entry,
        };
        (raw * Decimal::ONE_HUNDRED).round_dp(4)
    }

    /// Checks one price observation against targets, stop and expiry.
    ///
    /// Targets win over the stop when both appear crossed by a single price
    /// (only possible with a malformed signal); the furthest reached target
    /// is reported.
    pub fn evaluate(&self, price: Decimal, now: DateTime<Utc>) -> Option<SignalCompletion> {
        if !self.is_active() {
            return None;
        }

        let reached = self
            .targets
            .iter()
            .enumerate()
            .filter(|(_, target)| match self.direction {
                Direction::Long => price >= **target,
                Direction::Short => price <= **target,
            })
            .map(|(idx, _)| idx)
            .max();

        if let Some(idx) = reached {
            return Some(self.completion(
                SignalStatus::Success,
                Some(price),
                Some(idx as u8 + 1),
                now,
                None,
            ));
        }

        let stopped = match self.direction {
            Direction::Long => price <= self.stop_loss,
            Direction::Short => price >= self.stop_loss,
        };
        if stopped {
            return Some(self.completion(SignalStatus::Failed, Some(price), None, now, None));
        }

        if now >= self.expires_at {
            return Some(self.completion(SignalStatus::Expired, Some(price), None, now, None));
        }

        None
    }

    /// Expiry without any usable price for the remaining lifetime.
    pub fn expire_without_price(&self, now: DateTime<Utc>, note: &str) -> Option<SignalCompletion> {
        if !self.is_active() || now < self.expires_at {
            return None;
        }
        Some(self.completion(SignalStatus::Expired, None, None, now, Some(note.to_string())))
    }

    /// Expiry while the feed is down, settled at the last price that was
    /// seen for this signal.
    pub fn expire_at_last_price(&self, last_price: Decimal, now: DateTime<Utc>, note: &str) -> Option<SignalCompletion> {
        if !self.is_active() || now < self.expires_at {
            return None;
        }
        Some(self.completion(
            SignalStatus::Expired,
            Some(last_price),
            None,
            now,
            Some(note.to_string()),
        ))
    }

    fn completion(
        &self,
        status: SignalStatus,
        exit_price: Option<Decimal>,
        hit_target: Option<u8>,
        now: DateTime<Utc>,
        note: Option<String>,
    ) -> SignalCompletion {
        SignalCompletion {
            status,
            exit_price,
            hit_target,
            profit_loss_percent: exit_price.map(|p| self.return_pct_at(p)),
            completed_at: now,
            note,
        }
    }

    /// Writes the completion fields. Fails if the signal already left ACTIVE.
    pub fn apply(&mut self, completion: &SignalCompletion) -> Result<(), SignalStateError> {
        if !self.is_active() {
            return Err(SignalStateError::AlreadyTerminal {
                id: self.id,
                status: self.status,
            });
        }
        if !completion.status.is_terminal() {
            return Err(SignalStateError::NotTerminal { id: self.id });
        }
        self.status = completion.status;
        self.exit_price = completion.exit_price;
        self.hit_target = completion.hit_target;
        self.profit_loss_percent = completion.profit_loss_percent;
        self.completed_at = Some(completion.completed_at);
        self.note = completion.note.clone();
        Ok(())
    }

    pub fn outcome(&self) -> Option<SignalOutcome> {
        if !self.status.is_terminal() {
            return None;
        }
        Some(SignalOutcome {
            signal_id: self.id,
            symbol: self.symbol.clone(),
            direction: self.direction,
            status: self.status,
            strategy_id: self.strategy_id.clone(),
            contributors: self.contributors.clone(),
            regime: self.regime,
            profit_loss_percent: self.profit_loss_percent,
            completed_at: self.completed_at.unwrap_or(self.expires_at),
        })
    }
}

/// Terminal outcome as consumed by the learning engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalOutcome {
    pub signal_id: Uuid,
    pub symbol: String,
    pub direction: Direction,
    pub status: SignalStatus,
    pub strategy_id: String,
    pub contributors: Vec<String>,
    pub regime: RegimeType,
    pub profit_loss_percent: Option<Decimal>,
    pub completed_at: DateTime<Utc>,
}

impl SignalOutcome {
    pub fn is_win(&self) -> bool {
        self.status == SignalStatus::Success
    }

    pub fn is_loss(&self) -> bool {
        self.status == SignalStatus::Failed
    }

    /// Realised return in percent, 0 when the exit price is unknown.
    pub fn realized_return(&self) -> f64 {
        self.profit_loss_percent
            .and_then(|p| p.to_f64())
            .unwrap_or(0.0)
    }

    /// Contributors with the primary strategy guaranteed present.
    pub fn credited_strategies(&self) -> Vec<String> {
        let mut ids = self.contributors.clone();
        if !ids.iter().any(|id| id == &self.strategy_id) {
            ids.insert(0, self.strategy_id.clone());
        }
        ids
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    pub(crate) fn long_signal(now: DateTime<Utc>) -> Signal {
        Signal {
            id: Uuid::new_v4(),
            symbol: "BTCUSDT".to_string(),
            direction: Direction::Long,
            entry: dec!(100),
            stop_loss: dec!(98),
            targets: vec![dec!(105), dec!(107), dec!(110)],
            confidence: 72.0,
            quality_score: 88.0,
            quality_tier: QualityTier::High,
            strategy_id: "TrendAlignment".to_string(),
            contributors: vec!["TrendAlignment".to_string(), "StatMomentum".to_string()],
            regime: RegimeType::BullMomentum,
            position_size_multiplier: 1.5,
            created_at: now,
            expires_at: now + Duration::hours(4),
            status: SignalStatus::Active,
            exit_price: None,
            hit_target: None,
            profit_loss_percent: None,
            completed_at: None,
            note: None,
        }
    }

    #[test]
    fn test_long_target_hit() {
        let now = Utc::now();
        let mut signal = long_signal(now);
        let completion = signal.evaluate(dec!(105.5), now).unwrap();
        assert_eq!(completion.status, SignalStatus::Success);
        assert_eq!(completion.hit_target, Some(1));
        assert_eq!(completion.profit_loss_percent, Some(dec!(5.5)));

        signal.apply(&completion).unwrap();
        // a later, higher price must not transition again
        assert!(signal.evaluate(dec!(106), now).is_none());
        assert!(signal.apply(&completion).is_err());
    }

    #[test]
    fn test_furthest_target_reported() {
        let now = Utc::now();
        let signal = long_signal(now);
        let completion = signal.evaluate(dec!(108), now).unwrap();
        assert_eq!(completion.hit_target, Some(2));
    }

    #[test]
    fn test_long_stop_hit() {
        let now = Utc::now();
        let signal = long_signal(now);
        let completion = signal.evaluate(dec!(97.5), now).unwrap();
        assert_eq!(completion.status, SignalStatus::Failed);
        assert_eq!(completion.profit_loss_percent, Some(dec!(-2.5)));
    }

    #[test]
    fn test_short_mirror() {
        let now = Utc::now();
        let mut signal = long_signal(now);
        signal.direction = Direction::Short;
        signal.stop_loss = dec!(102);
        signal.targets = vec![dec!(95), dec!(93)];

        let win = signal.evaluate(dec!(94.5), now).unwrap();
        assert_eq!(win.status, SignalStatus::Success);
        assert_eq!(win.hit_target, Some(1));
        assert_eq!(win.profit_loss_percent, Some(dec!(5.5)));

        let loss = signal.evaluate(dec!(102.1), now).unwrap();
        assert_eq!(loss.status, SignalStatus::Failed);
    }

    #[test]
    fn test_expiry_between_stop_and_target() {
        let now = Utc::now();
        let signal = long_signal(now);
        assert!(signal.evaluate(dec!(101), now + Duration::hours(3)).is_none());

        let completion = signal.evaluate(dec!(101), now + Duration::hours(4)).unwrap();
        assert_eq!(completion.status, SignalStatus::Expired);
        assert_eq!(completion.hit_target, None);
    }

    #[test]
    fn test_expire_without_price_waits_for_expiry() {
        let now = Utc::now();
        let signal = long_signal(now);
        assert!(signal.expire_without_price(now, "feed gap").is_none());
        let completion = signal
            .expire_without_price(now + Duration::hours(5), "feed gap")
            .unwrap();
        assert_eq!(completion.status, SignalStatus::Expired);
        assert!(completion.exit_price.is_none());
        assert_eq!(completion.note.as_deref(), Some("feed gap"));
    }

    #[test]
    fn test_outcome_credits_primary() {
        let now = Utc::now();
        let mut signal = long_signal(now);
        signal.contributors = vec!["StatMomentum".to_string()];
        let completion = signal.evaluate(dec!(105), now).unwrap();
        signal.apply(&completion).unwrap();
        let outcome = signal.outcome().unwrap();
        assert!(outcome.is_win());
        assert_eq!(
            outcome.credited_strategies(),
            vec!["TrendAlignment".to_string(), "StatMomentum".to_string()]
        );
    }
}
