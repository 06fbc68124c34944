use crate::config::LearningConfig;
use crate::domain::performance::{PerformanceBook, WeightSnapshot};
use crate::domain::signals::{SignalOutcome, SignalStatus};
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use tracing::debug;

/// Gradient-with-momentum update of the consensus weight vector.
///
/// Pure: takes the current snapshot and returns the next one. Strategies
/// with fewer than `min_samples` outcomes stay at the equal weight while
/// their momentum keeps accumulating.
#[derive(Debug, Clone)]
pub struct WeightOptimizer {
    config: LearningConfig,
}

impl WeightOptimizer {
    pub fn new(config: LearningConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LearningConfig {
        &self.config
    }

    /// Signed step for one outcome, in `[-1, 1]`.
    pub fn gradient(&self, outcome: &SignalOutcome) -> f64 {
        let realized = outcome.realized_return();
        let scale = self.config.return_scale_pct.max(f64::EPSILON);
        let magnitude = (realized.abs() / scale).clamp(0.1, 1.0);

        match outcome.status {
            SignalStatus::Success => magnitude,
            SignalStatus::Failed => -magnitude,
            SignalStatus::Expired if realized == 0.0 => 0.0,
            SignalStatus::Expired => self.config.expired_damping * realized.signum() * magnitude,
            SignalStatus::Active => 0.0,
        }
    }

    /// Applies one outcome. `book` must already contain the outcome so the
    /// sample gate sees the current counts.
    pub fn apply(
        &self,
        snapshot: &WeightSnapshot,
        outcome: &SignalOutcome,
        book: &PerformanceBook,
        now: DateTime<Utc>,
    ) -> WeightSnapshot {
        let c = &self.config;
        let mut next = snapshot.clone();
        let credited = outcome.credited_strategies();
        next.vector.ensure_strategies(credited.as_slice());
        let equal = next.vector.equal_weight();
        let gradient = self.gradient(outcome);

        for id in &credited {
            let m = next.momentum.entry(id.clone()).or_insert(0.0);
            *m = c.momentum * *m + (1.0 - c.momentum) * gradient;
            let velocity = *m;

            if let Some(w) = next.vector.weights.get_mut(id) {
                let updated = *w + c.learning_rate * velocity - c.decay * (*w - equal);
                *w = updated.clamp(c.min_weight, c.max_weight);
                debug!(
                    "WeightOptimizer: {} gradient {:.3} momentum {:.4} weight {:.4}",
                    id, gradient, velocity, *w
                );
            }
        }

        let pinned: BTreeSet<String> = next
            .vector
            .weights
            .keys()
            .filter(|id| book.total_outcomes(id) < c.min_samples)
            .cloned()
            .collect();
        next.vector.renormalize(&pinned, c.min_weight, c.max_weight);
        next.vector.version = snapshot.vector.version + 1;
        next.vector.updated_at = now;
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::market::RegimeType;
    use crate::domain::performance::StrategyPerformanceRecord;
    use crate::domain::signals::Direction;
    use crate::domain::signals::strategy_ids;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn outcome(status: SignalStatus, pnl: Option<Decimal>, contributors: &[&str]) -> SignalOutcome {
        SignalOutcome {
            signal_id: Uuid::new_v4(),
            symbol: "BTCUSDT".to_string(),
            direction: Direction::Long,
            status,
            strategy_id: contributors[0].to_string(),
            contributors: contributors.iter().map(|s| s.to_string()).collect(),
            regime: RegimeType::BullMomentum,
            profit_loss_percent: pnl,
            completed_at: Utc::now(),
        }
    }

    fn seasoned_book(ids: &[&str], wins: u32) -> PerformanceBook {
        let now = Utc::now();
        let records = ids
            .iter()
            .map(|id| {
                let mut r = StrategyPerformanceRecord::new(*id, RegimeType::BullMomentum, now);
                for _ in 0..wins {
                    r.record(SignalStatus::Success, now);
                }
                r
            })
            .collect();
        PerformanceBook::from_records(records)
    }

    #[test]
    fn test_gradient_sign_and_scale() {
        let opt = WeightOptimizer::new(LearningConfig::default());
        let win = outcome(SignalStatus::Success, Some(dec!(5.5)), &["TrendAlignment"]);
        assert_eq!(opt.gradient(&win), 1.0);

        let loss = outcome(SignalStatus::Failed, Some(dec!(-2.5)), &["TrendAlignment"]);
        assert!((opt.gradient(&loss) + 0.5).abs() < 1e-9);

        let tiny = outcome(SignalStatus::Success, Some(dec!(0.01)), &["TrendAlignment"]);
        assert!((opt.gradient(&tiny) - 0.1).abs() < 1e-9);

        let flat = outcome(SignalStatus::Expired, None, &["TrendAlignment"]);
        assert_eq!(opt.gradient(&flat), 0.0);

        let drifted = outcome(SignalStatus::Expired, Some(dec!(-1.0)), &["TrendAlignment"]);
        assert!((opt.gradient(&drifted) + 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_win_raises_credited_weight() {
        let opt = WeightOptimizer::new(LearningConfig::default());
        let snapshot = WeightSnapshot::initial(&strategy_ids::ALL, Utc::now());
        let book = seasoned_book(&strategy_ids::ALL, 10);
        let win = outcome(SignalStatus::Success, Some(dec!(5)), &[strategy_ids::TREND_ALIGNMENT]);

        let next = opt.apply(&snapshot, &win, &book, Utc::now());
        let before = snapshot.vector.get(strategy_ids::TREND_ALIGNMENT).unwrap();
        let after = next.vector.get(strategy_ids::TREND_ALIGNMENT).unwrap();
        assert!(after > before);
        assert!(next.vector.is_normalized());
        assert_eq!(next.vector.version, snapshot.vector.version + 1);
        assert!(next.momentum[strategy_ids::TREND_ALIGNMENT] > 0.0);
    }

    #[test]
    fn test_unseasoned_strategy_stays_equal() {
        let opt = WeightOptimizer::new(LearningConfig::default());
        let snapshot = WeightSnapshot::initial(&strategy_ids::ALL, Utc::now());
        let book = PerformanceBook::default();
        let win = outcome(SignalStatus::Success, Some(dec!(5)), &[strategy_ids::TREND_ALIGNMENT]);

        let next = opt.apply(&snapshot, &win, &book, Utc::now());
        let equal = 1.0 / strategy_ids::ALL.len() as f64;
        for id in strategy_ids::ALL {
            assert!((next.vector.get(id).unwrap() - equal).abs() < 1e-9);
        }
        assert!(next.momentum[strategy_ids::TREND_ALIGNMENT] > 0.0);
    }

    #[test]
    fn test_long_losing_streak_respects_bounds() {
        let config = LearningConfig::default();
        let opt = WeightOptimizer::new(config.clone());
        let mut snapshot = WeightSnapshot::initial(&strategy_ids::ALL, Utc::now());
        let book = seasoned_book(&strategy_ids::ALL, 10);

        for _ in 0..200 {
            let loss = outcome(SignalStatus::Failed, Some(dec!(-3)), &[strategy_ids::VOLUME_SURGE]);
            snapshot = opt.apply(&snapshot, &loss, &book, Utc::now());
            assert!(snapshot.vector.is_normalized());
        }
        for w in snapshot.vector.weights.values() {
            assert!(*w >= config.min_weight - 1e-9 && *w <= config.max_weight + 1e-9);
        }
        let loser = snapshot.vector.get(strategy_ids::VOLUME_SURGE).unwrap();
        assert!((loser - config.min_weight).abs() < 1e-6);
    }
}
