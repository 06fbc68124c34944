use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

const SUM_TOLERANCE: f64 = 1e-9;

/// One scalar weight per strategy, always summing to 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightVector {
    pub weights: BTreeMap<String, f64>,
    pub version: u64,
    pub updated_at: DateTime<Utc>,
}

impl WeightVector {
    pub fn equal<S: AsRef<str>>(strategy_ids: &[S], now: DateTime<Utc>) -> Self {
        let n = strategy_ids.len().max(1) as f64;
        let weights = strategy_ids
            .iter()
            .map(|id| (id.as_ref().to_string(), 1.0 / n))
            .collect();
        Self {
            weights,
            version: 0,
            updated_at: now,
        }
    }

    pub fn equal_weight(&self) -> f64 {
        1.0 / self.weights.len().max(1) as f64
    }

    pub fn get(&self, strategy_id: &str) -> Option<f64> {
        self.weights.get(strategy_id).copied()
    }

    pub fn sum(&self) -> f64 {
        self.weights.values().sum()
    }

    pub fn is_normalized(&self) -> bool {
        (self.sum() - 1.0).abs() < 1e-6
    }

    /// Adds missing strategies at the equal weight and drops unknown ones,
    /// keeping the relative weights of the survivors.
    pub fn ensure_strategies<S: AsRef<str>>(&mut self, strategy_ids: &[S]) {
        let wanted: BTreeSet<String> = strategy_ids.iter().map(|s| s.as_ref().to_string()).collect();
        let n = wanted.len().max(1) as f64;

        self.weights.retain(|id, _| wanted.contains(id));
        for id in &wanted {
            self.weights.entry(id.clone()).or_insert(1.0 / n);
        }

        let total = self.sum();
        if total > SUM_TOLERANCE {
            for w in self.weights.values_mut() {
                *w /= total;
            }
        } else {
            for w in self.weights.values_mut() {
                *w = 1.0 / n;
            }
        }
    }

    /// Rescales to sum 1 while holding every weight inside `[min, max]`.
    ///
    /// Strategies in `pinned` are fixed at the equal weight. The remaining
    /// budget is distributed proportionally; any weight pushed past a bound
    /// is fixed at that bound and the rest re-solved (water filling).
    pub fn renormalize(&mut self, pinned: &BTreeSet<String>, min: f64, max: f64) {
        let n = self.weights.len();
        if n == 0 {
            return;
        }
        let equal = 1.0 / n as f64;

        let mut fixed: BTreeMap<String, f64> = self
            .weights
            .keys()
            .filter(|id| pinned.contains(*id))
            .map(|id| (id.clone(), equal))
            .collect();

        let feasible = min <= equal && equal <= max;
        loop {
            let budget = 1.0 - fixed.values().sum::<f64>();
            let free: Vec<(&String, f64)> = self
                .weights
                .iter()
                .filter(|(id, _)| !fixed.contains_key(*id))
                .map(|(id, w)| (id, w.max(0.0)))
                .collect();

            if free.is_empty() {
                break;
            }

            let free_sum: f64 = free.iter().map(|(_, w)| w).sum();
            let scaled: Vec<(String, f64)> = free
                .iter()
                .map(|(id, w)| {
                    let v = if free_sum > SUM_TOLERANCE {
                        w / free_sum * budget
                    } else {
                        budget / free.len() as f64
                    };
                    ((*id).clone(), v)
                })
                .collect();

            if !feasible {
                for (id, v) in scaled {
                    fixed.insert(id, v);
                }
                break;
            }

            let mut violated = false;
            for (id, v) in &scaled {
                if *v > max + SUM_TOLERANCE {
                    fixed.insert(id.clone(), max);
                    violated = true;
                } else if *v < min - SUM_TOLERANCE {
                    fixed.insert(id.clone(), min);
                    violated = true;
                }
            }

            if !violated {
                for (id, v) in scaled {
                    fixed.insert(id, v);
                }
                break;
            }
        }

        // Absorb float drift in the largest weight
        let drift = 1.0 - fixed.values().sum::<f64>();
        if let Some((_, w)) = fixed
            .iter_mut()
            .filter(|(id, _)| !pinned.contains(*id))
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
        {
            *w += drift;
        }

        self.weights = fixed;
    }
}

/// Learning state persisted as one versioned blob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightSnapshot {
    pub vector: WeightVector,
    pub momentum: BTreeMap<String, f64>,
}

impl WeightSnapshot {
    pub fn initial<S: AsRef<str>>(strategy_ids: &[S], now: DateTime<Utc>) -> Self {
        Self {
            vector: WeightVector::equal(strategy_ids, now),
            momentum: strategy_ids
                .iter()
                .map(|id| (id.as_ref().to_string(), 0.0))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids() -> Vec<&'static str> {
        vec!["A", "B", "C", "D"]
    }

    #[test]
    fn test_equal_weights_sum_to_one() {
        let v = WeightVector::equal(&ids(), Utc::now());
        assert!(v.is_normalized());
        assert_eq!(v.get("A"), Some(0.25));
    }

    #[test]
    fn test_renormalize_respects_bounds() {
        let mut v = WeightVector::equal(&ids(), Utc::now());
        v.weights.insert("A".into(), 0.9);
        v.weights.insert("B".into(), 0.01);
        v.renormalize(&BTreeSet::new(), 0.05, 0.40);

        assert!(v.is_normalized());
        for w in v.weights.values() {
            assert!(*w >= 0.05 - 1e-9 && *w <= 0.40 + 1e-9, "weight {} out of bounds", w);
        }
        assert!((v.get("A").unwrap() - 0.40).abs() < 1e-9);
        assert!((v.get("B").unwrap() - 0.05).abs() < 1e-9);
    }

    #[test]
    fn test_pinned_strategies_stay_equal() {
        let mut v = WeightVector::equal(&ids(), Utc::now());
        v.weights.insert("A".into(), 0.5);
        let pinned: BTreeSet<String> = ["C".to_string(), "D".to_string()].into();
        v.renormalize(&pinned, 0.05, 0.6);

        assert!(v.is_normalized());
        assert!((v.get("C").unwrap() - 0.25).abs() < 1e-12);
        assert!((v.get("D").unwrap() - 0.25).abs() < 1e-12);
        assert!(v.get("A").unwrap() > v.get("B").unwrap());
    }

    #[test]
    fn test_ensure_strategies_adds_and_drops() {
        let mut v = WeightVector::equal(&["A", "B"], Utc::now());
        v.ensure_strategies(&["A", "C", "D"]);
        assert!(v.get("B").is_none());
        assert!(v.get("C").is_some());
        assert!(v.is_normalized());
    }
}
