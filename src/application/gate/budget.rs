//! Publication budget and near-miss queue.
//!
//! Plain state, no locking of its own: the quality gate owns the single
//! instance behind one mutex so every check-then-record is atomic.

use crate::config::QualityGateConfig;
use crate::domain::errors::GateRejection;
use crate::domain::signals::Signal;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;
use std::collections::VecDeque;

/// A candidate that scored between the accept and excellent thresholds.
#[derive(Debug, Clone)]
pub struct QueuedCandidate {
    pub signal: Signal,
    pub score: f64,
    pub enqueued_at: DateTime<Utc>,
}

/// Read-only budget view for status displays.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BudgetStatus {
    pub published_today: u32,
    pub remaining: u32,
    pub published_this_hour: u32,
    /// `None` when a publication would be allowed right now
    pub next_eligible_at: Option<DateTime<Utc>>,
    pub queue_size: usize,
}

#[derive(Debug)]
pub enum EnqueueOutcome {
    Added,
    /// Took the place of a weaker candidate
    Replaced(QueuedCandidate),
}

#[derive(Debug)]
pub struct PublicationBudget {
    daily_limit: u32,
    hourly_cap: u32,
    min_spacing: Duration,
    queue_capacity: usize,
    candidate_ttl: Duration,

    day: NaiveDate,
    published_today: u32,
    recent: VecDeque<DateTime<Utc>>,
    last_published: Option<DateTime<Utc>>,
    queue: Vec<QueuedCandidate>,
}

impl PublicationBudget {
    pub fn new(config: &QualityGateConfig, now: DateTime<Utc>) -> Self {
        Self {
            daily_limit: config.daily_limit,
            hourly_cap: config.hourly_cap,
            min_spacing: Duration::minutes(config.min_spacing_minutes),
            queue_capacity: config.queue_capacity,
            candidate_ttl: Duration::seconds(config.candidate_ttl_seconds),
            day: now.date_naive(),
            published_today: 0,
            recent: VecDeque::new(),
            last_published: None,
            queue: Vec::new(),
        }
    }

    /// Rebuilds counters from publication times (any order).
    pub fn restore(&mut self, published: &[DateTime<Utc>], now: DateTime<Utc>) {
        self.day = now.date_naive();
        self.published_today = published
            .iter()
            .filter(|t| t.date_naive() == self.day && **t <= now)
            .count() as u32;

        let mut recent: Vec<DateTime<Utc>> = published
            .iter()
            .copied()
            .filter(|t| now - *t < Duration::hours(1) && *t <= now)
            .collect();
        recent.sort();
        self.recent = recent.into();
        self.last_published = published.iter().copied().filter(|t| *t <= now).max();
    }

    /// Applies the UTC day boundary and slides the hourly window.
    fn roll(&mut self, now: DateTime<Utc>) {
        let today = now.date_naive();
        if today != self.day {
            self.day = today;
            self.published_today = 0;
        }
        while let Some(front) = self.recent.front() {
            if now - *front >= Duration::hours(1) {
                self.recent.pop_front();
            } else {
                break;
            }
        }
    }

    /// Whether a publication is allowed right now, with the binding limit.
    pub fn check(&mut self, now: DateTime<Utc>) -> Result<(), GateRejection> {
        self.roll(now);
        if self.published_today >= self.daily_limit {
            return Err(GateRejection::DailyBudgetExhausted {
                published: self.published_today,
                limit: self.daily_limit,
            });
        }
        if self.recent.len() as u32 >= self.hourly_cap {
            return Err(GateRejection::HourlyCapReached {
                published: self.recent.len() as u32,
                limit: self.hourly_cap,
            });
        }
        if let Some(last) = self.last_published {
            let elapsed = now - last;
            if elapsed < self.min_spacing {
                return Err(GateRejection::TooSoon {
                    elapsed_secs: elapsed.num_seconds(),
                    min_secs: self.min_spacing.num_seconds(),
                });
            }
        }
        Ok(())
    }

    pub fn daily_exhausted(&mut self, now: DateTime<Utc>) -> bool {
        self.roll(now);
        self.published_today >= self.daily_limit
    }

    pub fn record(&mut self, at: DateTime<Utc>) {
        self.roll(at);
        self.published_today += 1;
        self.recent.push_back(at);
        self.last_published = Some(at);
    }

    /// Adds a near-miss. One entry per symbol: a better score replaces the
    /// queued one. A full queue evicts its lowest entry only for a higher
    /// score.
    pub fn enqueue(&mut self, candidate: QueuedCandidate) -> Result<EnqueueOutcome, GateRejection> {
        if let Some(pos) = self
            .queue
            .iter()
            .position(|q| q.signal.symbol == candidate.signal.symbol)
        {
            let queued_score = self.queue[pos].score;
            if candidate.score <= queued_score {
                return Err(GateRejection::QueueFull {
                    score: candidate.score,
                    lowest: queued_score,
                });
            }
            let old = std::mem::replace(&mut self.queue[pos], candidate);
            return Ok(EnqueueOutcome::Replaced(old));
        }

        if self.queue.len() < self.queue_capacity {
            self.queue.push(candidate);
            return Ok(EnqueueOutcome::Added);
        }

        let Some((lowest_idx, lowest)) = self
            .queue
            .iter()
            .enumerate()
            .min_by(|a, b| a.1.score.total_cmp(&b.1.score))
            .map(|(i, q)| (i, q.score))
        else {
            return Err(GateRejection::QueueFull {
                score: candidate.score,
                lowest: 0.0,
            });
        };

        if candidate.score <= lowest {
            return Err(GateRejection::QueueFull {
                score: candidate.score,
                lowest,
            });
        }
        let evicted = std::mem::replace(&mut self.queue[lowest_idx], candidate);
        Ok(EnqueueOutcome::Replaced(evicted))
    }

    /// Removes and returns queued candidates older than the TTL.
    pub fn prune_stale(&mut self, now: DateTime<Utc>) -> Vec<QueuedCandidate> {
        let ttl = self.candidate_ttl;
        let (stale, fresh): (Vec<_>, Vec<_>) = std::mem::take(&mut self.queue)
            .into_iter()
            .partition(|q| now - q.enqueued_at > ttl);
        self.queue = fresh;
        stale
    }

    /// Highest score first; earlier entry wins a tie.
    pub fn take_best(&mut self) -> Option<QueuedCandidate> {
        let idx = self
            .queue
            .iter()
            .enumerate()
            .max_by(|a, b| {
                a.1.score
                    .total_cmp(&b.1.score)
                    .then_with(|| b.1.enqueued_at.cmp(&a.1.enqueued_at))
            })
            .map(|(i, _)| i)?;
        Some(self.queue.swap_remove(idx))
    }

    pub fn clear_queue(&mut self) -> Vec<QueuedCandidate> {
        std::mem::take(&mut self.queue)
    }

    pub fn queued_symbols(&self) -> Vec<String> {
        self.queue.iter().map(|q| q.signal.symbol.clone()).collect()
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn next_eligible_at(&mut self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.roll(now);
        if self.published_today >= self.daily_limit {
            let tomorrow = self.day.succ_opt()?.and_hms_opt(0, 0, 0)?.and_utc();
            return Some(tomorrow);
        }

        let mut eligible = now;
        if let Some(last) = self.last_published {
            eligible = eligible.max(last + self.min_spacing);
        }
        if self.recent.len() as u32 >= self.hourly_cap {
            let idx = self.recent.len() - self.hourly_cap as usize;
            if let Some(t) = self.recent.get(idx) {
                eligible = eligible.max(*t + Duration::hours(1));
            }
        }
        (eligible > now).then_some(eligible)
    }

    pub fn status(&mut self, now: DateTime<Utc>) -> BudgetStatus {
        let next_eligible_at = self.next_eligible_at(now);
        BudgetStatus {
            published_today: self.published_today,
            remaining: self.daily_limit.saturating_sub(self.published_today),
            published_this_hour: self.recent.len() as u32,
            next_eligible_at,
            queue_size: self.queue.len(),
        }
    }
}
