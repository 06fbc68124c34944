//! Quality gate: scores consensus candidates and decides publication.
//!
//! Decision order for a candidate:
//! 1. shutdown / active-signal checks
//! 2. strategy win-rate and win-probability floors
//! 3. quality score against `min_accept_score`
//! 4. under the budget lock: publish when excellent and allowed, otherwise
//!    queue (or reject when the day is spent)
//!
//! Publication persists first; a signal that cannot be stored is never
//! handed to the tracker.

use super::budget::{BudgetStatus, EnqueueOutcome, PublicationBudget, QueuedCandidate};
use super::scoring::{QualityScorer, ScoringInput};
use super::signal_builder::SignalBuilder;
use super::win_probability::{LogisticWinModel, WinFeatures, WinProbabilityModel};
use crate::config::QualityGateConfig;
use crate::domain::errors::GateRejection;
use crate::domain::market::RegimeState;
use crate::domain::performance::PerformanceBook;
use crate::domain::ports::MarketDataService;
use crate::domain::repositories::SignalRepository;
use crate::domain::signals::{ConsensusResult, Signal};
use crate::infrastructure::event_bus::EventBus;
use crate::infrastructure::observability::Metrics;
use anyhow::Result;
use chrono::{DateTime, Duration, Timelike, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, mpsc, watch};
use tracing::{debug, error, info, warn};

/// A consensus result with the market facts needed to price it.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub consensus: ConsensusResult,
    pub regime: RegimeState,
    pub price: Decimal,
    pub atr: Option<f64>,
    pub atr_pct: Option<f64>,
    pub evaluated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GateDecision {
    Published(Box<Signal>),
    Queued { score: f64, queue_size: usize },
    Rejected(GateRejection),
}

pub struct QualityGate {
    config: QualityGateConfig,
    scorer: QualityScorer,
    builder: SignalBuilder,
    win_model: Arc<dyn WinProbabilityModel>,
    budget: Mutex<PublicationBudget>,
    signal_repo: Arc<dyn SignalRepository>,
    market_data: Arc<dyn MarketDataService>,
    performance: watch::Receiver<Arc<PerformanceBook>>,
    published_tx: mpsc::Sender<Signal>,
    event_bus: EventBus,
    metrics: Option<Metrics>,
    shutting_down: AtomicBool,
}

impl QualityGate {
    pub fn new(
        config: QualityGateConfig,
        signal_repo: Arc<dyn SignalRepository>,
        market_data: Arc<dyn MarketDataService>,
        performance: watch::Receiver<Arc<PerformanceBook>>,
        published_tx: mpsc::Sender<Signal>,
        event_bus: EventBus,
    ) -> Self {
        Self {
            scorer: QualityScorer::new(config.clone()),
            builder: SignalBuilder::new(&config),
            win_model: Arc::new(LogisticWinModel::default()),
            budget: Mutex::new(PublicationBudget::new(&config, Utc::now())),
            config,
            signal_repo,
            market_data,
            performance,
            published_tx,
            event_bus,
            metrics: None,
            shutting_down: AtomicBool::new(false),
        }
    }

    pub fn with_win_model(mut self, model: Arc<dyn WinProbabilityModel>) -> Self {
        self.win_model = model;
        self
    }

    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Restores today's count, the hourly window and the last publication
    /// time from stored signals.
    pub async fn rebuild_from_repository(&self, now: DateTime<Utc>) -> Result<()> {
        let start_of_day = now
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .map(|t| t.and_utc())
            .unwrap_or(now);
        let since = start_of_day.min(now - Duration::hours(1));
        let published = self.signal_repo.published_since(since).await?;

        let mut budget = self.budget.lock().await;
        budget.restore(&published, now);
        let status = budget.status(now);
        info!(
            "QualityGate: budget restored ({} published today, {} this hour)",
            status.published_today, status.published_this_hour
        );
        Ok(())
    }

    pub async fn budget_status(&self, now: DateTime<Utc>) -> BudgetStatus {
        self.budget.lock().await.status(now)
    }

    /// Stops admissions and drops everything queued.
    pub async fn begin_shutdown(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
        let dropped = self.budget.lock().await.clear_queue();
        info!("QualityGate: admissions closed, {} queued candidates dropped", dropped.len());
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    pub async fn evaluate(&self, candidate: Candidate) -> GateDecision {
        let symbol = candidate.consensus.symbol.clone();
        match self.try_evaluate(candidate).await {
            Ok(decision) => decision,
            Err(rejection) => {
                self.on_rejected(&symbol, &rejection).await;
                GateDecision::Rejected(rejection)
            }
        }
    }

    async fn try_evaluate(&self, candidate: Candidate) -> Result<GateDecision, GateRejection> {
        if self.is_shutting_down() {
            return Err(GateRejection::ShuttingDown);
        }
        let Candidate {
            consensus,
            regime,
            price,
            atr,
            atr_pct,
            evaluated_at: now,
        } = candidate;
        let symbol = consensus.symbol.clone();

        self.ensure_no_active(&symbol).await?;

        let levels = self
            .builder
            .levels(consensus.direction, price, atr)
            .ok_or(GateRejection::QualityTooLow {
                score: 0.0,
                min: self.config.min_accept_score,
            })?;

        let primary = consensus.primary_strategy().unwrap_or_default().to_string();
        let book = self.performance.borrow().clone();
        let resolved = self
            .scorer
            .resolve_win_rate(&book, &primary, consensus.regime_at_evaluation);
        self.scorer.check_win_rate_floor(&primary, resolved)?;

        let features = WinFeatures {
            weighted_confidence: consensus.weighted_confidence,
            agreement_score: consensus.agreement_score,
            directional_votes: consensus.directional_votes(),
            risk_reward: levels.risk_reward,
            strategy_win_rate: resolved.win_rate,
            regime_adjustment: consensus.quality_adjustment,
            atr_pct,
        };
        let win_probability = match self.win_model.predict(&features) {
            Ok(p) if p.is_finite() => p.clamp(0.0, 1.0),
            Ok(p) => {
                warn!("QualityGate [{}]: {} returned {}, using 0.5", symbol, self.win_model.name(), p);
                0.5
            }
            Err(e) => {
                warn!("QualityGate [{}]: {} failed ({}), using 0.5", symbol, self.win_model.name(), e);
                0.5
            }
        };
        self.scorer.check_win_probability_floor(win_probability)?;

        let contributors = consensus.contributor_ids();
        let score = self.scorer.score(&ScoringInput {
            weighted_confidence: consensus.weighted_confidence,
            win_probability,
            atr_pct,
            regime: &regime,
            contributors: &contributors,
            risk_reward: levels.risk_reward,
            strategy_win_rate: resolved.win_rate,
            hour: now.hour(),
        });
        debug!(
            "QualityGate [{}]: score {:.1} factors {:?} (win rate {:.2}{}, p_win {:.3})",
            symbol,
            score.total,
            score.factors,
            resolved.win_rate,
            if resolved.seasoned { "" } else { " neutral" },
            win_probability
        );

        if score.total < self.config.min_accept_score {
            return Err(GateRejection::QualityTooLow {
                score: score.total,
                min: self.config.min_accept_score,
            });
        }

        let signal = self.builder.build(&consensus, levels, score.total, &regime, now);

        let mut budget = self.budget.lock().await;
        if self.is_shutting_down() {
            return Err(GateRejection::ShuttingDown);
        }

        let allowed = budget.check(now);
        if score.total >= self.config.excellent_score && allowed.is_ok() {
            let published = self.persist(signal).await?;
            budget.record(now);
            drop(budget);
            self.announce(&published).await;
            return Ok(GateDecision::Published(Box::new(published)));
        }

        if let Err(rejection @ GateRejection::DailyBudgetExhausted { .. }) = &allowed {
            return Err(rejection.clone());
        }

        let queued = QueuedCandidate {
            signal,
            score: score.total,
            enqueued_at: now,
        };
        if let EnqueueOutcome::Replaced(evicted) = budget.enqueue(queued)? {
            debug!(
                "QualityGate: {} (score {:.1}) left the queue for {} (score {:.1})",
                evicted.signal.symbol, evicted.score, symbol, score.total
            );
        }
        let queue_size = budget.queue_len();
        drop(budget);

        let reason = match &allowed {
            Err(blocked) => blocked.code(),
            Ok(()) => "near_miss",
        };
        info!(
            "QualityGate [{}]: queued {} score {:.1} ({}), queue size {}",
            symbol, consensus.direction, score.total, reason, queue_size
        );
        if let Some(metrics) = &self.metrics {
            metrics.inc_gate_decision("queued", reason);
        }
        Ok(GateDecision::Queued {
            score: score.total,
            queue_size,
        })
    }

    /// Periodic flush: prune stale entries, then publish the best queued
    /// candidate if the budget allows and discard the rest.
    ///
    /// The published signal is re-anchored on the latest price; candidates
    /// whose stop or first target the market has already reached are dropped.
    pub async fn flush(&self, now: DateTime<Utc>) -> Option<Signal> {
        let mut budget = self.budget.lock().await;

        for stale in budget.prune_stale(now) {
            let rejection = GateRejection::Stale {
                age_secs: (now - stale.enqueued_at).num_seconds(),
                ttl_secs: self.config.candidate_ttl_seconds,
            };
            self.on_rejected(&stale.signal.symbol, &rejection).await;
        }

        if budget.queue_len() == 0 {
            return None;
        }
        if budget.daily_exhausted(now) {
            let dropped = budget.clear_queue();
            info!("QualityGate: daily budget spent, {} queued candidates dropped", dropped.len());
            return None;
        }
        if let Err(blocked) = budget.check(now) {
            debug!("QualityGate: flush held ({}), {} queued", blocked, budget.queue_len());
            return None;
        }

        let prices = match self.market_data.get_prices(budget.queued_symbols()).await {
            Ok(prices) => prices,
            Err(e) => {
                warn!("QualityGate: flush held, price lookup failed: {:#}", e);
                return None;
            }
        };

        while let Some(best) = budget.take_best() {
            let symbol = best.signal.symbol.clone();
            if let Err(rejection) = self.ensure_no_active(&symbol).await {
                self.on_rejected(&symbol, &rejection).await;
                continue;
            }

            let mut signal = best.signal;
            let repriced = match prices.get(&symbol) {
                Some(price) => self.builder.reprice(&mut signal, *price, now),
                None => Err(GateRejection::PriceUnavailable {
                    symbol: symbol.clone(),
                }),
            };
            if let Err(rejection) = repriced {
                self.on_rejected(&symbol, &rejection).await;
                continue;
            }
            match self.persist(signal).await {
                Ok(published) => {
                    budget.record(now);
                    let discarded = budget.clear_queue();
                    drop(budget);
                    if !discarded.is_empty() {
                        info!(
                            "QualityGate: flushed {} (score {:.1}), {} other candidates discarded",
                            symbol,
                            best.score,
                            discarded.len()
                        );
                    }
                    self.announce(&published).await;
                    return Some(published);
                }
                Err(rejection) => {
                    self.on_rejected(&symbol, &rejection).await;
                    return None;
                }
            }
        }
        None
    }

    async fn ensure_no_active(&self, symbol: &str) -> Result<(), GateRejection> {
        match self.signal_repo.has_active_for_symbol(symbol).await {
            Ok(false) => Ok(()),
            Ok(true) => Err(GateRejection::ActiveSignalExists {
                symbol: symbol.to_string(),
            }),
            Err(e) => Err(GateRejection::PersistenceFailed {
                reason: format!("active signal lookup failed: {:#}", e),
            }),
        }
    }

    /// Stores the signal, retrying once.
    async fn persist(&self, signal: Signal) -> Result<Signal, GateRejection> {
        let first = match self.signal_repo.save(&signal).await {
            Ok(()) => return Ok(signal),
            Err(e) => e,
        };
        warn!(
            "QualityGate [{}]: failed to persist signal {}: {:#}. Retrying",
            signal.symbol, signal.id, first
        );
        tokio::time::sleep(std::time::Duration::from_millis(self.config.persist_retry_delay_ms)).await;

        match self.signal_repo.save(&signal).await {
            Ok(()) => Ok(signal),
            Err(e) => {
                error!(
                    "QualityGate [{}]: ALERT signal {} dropped, persistence failed after retry: {:#}",
                    signal.symbol, signal.id, e
                );
                Err(GateRejection::PersistenceFailed {
                    reason: format!("{:#}", e),
                })
            }
        }
    }

    async fn announce(&self, signal: &Signal) {
        info!(
            "QualityGate [{}]: PUBLISHED {} {} entry {} stop {} targets {:?} score {:.1} tier {} ({})",
            signal.symbol,
            signal.id,
            signal.direction,
            signal.entry,
            signal.stop_loss,
            signal.targets,
            signal.quality_score,
            signal.quality_tier,
            signal.strategy_id
        );
        if let Some(metrics) = &self.metrics {
            metrics.inc_gate_decision("published", signal.quality_tier.as_str());
            metrics.inc_published(&signal.symbol, signal.quality_tier.as_str());
        }
        if self.published_tx.send(signal.clone()).await.is_err() {
            warn!(
                "QualityGate [{}]: lifecycle tracker gone, signal {} will be picked up on restart",
                signal.symbol, signal.id
            );
        }
        self.event_bus.signal_published(signal);
    }

    async fn on_rejected(&self, symbol: &str, rejection: &GateRejection) {
        match rejection {
            GateRejection::ActiveSignalExists { .. } | GateRejection::QualityTooLow { .. } => {
                debug!("QualityGate [{}]: rejected: {}", symbol, rejection)
            }
            _ => info!("QualityGate [{}]: rejected: {}", symbol, rejection),
        }
        if let Some(metrics) = &self.metrics {
            metrics.inc_gate_decision("rejected", rejection.code());
        }
        self.event_bus.candidate_rejected(symbol, rejection);
    }
}
