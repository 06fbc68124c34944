//! Strategy ensemble runner with per-strategy circuit breakers.
//!
//! Each registered strategy is evaluated on the blocking pool under a
//! shared semaphore and a per-strategy timeout. Panics, timeouts and
//! malformed opinions become `StrategyFault`s: they never fail the run,
//! they only feed the breaker that may disable the strategy.

use super::bollinger_breakout::BollingerBreakoutStrategy;
use super::rsi_reversal::RsiReversalStrategy;
use super::statistical::{StatisticalMomentumStrategy, ZScoreMeanReversionStrategy};
use super::traits::{AnalysisContext, SignalStrategy};
use super::trend_alignment::TrendAlignmentStrategy;
use super::volume_surge::VolumeSurgeStrategy;
use crate::config::EnsembleConfig;
use crate::domain::errors::StrategyFault;
use crate::domain::signals::StrategyOpinion;
use crate::infrastructure::event_bus::EventBus;
use crate::infrastructure::observability::Metrics;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{RwLock, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Why a strategy stopped receiving cycles.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum DisableReason {
    ConsecutiveFaults(u32),
    FaultRate(f64),
    PoorWinRate(f64),
    Manual(String),
}

impl std::fmt::Display for DisableReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DisableReason::ConsecutiveFaults(n) => write!(f, "{} consecutive faults", n),
            DisableReason::FaultRate(rate) => write!(f, "fault rate {:.0}%", rate * 100.0),
            DisableReason::PoorWinRate(rate) => {
                write!(f, "rolling win rate {:.0}%", rate * 100.0)
            }
            DisableReason::Manual(note) => write!(f, "manual: {}", note),
        }
    }
}

/// Health bookkeeping for one strategy.
#[derive(Debug, Clone, Serialize)]
pub struct StrategyHealth {
    pub strategy_id: String,
    pub enabled: bool,
    pub disabled_reason: Option<DisableReason>,
    pub runs: u64,
    pub faults: u64,
    pub consecutive_faults: u32,
    pub last_fault: Option<String>,
    #[serde(skip)]
    window: VecDeque<bool>,
}

impl StrategyHealth {
    fn new(strategy_id: &str) -> Self {
        Self {
            strategy_id: strategy_id.to_string(),
            enabled: true,
            disabled_reason: None,
            runs: 0,
            faults: 0,
            consecutive_faults: 0,
            last_fault: None,
            window: VecDeque::new(),
        }
    }

    /// Fault share of the rolling window.
    pub fn fault_rate(&self) -> f64 {
        if self.window.is_empty() {
            return 0.0;
        }
        self.window.iter().filter(|f| **f).count() as f64 / self.window.len() as f64
    }

    fn push(&mut self, faulted: bool, window: usize) {
        self.runs += 1;
        self.window.push_back(faulted);
        while self.window.len() > window {
            self.window.pop_front();
        }
    }
}

/// Outcome of one ensemble run.
#[derive(Debug, Clone, Default)]
pub struct EnsembleRun {
    /// Opinions in registration order, neutral ones included
    pub opinions: Vec<StrategyOpinion>,
    pub faults: Vec<StrategyFault>,
    pub skipped_disabled: Vec<String>,
    pub elapsed: Duration,
}

pub struct StrategyRegistry {
    strategies: Vec<Arc<dyn SignalStrategy>>,
    health: Arc<RwLock<HashMap<String, StrategyHealth>>>,
    semaphore: Arc<Semaphore>,
    config: EnsembleConfig,
    event_bus: Option<EventBus>,
    metrics: Option<Metrics>,
}

impl StrategyRegistry {
    pub fn new(config: EnsembleConfig) -> Self {
        Self {
            strategies: Vec::new(),
            health: Arc::new(RwLock::new(HashMap::new())),
            semaphore: Arc::new(Semaphore::new(config.worker_pool_size.max(1))),
            config,
            event_bus: None,
            metrics: None,
        }
    }

    /// Registry loaded with the six built-in detectors.
    pub fn with_default_strategies(config: EnsembleConfig) -> Self {
        let mut registry = Self::new(config);
        registry.register(Arc::new(TrendAlignmentStrategy::default()));
        registry.register(Arc::new(StatisticalMomentumStrategy::default()));
        registry.register(Arc::new(ZScoreMeanReversionStrategy::default()));
        registry.register(Arc::new(BollingerBreakoutStrategy::default()));
        registry.register(Arc::new(VolumeSurgeStrategy::default()));
        registry.register(Arc::new(RsiReversalStrategy::default()));
        registry
    }

    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Adds a strategy. Registering an id twice replaces the earlier one.
    pub fn register(&mut self, strategy: Arc<dyn SignalStrategy>) {
        let id = strategy.id().to_string();
        self.strategies.retain(|s| s.id() != id);
        self.strategies.push(strategy);
        // Registration happens before the registry is shared
        if let Ok(mut health) = self.health.try_write() {
            health.entry(id.clone()).or_insert_with(|| StrategyHealth::new(&id));
        }
    }

    pub fn strategy_ids(&self) -> Vec<String> {
        self.strategies.iter().map(|s| s.id().to_string()).collect()
    }

    pub async fn is_enabled(&self, strategy_id: &str) -> bool {
        self.health
            .read()
            .await
            .get(strategy_id)
            .map(|h| h.enabled)
            .unwrap_or(false)
    }

    pub async fn disabled_strategies(&self) -> Vec<String> {
        let health = self.health.read().await;
        let mut ids: Vec<String> = health
            .values()
            .filter(|h| !h.enabled)
            .map(|h| h.strategy_id.clone())
            .collect();
        ids.sort();
        ids
    }

    pub async fn health_report(&self) -> Vec<StrategyHealth> {
        let health = self.health.read().await;
        self.strategies
            .iter()
            .filter_map(|s| health.get(s.id()).cloned())
            .collect()
    }

    /// Takes a strategy out of the ensemble. Returns false if it was
    /// already disabled or is unknown.
    pub async fn disable(&self, strategy_id: &str, reason: DisableReason) -> bool {
        {
            let mut health = self.health.write().await;
            let Some(entry) = health.get_mut(strategy_id) else {
                return false;
            };
            if !entry.enabled {
                return false;
            }
            entry.enabled = false;
            entry.disabled_reason = Some(reason.clone());
        }

        warn!("StrategyRegistry: {} disabled ({})", strategy_id, reason);
        if let Some(bus) = &self.event_bus {
            bus.strategy_disabled(strategy_id, &reason.to_string());
        }
        true
    }

    /// Re-admits a disabled strategy with a clean fault history.
    pub async fn enable(&self, strategy_id: &str) -> bool {
        let mut health = self.health.write().await;
        let Some(entry) = health.get_mut(strategy_id) else {
            return false;
        };
        entry.enabled = true;
        entry.disabled_reason = None;
        entry.consecutive_faults = 0;
        entry.window.clear();
        info!("StrategyRegistry: {} re-enabled", strategy_id);
        true
    }

    /// Evaluates every enabled strategy against the context.
    pub async fn run(&self, ctx: Arc<AnalysisContext>) -> EnsembleRun {
        let started = Instant::now();
        let timeout = Duration::from_millis(self.config.strategy_timeout_ms);

        let mut run = EnsembleRun::default();
        let mut join_set = JoinSet::new();

        for (index, strategy) in self.strategies.iter().enumerate() {
            if !self.is_enabled(strategy.id()).await {
                run.skipped_disabled.push(strategy.id().to_string());
                continue;
            }

            let strategy = strategy.clone();
            let ctx = ctx.clone();
            let semaphore = self.semaphore.clone();

            join_set.spawn(async move {
                let strategy_id = strategy.id().to_string();
                let permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        return (index, strategy_id, Ok(None));
                    }
                };

                // The permit lives as long as the blocking work, even past a timeout
                let handle = tokio::task::spawn_blocking(move || {
                    let _permit = permit;
                    strategy.analyze(&ctx)
                });
                let result = match tokio::time::timeout(timeout, handle).await {
                    Ok(Ok(opinion)) => Ok(opinion),
                    Ok(Err(join_error)) => Err(StrategyFault::Panicked {
                        strategy_id: strategy_id.clone(),
                        message: panic_message(join_error),
                    }),
                    Err(_) => Err(StrategyFault::TimedOut {
                        strategy_id: strategy_id.clone(),
                        timeout_ms: timeout.as_millis() as u64,
                    }),
                };
                (index, strategy_id, result)
            });
        }

        let mut collected: Vec<(usize, StrategyOpinion)> = Vec::new();
        while let Some(joined) = join_set.join_next().await {
            let Ok((index, strategy_id, result)) = joined else {
                continue;
            };

            let checked = result.and_then(|opinion| match opinion {
                Some(op) => validate_opinion(&strategy_id, &ctx.symbol, op).map(Some),
                None => Ok(None),
            });

            match checked {
                Ok(opinion) => {
                    self.record_success(&strategy_id).await;
                    if let Some(op) = opinion {
                        collected.push((index, op));
                    }
                }
                Err(fault) => {
                    warn!("StrategyRegistry [{}]: {}", ctx.symbol, fault);
                    if let Some(metrics) = &self.metrics {
                        metrics.inc_strategy_fault(fault.strategy_id(), fault.kind());
                    }
                    self.record_fault(&fault).await;
                    run.faults.push(fault);
                }
            }
        }

        collected.sort_by_key(|(index, _)| *index);
        run.opinions = collected.into_iter().map(|(_, op)| op).collect();
        run.elapsed = started.elapsed();

        if let Some(metrics) = &self.metrics {
            metrics.observe_ensemble(&ctx.symbol, run.elapsed.as_secs_f64());
        }
        debug!(
            "StrategyRegistry [{}]: {} opinions, {} faults, {} disabled in {:?}",
            ctx.symbol,
            run.opinions.len(),
            run.faults.len(),
            run.skipped_disabled.len(),
            run.elapsed
        );
        run
    }

    async fn record_success(&self, strategy_id: &str) {
        let mut health = self.health.write().await;
        if let Some(entry) = health.get_mut(strategy_id) {
            entry.consecutive_faults = 0;
            entry.push(false, self.config.fault_window);
        }
    }

    async fn record_fault(&self, fault: &StrategyFault) {
        let trip = {
            let mut health = self.health.write().await;
            let Some(entry) = health.get_mut(fault.strategy_id()) else {
                return;
            };
            entry.faults += 1;
            entry.consecutive_faults += 1;
            entry.last_fault = Some(fault.to_string());
            entry.push(true, self.config.fault_window);

            if !entry.enabled {
                None
            } else if entry.consecutive_faults >= self.config.max_consecutive_faults {
                Some(DisableReason::ConsecutiveFaults(entry.consecutive_faults))
            } else if entry.window.len() >= self.config.min_window_runs
                && entry.fault_rate() > self.config.fault_rate_threshold
            {
                Some(DisableReason::FaultRate(entry.fault_rate()))
            } else {
                None
            }
        };

        if let Some(reason) = trip {
            self.disable(fault.strategy_id(), reason).await;
        }
    }
}

fn validate_opinion(
    strategy_id: &str,
    symbol: &str,
    opinion: StrategyOpinion,
) -> Result<StrategyOpinion, StrategyFault> {
    let invalid = |reason: String| StrategyFault::InvalidOutput {
        strategy_id: strategy_id.to_string(),
        reason,
    };

    if !opinion.is_valid() {
        return Err(invalid(format!("confidence {} out of range", opinion.confidence)));
    }
    if opinion.strategy_id != strategy_id {
        return Err(invalid(format!("opinion tagged as {}", opinion.strategy_id)));
    }
    if opinion.symbol != symbol {
        return Err(invalid(format!("opinion for {} in a {} cycle", opinion.symbol, symbol)));
    }
    Ok(opinion)
}

fn panic_message(error: tokio::task::JoinError) -> String {
    if !error.is_panic() {
        return error.to_string();
    }
    let payload = error.into_panic();
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::strategies::traits::test_support::bare_context;
    use crate::domain::signals::Direction;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Fixed {
        id: &'static str,
        direction: Option<Direction>,
        confidence: f64,
    }

    impl SignalStrategy for Fixed {
        fn id(&self) -> &str {
            self.id
        }

        fn analyze(&self, ctx: &AnalysisContext) -> Option<StrategyOpinion> {
            Some(match self.direction {
                Some(d) => StrategyOpinion {
                    strategy_id: self.id.to_string(),
                    symbol: ctx.symbol.clone(),
                    direction: Some(d),
                    confidence: self.confidence,
                    reasoning: "fixed".to_string(),
                },
                None => StrategyOpinion::neutral(self.id, &ctx.symbol, "fixed".to_string()),
            })
        }
    }

    struct Panicky;

    impl SignalStrategy for Panicky {
        fn id(&self) -> &str {
            "Panicky"
        }

        fn analyze(&self, _ctx: &AnalysisContext) -> Option<StrategyOpinion> {
            panic!("boom");
        }
    }

    struct Slow(Arc<AtomicUsize>);

    impl SignalStrategy for Slow {
        fn id(&self) -> &str {
            "Slow"
        }

        fn analyze(&self, ctx: &AnalysisContext) -> Option<StrategyOpinion> {
            std::thread::sleep(Duration::from_millis(200));
            self.0.fetch_add(1, Ordering::SeqCst);
            Some(StrategyOpinion::long("Slow", &ctx.symbol, 90.0, "late".to_string()))
        }
    }

    fn config() -> EnsembleConfig {
        EnsembleConfig {
            strategy_timeout_ms: 50,
            worker_pool_size: 4,
            max_consecutive_faults: 3,
            fault_rate_threshold: 0.8,
            fault_window: 20,
            min_window_runs: 10,
        }
    }

    fn ctx() -> Arc<AnalysisContext> {
        Arc::new(bare_context(100.0))
    }

    #[tokio::test]
    async fn test_opinions_keep_registration_order() {
        let mut registry = StrategyRegistry::new(config());
        registry.register(Arc::new(Fixed { id: "A", direction: Some(Direction::Long), confidence: 70.0 }));
        registry.register(Arc::new(Fixed { id: "B", direction: None, confidence: 0.0 }));
        registry.register(Arc::new(Fixed { id: "C", direction: Some(Direction::Short), confidence: 60.0 }));

        let run = registry.run(ctx()).await;
        let ids: Vec<&str> = run.opinions.iter().map(|o| o.strategy_id.as_str()).collect();
        assert_eq!(ids, vec!["A", "B", "C"]);
        assert!(run.faults.is_empty());
    }

    #[tokio::test]
    async fn test_panic_is_isolated() {
        let mut registry = StrategyRegistry::new(config());
        registry.register(Arc::new(Panicky));
        registry.register(Arc::new(Fixed { id: "A", direction: Some(Direction::Long), confidence: 70.0 }));

        let run = registry.run(ctx()).await;
        assert_eq!(run.opinions.len(), 1);
        assert_eq!(run.faults.len(), 1);
        assert_eq!(run.faults[0].kind(), "panic");
    }

    #[tokio::test]
    async fn test_timeout_becomes_fault() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut registry = StrategyRegistry::new(config());
        registry.register(Arc::new(Slow(counter)));

        let run = registry.run(ctx()).await;
        assert!(run.opinions.is_empty());
        assert!(matches!(run.faults[0], StrategyFault::TimedOut { .. }));
    }

    #[tokio::test]
    async fn test_timed_out_work_keeps_its_worker_slot() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut registry = StrategyRegistry::new(config());
        registry.register(Arc::new(Slow(counter.clone())));

        let run = registry.run(ctx()).await;
        assert_eq!(run.faults.len(), 1);
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert_eq!(registry.semaphore.available_permits(), 3);

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(registry.semaphore.available_permits(), 4);
    }

    #[tokio::test]
    async fn test_invalid_confidence_rejected() {
        let mut registry = StrategyRegistry::new(config());
        registry.register(Arc::new(Fixed { id: "Nan", direction: Some(Direction::Long), confidence: f64::NAN }));

        let run = registry.run(ctx()).await;
        assert!(run.opinions.is_empty());
        assert_eq!(run.faults[0].kind(), "invalid_output");
    }

    #[tokio::test]
    async fn test_consecutive_faults_trip_breaker() {
        let bus = EventBus::new();
        let mut registry = StrategyRegistry::new(config()).with_event_bus(bus);
        registry.register(Arc::new(Panicky));

        for _ in 0..3 {
            registry.run(ctx()).await;
        }
        assert!(!registry.is_enabled("Panicky").await);

        let run = registry.run(ctx()).await;
        assert_eq!(run.skipped_disabled, vec!["Panicky".to_string()]);
        assert!(run.faults.is_empty());

        let report = registry.health_report().await;
        assert_eq!(report[0].disabled_reason, Some(DisableReason::ConsecutiveFaults(3)));

        assert!(registry.enable("Panicky").await);
        assert!(registry.is_enabled("Panicky").await);
    }

    #[tokio::test]
    async fn test_manual_disable_only_once() {
        let registry = StrategyRegistry::with_default_strategies(config());
        assert_eq!(registry.strategy_ids().len(), 6);
        assert!(registry.disable("ZScoreMR", DisableReason::Manual("test".into())).await);
        assert!(!registry.disable("ZScoreMR", DisableReason::Manual("again".into())).await);
        assert_eq!(registry.disabled_strategies().await, vec!["ZScoreMR".to_string()]);
    }
}
