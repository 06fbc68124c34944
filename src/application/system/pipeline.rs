//! One evaluation cycle for one symbol.
//!
//! tick -> features -> ensemble -> regime -> weighted consensus -> gate.
//! Cycles of the same symbol never overlap: each symbol is driven by its
//! own worker (see `Application::start`).

use crate::application::consensus::ConsensusAggregator;
use crate::application::gate::{Candidate, GateDecision, QualityGate};
use crate::application::market_data::FeatureEngineeringService;
use crate::application::regime::RegimeService;
use crate::application::strategies::StrategyRegistry;
use crate::domain::market::Tick;
use crate::domain::performance::WeightSnapshot;
use crate::domain::ports::MarketDataService;
use crate::domain::signals::{ConsensusDecision, NoConsensus};
use crate::infrastructure::observability::Metrics;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// How a cycle ended.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// The cycle did not run (shutdown, no candles)
    Skipped(String),
    NoConsensus(NoConsensus),
    Gate(GateDecision),
}

pub struct SignalPipeline {
    features: FeatureEngineeringService,
    registry: Arc<StrategyRegistry>,
    regimes: Arc<RegimeService>,
    aggregator: ConsensusAggregator,
    weights: watch::Receiver<Arc<WeightSnapshot>>,
    gate: Arc<QualityGate>,
    market_data: Arc<dyn MarketDataService>,
    candle_lookback: usize,
    metrics: Option<Metrics>,
}

impl SignalPipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        features: FeatureEngineeringService,
        registry: Arc<StrategyRegistry>,
        regimes: Arc<RegimeService>,
        aggregator: ConsensusAggregator,
        weights: watch::Receiver<Arc<WeightSnapshot>>,
        gate: Arc<QualityGate>,
        market_data: Arc<dyn MarketDataService>,
        candle_lookback: usize,
    ) -> Self {
        Self {
            features,
            registry,
            regimes,
            aggregator,
            weights,
            gate,
            market_data,
            candle_lookback,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub async fn process_tick(&self, tick: Tick, now: DateTime<Utc>) -> CycleOutcome {
        let symbol = tick.symbol.clone();
        if self.gate.is_shutting_down() {
            return CycleOutcome::Skipped("shutting down".to_string());
        }
        if let Some(metrics) = &self.metrics {
            metrics.inc_cycle(&symbol);
        }

        let lookback = self.candle_lookback.max(self.features.warmup_candles());
        let candles = match self.market_data.get_candles(&symbol, lookback).await {
            Ok(candles) if !candles.is_empty() => candles,
            Ok(_) => return CycleOutcome::Skipped("no candle history".to_string()),
            Err(e) => {
                warn!("SignalPipeline [{}]: candle fetch failed: {:#}", symbol, e);
                return CycleOutcome::Skipped("candle fetch failed".to_string());
            }
        };

        // Rate-limited inside the service; a failure keeps the previous state
        if let Err(e) = self.regimes.refresh(&symbol, now).await {
            warn!("SignalPipeline [{}]: regime refresh failed: {:#}", symbol, e);
        }
        let regime = self.regimes.current(&symbol, now);

        let ctx = Arc::new(self.features.build(&tick, candles));
        let run = self.registry.run(ctx.clone()).await;
        debug!(
            "SignalPipeline [{}]: {} opinions, {} faults, {} disabled in {:?}",
            symbol,
            run.opinions.len(),
            run.faults.len(),
            run.skipped_disabled.len(),
            run.elapsed
        );

        let weights = self.weights.borrow().clone();
        let consensus = match self
            .aggregator
            .aggregate(&symbol, &run.opinions, &weights.vector, &regime)
        {
            ConsensusDecision::Reached(result) => result,
            ConsensusDecision::NotReached(miss) => {
                info!("SignalPipeline [{}]: no consensus: {}", symbol, miss);
                if let Some(metrics) = &self.metrics {
                    metrics.inc_consensus_miss(&symbol);
                }
                return CycleOutcome::NoConsensus(miss);
            }
        };

        let candidate = Candidate {
            consensus,
            regime,
            price: tick.price,
            atr: ctx.atr,
            atr_pct: ctx.atr_pct(),
            evaluated_at: now,
        };
        CycleOutcome::Gate(self.gate.evaluate(candidate).await)
    }
}
