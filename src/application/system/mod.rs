use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, info, warn};

pub mod pipeline;
pub mod shutdown_service;

pub use pipeline::{CycleOutcome, SignalPipeline};
pub use shutdown_service::ShutdownService;

use crate::application::consensus::ConsensusAggregator;
use crate::application::gate::{BudgetStatus, QualityGate};
use crate::application::learning::FeedbackEngine;
use crate::application::lifecycle::SignalLifecycleTracker;
use crate::application::market_data::FeatureEngineeringService;
use crate::application::regime::RegimeService;
use crate::application::strategies::StrategyRegistry;
use crate::config::Config;
use crate::domain::events::{LoggingListener, PipelineEvent};
use crate::domain::market::Tick;
use crate::domain::ports::MarketDataService;
use crate::domain::repositories::{PerformanceRepository, SignalRepository, WeightRepository};
use crate::domain::signals::{Signal, SignalOutcome};
use crate::infrastructure::event_bus::EventBus;
use crate::infrastructure::mock::MockMarketDataService;
use crate::infrastructure::observability::{
    Metrics, MetricsReporter, PipelineStatus, PipelineStatusSource,
};
use crate::infrastructure::persistence::{
    Database, SqlitePerformanceRepository, SqliteSignalRepository, SqliteWeightRepository,
};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(15);

/// Durable state behind the three repository ports.
#[derive(Clone)]
pub struct Storage {
    pub signal_repository: Arc<dyn SignalRepository>,
    pub performance_repository: Arc<dyn PerformanceRepository>,
    pub weight_repository: Arc<dyn WeightRepository>,
}

impl Storage {
    pub async fn sqlite(db_url: &str) -> Result<Self> {
        info!("Initializing Database at {}", db_url);
        let db = Database::new(db_url)
            .await
            .context("Failed to initialize database")?;
        Ok(Self {
            signal_repository: Arc::new(SqliteSignalRepository::new(db.pool.clone())),
            performance_repository: Arc::new(SqlitePerformanceRepository::new(db.pool.clone())),
            weight_repository: Arc::new(SqliteWeightRepository::new(db.pool.clone())),
        })
    }
}

/// Every pipeline component, wired but not yet running.
pub struct Application {
    pub config: Config,
    pub market_data: Arc<dyn MarketDataService>,
    pub storage: Storage,
    pub event_bus: EventBus,
    pub metrics: Metrics,
    pub registry: Arc<StrategyRegistry>,
    pub regimes: Arc<RegimeService>,
    pub gate: Arc<QualityGate>,
    pub tracker: Arc<SignalLifecycleTracker>,
    pub learning: Arc<FeedbackEngine>,
    pub pipeline: Arc<SignalPipeline>,
    simulator: Option<MockMarketDataService>,
    published_rx: mpsc::Receiver<Signal>,
    outcome_rx: mpsc::Receiver<SignalOutcome>,
}

impl Application {
    /// Server wiring: sqlite storage and the simulated market feed.
    pub async fn build(config: Config) -> Result<Self> {
        info!("Building ignitex pipeline for {:?}...", config.pipeline.symbols);
        let storage = Storage::sqlite(&config.pipeline.database_url).await?;
        let mock = MockMarketDataService::new();
        let mut app = Self::assemble(config, Arc::new(mock.clone()), storage).await?;
        app.simulator = Some(mock);
        Ok(app)
    }

    /// Wires the pipeline around an existing feed and storage.
    pub async fn assemble(
        config: Config,
        market_data: Arc<dyn MarketDataService>,
        storage: Storage,
    ) -> Result<Self> {
        let metrics = Metrics::new()?;
        let event_bus = EventBus::with_listeners(vec![Arc::new(LoggingListener)]);

        let registry = Arc::new(
            StrategyRegistry::with_default_strategies(config.ensemble.clone())
                .with_event_bus(event_bus.clone())
                .with_metrics(metrics.clone()),
        );

        let learning = Arc::new(
            FeedbackEngine::load(
                config.learning.clone(),
                storage.performance_repository.clone(),
                storage.weight_repository.clone(),
                registry.clone(),
                Utc::now(),
            )
            .await
            .context("Failed to restore learning state")?
            .with_metrics(metrics.clone()),
        );

        let regimes = Arc::new(RegimeService::new(
            config.regime.clone(),
            &config.pipeline.symbols,
            market_data.clone(),
            event_bus.clone(),
        ));

        let capacity = config.lifecycle.channel_capacity.max(1);
        let (published_tx, published_rx) = mpsc::channel(capacity);
        let (outcome_tx, outcome_rx) = mpsc::channel(capacity);

        let gate = Arc::new(
            QualityGate::new(
                config.gate.clone(),
                storage.signal_repository.clone(),
                market_data.clone(),
                learning.book_receiver(),
                published_tx,
                event_bus.clone(),
            )
            .with_metrics(metrics.clone()),
        );

        let tracker = Arc::new(
            SignalLifecycleTracker::new(
                storage.signal_repository.clone(),
                market_data.clone(),
                outcome_tx,
                event_bus.clone(),
            )
            .with_metrics(metrics.clone()),
        );

        let pipeline = Arc::new(
            SignalPipeline::new(
                FeatureEngineeringService::default(),
                registry.clone(),
                regimes.clone(),
                ConsensusAggregator::new(config.consensus.clone()),
                learning.weights_receiver(),
                gate.clone(),
                market_data.clone(),
                config.pipeline.candle_lookback,
            )
            .with_metrics(metrics.clone()),
        );

        Ok(Self {
            config,
            market_data,
            storage,
            event_bus,
            metrics,
            registry,
            regimes,
            gate,
            tracker,
            learning,
            pipeline,
            simulator: None,
            published_rx,
            outcome_rx,
        })
    }

    /// Restores durable state and spawns every loop.
    pub async fn start(self) -> Result<SystemHandle> {
        let now = Utc::now();
        let Self {
            config,
            market_data,
            storage,
            event_bus,
            metrics,
            registry,
            regimes,
            gate,
            tracker,
            learning,
            pipeline,
            simulator,
            published_rx,
            outcome_rx,
        } = self;

        info!("Restoring pipeline state...");
        gate.rebuild_from_repository(now)
            .await
            .context("Failed to rebuild publication budget")?;
        tracker
            .resume_from_repository()
            .await
            .context("Failed to resume active signals")?;
        let history = config.learning.breaker_window * registry.strategy_ids().len().max(1);
        let recent = storage
            .signal_repository
            .find_recent(history)
            .await
            .context("Failed to load recent signals")?;
        learning.restore_breaker_windows(&recent).await;

        let shutdown = Arc::new(ShutdownService::new(gate.clone(), SHUTDOWN_GRACE));
        let mut simulation = None;

        if let Some(mock) = &simulator {
            let history = config.pipeline.candle_lookback * 2;
            simulation = Some(
                mock.start_simulation(
                    config.pipeline.symbols.clone(),
                    config.pipeline.mock_seed,
                    Duration::from_millis(config.pipeline.mock_tick_interval_ms.max(1)),
                    history,
                )
                .await,
            );
        }

        regimes.refresh_all(Utc::now()).await;

        // Lifecycle tracker
        shutdown
            .register(tokio::spawn(tracker.clone().run(
                published_rx,
                Duration::from_secs(config.lifecycle.heartbeat_interval_secs.max(1)),
                shutdown.subscribe(),
            )))
            .await;

        // Learning feedback
        shutdown
            .register(tokio::spawn(
                learning.clone().run(outcome_rx, shutdown.subscribe()),
            ))
            .await;

        // Regime re-evaluation timer
        shutdown
            .register(tokio::spawn(regime_timer(
                regimes.clone(),
                Duration::from_secs(config.regime.reevaluation_interval_secs.max(1)),
                shutdown.subscribe(),
            )))
            .await;

        // Near-miss queue flush timer
        shutdown
            .register(tokio::spawn(flush_timer(
                gate.clone(),
                Duration::from_secs(config.gate.flush_interval_secs.max(1)),
                shutdown.subscribe(),
            )))
            .await;

        // One worker per symbol, fed by the tick router
        let tick_rx = market_data
            .subscribe(config.pipeline.symbols.clone())
            .await
            .context("Failed to subscribe to market data")?;
        let mut workers = HashMap::new();
        for symbol in &config.pipeline.symbols {
            let (tx, rx) = mpsc::channel(config.pipeline.tick_channel_capacity.max(1));
            workers.insert(symbol.clone(), tx);
            shutdown
                .register(tokio::spawn(symbol_worker(
                    symbol.clone(),
                    pipeline.clone(),
                    rx,
                    Duration::from_millis(config.pipeline.min_cycle_interval_ms),
                    shutdown.subscribe(),
                )))
                .await;
        }
        shutdown
            .register(tokio::spawn(route_ticks(
                tick_rx,
                workers,
                shutdown.subscribe(),
            )))
            .await;

        let status = Arc::new(StatusSource {
            gate: gate.clone(),
            tracker: tracker.clone(),
            learning: learning.clone(),
            registry: registry.clone(),
            regimes: regimes.clone(),
        });

        if config.observability.enabled {
            let reporter = MetricsReporter::new(
                status.clone(),
                metrics.clone(),
                config.observability.report_interval_secs,
            );
            shutdown
                .register(tokio::spawn(reporter.run(shutdown.subscribe())))
                .await;
        }

        info!(
            "Pipeline started: {} symbols, {} strategies",
            config.pipeline.symbols.len(),
            registry.strategy_ids().len()
        );

        Ok(SystemHandle {
            shutdown,
            status,
            gate,
            tracker,
            learning,
            registry,
            regimes,
            metrics,
            event_bus,
            simulation,
        })
    }
}

/// Running pipeline.
pub struct SystemHandle {
    pub shutdown: Arc<ShutdownService>,
    status: Arc<StatusSource>,
    pub gate: Arc<QualityGate>,
    pub tracker: Arc<SignalLifecycleTracker>,
    pub learning: Arc<FeedbackEngine>,
    pub registry: Arc<StrategyRegistry>,
    pub regimes: Arc<RegimeService>,
    pub metrics: Metrics,
    event_bus: EventBus,
    simulation: Option<tokio::task::JoinHandle<()>>,
}

impl SystemHandle {
    /// Live stream of pipeline events from this point on.
    pub fn events(&self) -> broadcast::Receiver<PipelineEvent> {
        self.event_bus.subscribe()
    }

    pub async fn budget_status(&self) -> BudgetStatus {
        self.gate.budget_status(Utc::now()).await
    }

    pub async fn status(&self) -> PipelineStatus {
        self.status.pipeline_status().await
    }

    /// Stops the feed, then every loop.
    pub async fn shutdown(self) {
        if let Some(simulation) = &self.simulation {
            simulation.abort();
        }
        self.shutdown.shutdown().await;
    }
}

struct StatusSource {
    gate: Arc<QualityGate>,
    tracker: Arc<SignalLifecycleTracker>,
    learning: Arc<FeedbackEngine>,
    registry: Arc<StrategyRegistry>,
    regimes: Arc<RegimeService>,
}

#[async_trait]
impl PipelineStatusSource for StatusSource {
    async fn pipeline_status(&self) -> PipelineStatus {
        let now = Utc::now();
        let budget = self.gate.budget_status(now).await;
        let weights = self.learning.current_weights();

        PipelineStatus {
            published_today: budget.published_today,
            remaining_today: budget.remaining,
            queue_size: budget.queue_size,
            next_eligible_at: budget.next_eligible_at.map(|t| t.to_rfc3339()),
            active_signals: self.tracker.active_count().await,
            weights: weights
                .vector
                .weights
                .iter()
                .map(|(k, v)| (k.clone(), *v))
                .collect(),
            weight_version: weights.vector.version,
            disabled_strategies: self.registry.disabled_strategies().await,
            regimes: self.regimes.labels(now).into_iter().collect::<BTreeMap<_, _>>(),
        }
    }
}

async fn route_ticks(
    mut tick_rx: mpsc::Receiver<Tick>,
    workers: HashMap<String, mpsc::Sender<Tick>>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            maybe = tick_rx.recv() => {
                let Some(tick) = maybe else {
                    warn!("TickRouter: market data stream closed");
                    break;
                };
                let Some(tx) = workers.get(&tick.symbol) else {
                    continue;
                };
                if let Err(mpsc::error::TrySendError::Full(tick)) = tx.try_send(tick) {
                    debug!("TickRouter [{}]: worker busy, tick dropped", tick.symbol);
                }
            }
            _ = shutdown.changed() => break,
        }
    }
}

/// Serial cycles for one symbol. Queued ticks collapse to the newest one,
/// and cycles closer than `min_interval` are skipped.
async fn symbol_worker(
    symbol: String,
    pipeline: Arc<SignalPipeline>,
    mut rx: mpsc::Receiver<Tick>,
    min_interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut last_cycle: Option<Instant> = None;
    loop {
        tokio::select! {
            maybe = rx.recv() => {
                let Some(mut tick) = maybe else { break };
                while let Ok(newer) = rx.try_recv() {
                    tick = newer;
                }
                if let Some(at) = last_cycle
                    && at.elapsed() < min_interval
                {
                    continue;
                }
                last_cycle = Some(Instant::now());
                let outcome = pipeline.process_tick(tick, Utc::now()).await;
                debug!("SymbolWorker [{}]: {:?}", symbol, outcome);
            }
            _ = shutdown.changed() => break,
        }
    }
    debug!("SymbolWorker [{}]: stopped", symbol);
}

async fn regime_timer(
    regimes: Arc<RegimeService>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = interval.tick() => regimes.refresh_all(Utc::now()).await,
            _ = shutdown.changed() => break,
        }
    }
}

async fn flush_timer(gate: Arc<QualityGate>, period: Duration, mut shutdown: watch::Receiver<bool>) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = interval.tick() => {
                if let Some(signal) = gate.flush(Utc::now()).await {
                    debug!("FlushTimer [{}]: queued candidate published", signal.symbol);
                }
            }
            _ = shutdown.changed() => break,
        }
    }
}
