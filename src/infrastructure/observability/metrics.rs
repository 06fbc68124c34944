//! Prometheus metrics definitions for ignitex
//!
//! All metrics use the `ignitex_` prefix and are read-only.

use prometheus::{
    CounterVec, Gauge, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
    core::{AtomicF64, GenericGauge, GenericGaugeVec},
};
use std::sync::Arc;

/// Prometheus metrics for the signal pipeline
#[derive(Clone)]
pub struct Metrics {
    registry: Arc<Registry>,
    /// Evaluation cycles per symbol
    pub cycles_total: CounterVec,
    /// Cycles that ended without a consensus direction
    pub consensus_misses_total: CounterVec,
    /// Quality gate decisions by decision and reason
    pub gate_decisions_total: CounterVec,
    /// Published signals by symbol and tier
    pub signals_published_total: CounterVec,
    /// Terminal outcomes by status
    pub signal_outcomes_total: CounterVec,
    /// Strategy faults by strategy and kind
    pub strategy_faults_total: CounterVec,
    /// Near-miss queue size
    pub queue_size: GenericGauge<AtomicF64>,
    /// Signals currently ACTIVE
    pub active_signals: GenericGauge<AtomicF64>,
    /// Signals published in the current UTC day
    pub published_today: GenericGauge<AtomicF64>,
    /// Learned weight per strategy
    pub strategy_weight: GenericGaugeVec<AtomicF64>,
    /// Ensemble run duration in seconds
    pub ensemble_duration_seconds: HistogramVec,
    /// Uptime in seconds
    pub uptime_seconds: GenericGauge<AtomicF64>,
}

impl Metrics {
    /// Create a new Metrics instance with all gauges and counters registered
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let cycles_total = CounterVec::new(
            Opts::new("ignitex_cycles_total", "Evaluation cycles per symbol"),
            &["symbol"],
        )?;
        registry.register(Box::new(cycles_total.clone()))?;

        let consensus_misses_total = CounterVec::new(
            Opts::new(
                "ignitex_consensus_misses_total",
                "Cycles without a consensus direction",
            ),
            &["symbol"],
        )?;
        registry.register(Box::new(consensus_misses_total.clone()))?;

        let gate_decisions_total = CounterVec::new(
            Opts::new(
                "ignitex_gate_decisions_total",
                "Quality gate decisions by decision and reason",
            ),
            &["decision", "reason"],
        )?;
        registry.register(Box::new(gate_decisions_total.clone()))?;

        let signals_published_total = CounterVec::new(
            Opts::new("ignitex_signals_published_total", "Published signals"),
            &["symbol", "tier"],
        )?;
        registry.register(Box::new(signals_published_total.clone()))?;

        let signal_outcomes_total = CounterVec::new(
            Opts::new("ignitex_signal_outcomes_total", "Terminal signal outcomes"),
            &["status"],
        )?;
        registry.register(Box::new(signal_outcomes_total.clone()))?;

        let strategy_faults_total = CounterVec::new(
            Opts::new("ignitex_strategy_faults_total", "Strategy evaluation faults"),
            &["strategy", "kind"],
        )?;
        registry.register(Box::new(strategy_faults_total.clone()))?;

        let queue_size = Gauge::with_opts(Opts::new(
            "ignitex_queue_size",
            "Candidates waiting in the near-miss queue",
        ))?;
        registry.register(Box::new(queue_size.clone()))?;

        let active_signals = Gauge::with_opts(Opts::new(
            "ignitex_active_signals",
            "Signals currently tracked as ACTIVE",
        ))?;
        registry.register(Box::new(active_signals.clone()))?;

        let published_today = Gauge::with_opts(Opts::new(
            "ignitex_published_today",
            "Signals published in the current UTC day",
        ))?;
        registry.register(Box::new(published_today.clone()))?;

        let strategy_weight = GaugeVec::new(
            Opts::new("ignitex_strategy_weight", "Learned consensus weight"),
            &["strategy"],
        )?;
        registry.register(Box::new(strategy_weight.clone()))?;

        let ensemble_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "ignitex_ensemble_duration_seconds",
                "Wall time of one ensemble run",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0]),
            &["symbol"],
        )?;
        registry.register(Box::new(ensemble_duration_seconds.clone()))?;

        let uptime_seconds =
            Gauge::with_opts(Opts::new("ignitex_uptime_seconds", "Process uptime"))?;
        registry.register(Box::new(uptime_seconds.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            cycles_total,
            consensus_misses_total,
            gate_decisions_total,
            signals_published_total,
            signal_outcomes_total,
            strategy_faults_total,
            queue_size,
            active_signals,
            published_today,
            strategy_weight,
            ensemble_duration_seconds,
            uptime_seconds,
        })
    }

    /// Render all metrics in Prometheus text format
    pub fn render(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        encoder
            .encode_to_string(&metric_families)
            .unwrap_or_default()
    }

    pub fn inc_cycle(&self, symbol: &str) {
        self.cycles_total.with_label_values(&[symbol]).inc();
    }

    pub fn inc_consensus_miss(&self, symbol: &str) {
        self.consensus_misses_total.with_label_values(&[symbol]).inc();
    }

    pub fn inc_gate_decision(&self, decision: &str, reason: &str) {
        self.gate_decisions_total
            .with_label_values(&[decision, reason])
            .inc();
    }

    pub fn inc_published(&self, symbol: &str, tier: &str) {
        self.signals_published_total
            .with_label_values(&[symbol, tier])
            .inc();
    }

    pub fn inc_outcome(&self, status: &str) {
        self.signal_outcomes_total.with_label_values(&[status]).inc();
    }

    pub fn inc_strategy_fault(&self, strategy: &str, kind: &str) {
        self.strategy_faults_total
            .with_label_values(&[strategy, kind])
            .inc();
    }

    pub fn set_strategy_weight(&self, strategy: &str, weight: f64) {
        self.strategy_weight.with_label_values(&[strategy]).set(weight);
    }

    pub fn observe_ensemble(&self, symbol: &str, seconds: f64) {
        self.ensemble_duration_seconds
            .with_label_values(&[symbol])
            .observe(seconds);
    }
}
