//! Push-based metrics reporter for ignitex
//!
//! Periodically outputs pipeline status as structured JSON to stdout.
//!
//! **Security**: This system only SENDS data, never accepts requests.

use crate::infrastructure::observability::metrics::Metrics;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{info, warn};

/// Pipeline state exposed to the reporter.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineStatus {
    pub published_today: u32,
    pub remaining_today: u32,
    pub queue_size: usize,
    pub next_eligible_at: Option<String>,
    pub active_signals: usize,
    pub weights: BTreeMap<String, f64>,
    pub weight_version: u64,
    pub disabled_strategies: Vec<String>,
    pub regimes: BTreeMap<String, String>,
}

/// Anything that can describe the running pipeline.
#[async_trait]
pub trait PipelineStatusSource: Send + Sync {
    async fn pipeline_status(&self) -> PipelineStatus;
}

/// Metrics snapshot for JSON output
#[derive(Serialize)]
pub struct MetricsSnapshot {
    pub timestamp: String,
    pub uptime_seconds: u64,
    pub version: String,
    pub pipeline: PipelineStatus,
}

/// Push-based metrics reporter
///
/// Outputs metrics as structured JSON logs on a configurable interval.
/// No HTTP server, no incoming connections - only outbound data.
pub struct MetricsReporter {
    source: Arc<dyn PipelineStatusSource>,
    metrics: Metrics,
    start_time: Instant,
    interval: Duration,
}

impl MetricsReporter {
    pub fn new(source: Arc<dyn PipelineStatusSource>, metrics: Metrics, interval_seconds: u64) -> Self {
        Self {
            source,
            metrics,
            start_time: Instant::now(),
            interval: Duration::from_secs(interval_seconds.max(1)),
        }
    }

    /// Run the reporter until shutdown is signalled
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            "MetricsReporter: Starting push-based metrics (interval: {:?})",
            self.interval
        );

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = shutdown.changed() => {
                    info!("MetricsReporter: shutting down");
                    return;
                }
            }

            let snapshot = self.collect_snapshot().await;
            match serde_json::to_string(&snapshot) {
                Ok(json) => {
                    // Prefix so log shippers can filter the lines
                    println!("METRICS_JSON:{}", json);
                    info!(
                        "Published today: {} | Remaining: {} | Queue: {} | Active: {} | Uptime: {}s",
                        snapshot.pipeline.published_today,
                        snapshot.pipeline.remaining_today,
                        snapshot.pipeline.queue_size,
                        snapshot.pipeline.active_signals,
                        snapshot.uptime_seconds
                    );
                }
                Err(e) => warn!("Failed to serialize metrics: {}", e),
            }
        }
    }

    /// Collect current metrics snapshot
    async fn collect_snapshot(&self) -> MetricsSnapshot {
        let status = self.source.pipeline_status().await;
        let uptime = self.start_time.elapsed().as_secs();

        self.metrics.uptime_seconds.set(uptime as f64);
        self.metrics.queue_size.set(status.queue_size as f64);
        self.metrics.active_signals.set(status.active_signals as f64);
        self.metrics.published_today.set(status.published_today as f64);
        for (strategy, weight) in &status.weights {
            self.metrics.set_strategy_weight(strategy, *weight);
        }

        MetricsSnapshot {
            timestamp: chrono::Utc::now().to_rfc3339(),
            uptime_seconds: uptime,
            version: env!("CARGO_PKG_VERSION").to_string(),
            pipeline: status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedSource;

    #[async_trait]
    impl PipelineStatusSource for FixedSource {
        async fn pipeline_status(&self) -> PipelineStatus {
            PipelineStatus {
                published_today: 3,
                remaining_today: 5,
                queue_size: 2,
                active_signals: 1,
                weights: BTreeMap::from([("TrendAlignment".to_string(), 0.25)]),
                ..PipelineStatus::default()
            }
        }
    }

    #[tokio::test]
    async fn test_metrics_snapshot_collection() {
        let metrics = Metrics::new().expect("Failed to create metrics");
        let reporter = MetricsReporter::new(Arc::new(FixedSource), metrics.clone(), 60);

        let snapshot = reporter.collect_snapshot().await;
        assert_eq!(snapshot.pipeline.published_today, 3);
        assert!(!snapshot.timestamp.is_empty());
        assert_eq!(metrics.queue_size.get(), 2.0);

        let json = serde_json::to_string(&snapshot).expect("Failed to serialize");
        assert!(json.contains("TrendAlignment"));
    }
}
