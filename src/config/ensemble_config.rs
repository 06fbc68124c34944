//! Strategy ensemble execution and circuit breaker settings.

use super::env::{parse_f64, parse_u32, parse_u64, parse_usize};
use anyhow::Result;

#[derive(Debug, Clone)]
pub struct EnsembleConfig {
    pub strategy_timeout_ms: u64,
    /// Maximum strategies evaluated concurrently
    pub worker_pool_size: usize,
    pub max_consecutive_faults: u32,
    /// Fault rate (0-1) over the rolling window that trips the breaker
    pub fault_rate_threshold: f64,
    pub fault_window: usize,
    /// Runs required in the window before the fault rate is trusted
    pub min_window_runs: usize,
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        Self {
            strategy_timeout_ms: 250,
            worker_pool_size: 4,
            max_consecutive_faults: 5,
            fault_rate_threshold: 0.8,
            fault_window: 20,
            min_window_runs: 10,
        }
    }
}

impl EnsembleConfig {
    pub fn from_env() -> Result<Self> {
        let d = Self::default();
        Ok(Self {
            strategy_timeout_ms: parse_u64("STRATEGY_TIMEOUT_MS", d.strategy_timeout_ms)?,
            worker_pool_size: parse_usize("STRATEGY_WORKERS", d.worker_pool_size)?.max(1),
            max_consecutive_faults: parse_u32("STRATEGY_MAX_CONSECUTIVE_FAULTS", d.max_consecutive_faults)?,
            fault_rate_threshold: parse_f64("STRATEGY_FAULT_RATE_THRESHOLD", d.fault_rate_threshold)?,
            fault_window: parse_usize("STRATEGY_FAULT_WINDOW", d.fault_window)?.max(1),
            min_window_runs: parse_usize("STRATEGY_MIN_WINDOW_RUNS", d.min_window_runs)?,
        })
    }
}
