//! Observability configuration parsing from environment variables.

use super::env::{parse_bool, parse_u64};
use anyhow::Result;

/// Observability environment configuration
#[derive(Debug, Clone)]
pub struct ObservabilityEnvConfig {
    pub enabled: bool,
    pub report_interval_secs: u64,
}

impl Default for ObservabilityEnvConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            report_interval_secs: 60,
        }
    }
}

impl ObservabilityEnvConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            enabled: parse_bool("OBSERVABILITY_ENABLED", true),
            report_interval_secs: parse_u64("METRICS_REPORT_INTERVAL_SECS", 60)?.max(1),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_observability_config_defaults() {
        let config = ObservabilityEnvConfig::from_env().unwrap();
        assert!(config.enabled);
        assert_eq!(config.report_interval_secs, 60);
    }
}
