//! Configuration module for ignitex.
//!
//! Structured configuration loading from environment variables, organized
//! by pipeline stage: Pipeline, Ensemble, Regime, Consensus, QualityGate,
//! Lifecycle, Learning and Observability.

mod consensus_config;
mod ensemble_config;
mod env;
mod learning_config;
mod lifecycle_config;
mod observability_config;
mod pipeline_config;
mod quality_gate_config;
mod regime_config;

pub use consensus_config::ConsensusConfig;
pub use ensemble_config::EnsembleConfig;
pub use learning_config::LearningConfig;
pub use lifecycle_config::LifecycleConfig;
pub use observability_config::ObservabilityEnvConfig;
pub use pipeline_config::PipelineEnvConfig;
pub use quality_gate_config::{FactorWeights, QualityGateConfig};
pub use regime_config::RegimeConfig;

use crate::domain::signals::strategy_ids;
use anyhow::{Context, Result};

/// Main application configuration.
///
/// Aggregates every sub-config. `Default` gives the documented defaults
/// without touching the environment (used by tests).
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub pipeline: PipelineEnvConfig,
    pub ensemble: EnsembleConfig,
    pub regime: RegimeConfig,
    pub consensus: ConsensusConfig,
    pub gate: QualityGateConfig,
    pub lifecycle: LifecycleConfig,
    pub learning: LearningConfig,
    pub observability: ObservabilityEnvConfig,
}

impl Config {
    /// Loads every sub-config from the environment and validates the result.
    pub fn from_env() -> Result<Self> {
        let config = Self {
            pipeline: PipelineEnvConfig::from_env().context("Failed to load pipeline config")?,
            ensemble: EnsembleConfig::from_env().context("Failed to load ensemble config")?,
            regime: RegimeConfig::from_env().context("Failed to load regime config")?,
            consensus: ConsensusConfig::from_env().context("Failed to load consensus config")?,
            gate: QualityGateConfig::from_env().context("Failed to load quality gate config")?,
            lifecycle: LifecycleConfig::from_env().context("Failed to load lifecycle config")?,
            learning: LearningConfig::from_env().context("Failed to load learning config")?,
            observability: ObservabilityEnvConfig::from_env()
                .context("Failed to load observability config")?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.pipeline.symbols.is_empty() {
            anyhow::bail!("SYMBOLS must name at least one instrument");
        }
        self.gate
            .validate()
            .context("Invalid quality gate configuration")?;
        self.learning
            .validate(strategy_ids::ALL.len())
            .context("Invalid learning configuration")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_validates() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.gate.queue_capacity, 10);
        assert_eq!(config.ensemble.max_consecutive_faults, 5);
        assert_eq!(config.learning.min_samples, 5);
    }

    #[test]
    fn test_empty_symbol_list_rejected() {
        let mut config = Config::default();
        config.pipeline.symbols.clear();
        assert!(config.validate().is_err());
    }
}
