pub mod consensus;
pub mod opinion;
pub mod signal;
pub mod strategy_ids;

pub use consensus::{
    ConsensusDecision, ConsensusResult, Contribution, NoConsensus, QualityTier, TierThresholds,
};
pub use opinion::{Direction, StrategyOpinion};
pub use signal::{Signal, SignalCompletion, SignalOutcome, SignalStatus};
