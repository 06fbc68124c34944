// Strategy ensemble and its circuit breakers
pub mod strategies;

// Feature engineering over candle history
pub mod market_data;

// Market regime detection
pub mod regime;

// Weighted consensus
pub mod consensus;

// Quality gate and publication budget
pub mod gate;

// Signal outcome tracking
pub mod lifecycle;

// Feedback-driven reweighting
pub mod learning;

// System orchestrator
pub mod system;
