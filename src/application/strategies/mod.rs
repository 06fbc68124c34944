pub mod bollinger_breakout;
pub mod registry;
pub mod rsi_reversal;
pub mod statistical;
pub mod traits;
pub mod trend_alignment;
pub mod volume_surge;

pub use registry::{DisableReason, EnsembleRun, StrategyHealth, StrategyRegistry};
pub use traits::SignalStrategy;
