pub mod records;
pub mod weights;

pub use records::{PerformanceBook, StrategyPerformanceRecord};
pub use weights::{WeightSnapshot, WeightVector};
