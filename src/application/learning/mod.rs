pub mod feedback_engine;
pub mod weight_optimizer;

pub use feedback_engine::FeedbackEngine;
pub use weight_optimizer::WeightOptimizer;
