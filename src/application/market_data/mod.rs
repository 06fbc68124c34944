pub mod feature_engineering;
pub mod indicators;

pub use feature_engineering::{AnalysisContext, FeatureConfig, FeatureEngineeringService};
