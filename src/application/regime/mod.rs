pub mod detector;
pub mod regime_service;

pub use detector::{MarketRegimeDetector, RegimeReadings};
pub use regime_service::RegimeService;
