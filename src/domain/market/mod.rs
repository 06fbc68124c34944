pub mod market_regime;
pub mod types;

pub use market_regime::{RegimeProfile, RegimeState, RegimeType};
pub use types::{Candle, Tick};
