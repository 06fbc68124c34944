pub mod event_bus;
pub mod mock;
pub mod observability;
pub mod persistence;
pub mod repositories;

pub use event_bus::EventBus;
pub use mock::MockMarketDataService;
pub use repositories::{
    InMemoryPerformanceRepository, InMemorySignalRepository, InMemoryWeightRepository,
};
