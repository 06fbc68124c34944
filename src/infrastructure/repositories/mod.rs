mod in_memory;

pub use in_memory::{InMemoryPerformanceRepository, InMemorySignalRepository, InMemoryWeightRepository};
