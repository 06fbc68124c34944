mod performance_repository;
mod signal_repository;
mod weight_repository;

pub use performance_repository::SqlitePerformanceRepository;
pub use signal_repository::SqliteSignalRepository;
pub use weight_repository::SqliteWeightRepository;
