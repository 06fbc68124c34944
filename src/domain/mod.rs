// Market data and regime classification
pub mod market;

// Opinions, consensus results and published signals
pub mod signals;

// Strategy performance records and learned weights
pub mod performance;

// Outbound events
pub mod events;

// Port interfaces
pub mod ports;

// Repository traits
pub mod repositories;

// Domain-specific error types
pub mod errors;
