pub mod aggregator;

pub use aggregator::ConsensusAggregator;
