//! Push-based observability for ignitex
//!
//! Observability through **outbound data only**: no HTTP server, no
//! incoming requests. A prometheus registry is kept in-process and a
//! reporter pushes periodic JSON snapshots to stdout.

pub mod metrics;
pub mod reporter;

pub use metrics::Metrics;
pub use reporter::{MetricsReporter, PipelineStatus, PipelineStatusSource};
