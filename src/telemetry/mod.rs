//! Live VM usage sampling and the append-only metrics writer.

pub mod collector;
pub mod vm_metrics;

pub use collector::MetricsCollector;
pub use vm_metrics::VmMetrics;
