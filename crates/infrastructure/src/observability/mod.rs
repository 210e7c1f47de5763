pub mod metrics_collector;
pub mod telemetry_setup;

pub use metrics_collector::MetricsCollector;
pub use telemetry_setup::{init_logging, init_metrics};
