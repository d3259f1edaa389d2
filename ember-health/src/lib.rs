//! Health probe aggregation and metrics exposition
//!
//! Probes are registered in a [ProbeRegistry], run together by a
//! [HealthAggregator] into a [HealthVerdict], and served with the
//! [MetricsRegistry] exposition through framework independent adapters.

pub mod adapter;
pub mod aggregator;
pub mod config;
pub mod error;
pub mod metrics;
pub mod probe;
pub mod registry;
pub mod telemetry;
pub mod trace;
#[cfg(feature = "warp")]
pub mod webservice;

pub use adapter::{HealthEndpointAdapter, MetricsEndpointAdapter, Reply};
pub use aggregator::{HealthAggregator, HealthVerdict, Overall};
pub use config::{HealthConfig, TelemetryConfig};
pub use error::{HealthError, MetricsError, ProbeError, TelemetryError};
pub use metrics::{DefaultMetrics, MetricsRegistry, ProcessDefaults};
pub use probe::{Probe, ProbeReport, ProbeResult, ProbeStatus};
pub use registry::ProbeRegistry;

/// Name of the Crate
pub const NAME: &str = env!("CARGO_PKG_NAME");
/// Version of the Crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
