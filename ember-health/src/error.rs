//! describe errors in Ember

use thiserror::Error;

/// Error reported by a probe while it runs.
///
/// These never cross the aggregator boundary: the aggregator turns them into
/// a DOWN [crate::probe::ProbeResult] carrying the display text as `error`.
#[derive(Error, Debug)]
pub enum ProbeError {
    /// A standard error with configurable message
    #[error("{0}")]
    Message(String),
    /// Error while reading a resource the probe depends on
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// The platform cannot provide what the probe measures
    #[error("unsupported: {0}")]
    Unsupported(String),
}

/// Systemic failure of a whole aggregation pass.
///
/// Distinct from a DOWN verdict. Probe level problems never produce this.
#[derive(Error, Debug)]
pub enum HealthError {
    /// No async runtime is available to schedule probes on
    #[error("no runtime available to schedule probes: {0}")]
    NoRuntime(#[from] tokio::runtime::TryCurrentError),
    /// Verdict could not be serialised for the reply
    #[error("serialise verdict")]
    Serialise(#[from] serde_json::Error),
}

/// Errors from the metrics registry
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Registration or lookup rejected by prometheus
    #[error("prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),
    /// A family exists under this name with another type or label set
    #[error("metric `{name}` already registered with a different type or labels")]
    LabelMismatch { name: String },
    /// Text exposition produced invalid utf8
    #[error("encode metrics: {0}")]
    Encode(#[from] std::string::FromUtf8Error),
}

/// Errors from the process wide telemetry lifecycle
#[derive(Error, Debug, PartialEq, Eq)]
pub enum TelemetryError {
    #[error("telemetry already initialised")]
    AlreadyInitialised,
    #[error("telemetry not initialised")]
    NotInitialised,
}
