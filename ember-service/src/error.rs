use ember_health::{HealthError, MetricsError, ProbeError, TelemetryError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServiceError {
    /// Configuration could not be loaded
    #[error("Config error: {0}")]
    Config(#[from] figment::Error),
    /// io::Error eg from tokio start or signal registration
    #[error("io::Error: {0}")]
    Io(#[from] std::io::Error),
    /// Web service could not bind
    #[error("Warp error: {0}")]
    Warp(#[from] warp::Error),
    #[error("Health error: {0}")]
    Health(#[from] HealthError),
    #[error("Probe error: {0}")]
    Probe(#[from] ProbeError),
    #[error("Metrics error: {0}")]
    Metrics(#[from] MetricsError),
    #[error("Telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),
    /// Server task did not complete
    #[error("Join error: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[error("Reqwest error: {0}")]
    Reqwest(#[from] reqwest::Error),
    #[error("Url error: {0}")]
    Url(#[from] url::ParseError),
    #[error("Serialise error: {0}")]
    Serialise(#[from] serde_json::Error),
}
