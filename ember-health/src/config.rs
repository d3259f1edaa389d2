use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

use crate::error::ProbeError;
use crate::probe::{database::DatabaseProbe, disk::DiskProbe, memory::MemoryProbe};
use crate::registry::ProbeRegistry;

#[serde_as]
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(default)]
pub struct HealthConfig {
    /// Hostname to start the webservice on
    /// This allows chainging to localhost for dev and 0.0.0.0 or specific address for deployment
    pub address: SocketAddr,
    /// Name for the service
    pub name: String,
    /// Resident memory above which the memory probe goes DOWN
    pub heap_threshold_bytes: u64,
    /// Used fraction (0.0 to 1.0) of the disk above which the disk probe goes DOWN
    pub disk_threshold_percent: f64,
    /// Path whose filesystem the disk probe measures
    pub disk_path: PathBuf,
    /// Database to check for reachability. No database probe without it.
    pub database_url: Option<Url>,
    #[serde(rename = "db_ping_timeout_millis")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub db_ping_timeout: Duration,
    /// Timeout for the memory and disk probes
    #[serde(rename = "probe_timeout_millis")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub probe_timeout: Duration,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            address: SocketAddr::from(([0, 0, 0, 0], 8079)),
            name: "ember".to_string(),
            heap_threshold_bytes: 150 * 1024 * 1024,
            disk_threshold_percent: 0.5,
            disk_path: PathBuf::from("/"),
            database_url: None,
            db_ping_timeout: Duration::from_millis(300),
            probe_timeout: Duration::from_millis(1000),
        }
    }
}

impl HealthConfig {
    /// Register the memory, disk and (when configured) database probes
    pub fn register_probes(&self, registry: &ProbeRegistry) -> Result<(), ProbeError> {
        registry.register(MemoryProbe::new(
            "memory_heap",
            self.heap_threshold_bytes,
            self.probe_timeout,
        ));
        registry.register(DiskProbe::new(
            "disk_storage",
            self.disk_path.clone(),
            self.disk_threshold_percent,
            self.probe_timeout,
        ));
        if let Some(url) = &self.database_url {
            registry.register(DatabaseProbe::new("database", url, self.db_ping_timeout)?);
        }
        Ok(())
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Emit spans. When false the tracer is a noop.
    pub enabled: bool,
    pub service_name: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            service_name: "ember".to_string(),
        }
    }
}
