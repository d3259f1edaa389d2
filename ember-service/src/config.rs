use std::path::Path;

use ember_health::{HealthConfig, TelemetryConfig};
use serde::{Deserialize, Serialize};

use figment::{
    providers::{Env, Format, Yaml},
    Figment,
};

use crate::error::ServiceError;

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub health: HealthConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl Config {
    /// YAML file at `path` overridden by `EMBER_` environment variables,
    /// nested keys separated by `__` (eg `EMBER_HEALTH__NAME`)
    pub fn figment<P: AsRef<Path>>(path: P) -> Figment {
        Figment::new()
            .merge(Yaml::file(path))
            .merge(Env::prefixed("EMBER_").split("__"))
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ServiceError> {
        Ok(Self::figment(path).extract()?)
    }
}
