use crate::error::ProbeError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fmt::Debug;
use std::fmt::Display;
use std::time::Duration;

/// This module contains the database reachability probe
pub mod database;
/// This module contains the disk usage probe
pub mod disk;
/// This module contains the kick probe
pub mod kick;
/// This module contains the manual probe
pub mod manual;
/// This module contains the memory threshold probe
pub mod memory;

/// Status of a single probe
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProbeStatus {
    /// Healthy
    Up,
    /// Failed, errored or timed out
    Down,
    /// Succeeded but reported a soft warning
    Degraded,
}

impl Display for ProbeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ProbeStatus::Up => "UP",
            ProbeStatus::Down => "DOWN",
            ProbeStatus::Degraded => "DEGRADED",
        };
        f.write_str(text)
    }
}

/// Scalar value held in the diagnostic detail of a probe
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum Scalar {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl From<bool> for Scalar {
    fn from(value: bool) -> Self {
        Scalar::Bool(value)
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Scalar::Int(value)
    }
}

impl From<u64> for Scalar {
    fn from(value: u64) -> Self {
        i64::try_from(value)
            .map(Scalar::Int)
            .unwrap_or(Scalar::Float(value as f64))
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Scalar::Float(value)
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Scalar::Text(value.to_owned())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Scalar::Text(value)
    }
}

impl Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Bool(v) => write!(f, "{}", v),
            Scalar::Int(v) => write!(f, "{}", v),
            Scalar::Float(v) => write!(f, "{}", v),
            Scalar::Text(v) => write!(f, "{}", v),
        }
    }
}

/// Diagnostic key/values of a probe. Ordered so replies are stable.
pub type Detail = BTreeMap<String, Scalar>;

/// What a probe says about itself when its run completes
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeReport {
    pub status: ProbeStatus,
    pub detail: Detail,
}

impl ProbeReport {
    pub fn up() -> Self {
        Self::with_status(ProbeStatus::Up)
    }

    pub fn down() -> Self {
        Self::with_status(ProbeStatus::Down)
    }

    pub fn degraded() -> Self {
        Self::with_status(ProbeStatus::Degraded)
    }

    pub fn with_status(status: ProbeStatus) -> Self {
        Self {
            status,
            detail: Detail::new(),
        }
    }

    /// Add a diagnostic value to the report
    pub fn detail<K: Into<String>, V: Into<Scalar>>(mut self, key: K, value: V) -> Self {
        self.detail.insert(key.into(), value.into());
        self
    }
}

/// Detail structure for the reply of a single probe within a verdict.
///
/// Built once by the aggregator and never changed afterwards.
#[derive(Serialize, Deserialize, PartialEq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ProbeResult {
    name: String,
    status: ProbeStatus,
    detail: Detail,
    took_millis: u64,
}

impl ProbeResult {
    /// Result of a probe that completed and reported on itself
    pub fn from_report<S: Into<String>>(name: S, report: ProbeReport, took: Duration) -> Self {
        Self {
            name: name.into(),
            status: report.status,
            detail: report.detail,
            took_millis: millis(took),
        }
    }

    /// Result of a probe that did not complete within its timeout
    pub fn timed_out<S: Into<String>>(name: S, took: Duration) -> Self {
        Self::failed(name, "timeout", took)
    }

    /// Result of a probe whose run reported an error
    pub fn failed<S: Into<String>, M: Into<String>>(name: S, message: M, took: Duration) -> Self {
        let mut detail = Detail::new();
        detail.insert("error".to_owned(), Scalar::Text(message.into()));
        Self {
            name: name.into(),
            status: ProbeStatus::Down,
            detail,
            took_millis: millis(took),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn status(&self) -> ProbeStatus {
        self.status
    }

    pub fn detail(&self) -> &Detail {
        &self.detail
    }

    pub fn took_millis(&self) -> u64 {
        self.took_millis
    }

    pub fn is_up(&self) -> bool {
        self.status == ProbeStatus::Up
    }
}

fn millis(took: Duration) -> u64 {
    u64::try_from(took.as_millis()).unwrap_or(u64::MAX)
}

impl fmt::Debug for ProbeResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.name, self.status)
    }
}

impl Display for ProbeResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.name, self.status)
    }
}

/// A unit health check that can be asked, asynchronously, for its report.
///
/// The aggregator bounds every run by [Probe::timeout]. A run that is still
/// pending when that elapses is dropped, so probes must tolerate cancellation
/// at any await point.
#[async_trait]
pub trait Probe: Debug + Sync + Send {
    /// Name of the probe, unique within a registry
    fn name(&self) -> &str;

    /// Upper bound on a single run
    fn timeout(&self) -> Duration;

    /// Run the check once
    async fn run(&self) -> Result<ProbeReport, ProbeError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct AsyncProbe0 {
        name: String,
        status: ProbeStatus,
    }

    #[async_trait]
    impl Probe for AsyncProbe0 {
        fn name(&self) -> &str {
            &self.name
        }

        fn timeout(&self) -> Duration {
            Duration::from_millis(10)
        }

        async fn run(&self) -> Result<ProbeReport, ProbeError> {
            Ok(ProbeReport::with_status(self.status))
        }
    }

    /// Confirm run and name work for a probe behind a dyn
    #[tokio::test]
    async fn test_async_probe() {
        let probe: Box<dyn Probe> = Box::new(AsyncProbe0 {
            name: "test".to_string(),
            status: ProbeStatus::Degraded,
        });
        assert_eq!(probe.name(), "test");
        assert_eq!(probe.run().await.unwrap().status, ProbeStatus::Degraded);
    }

    #[test]
    fn status_serialises_uppercase() {
        assert_eq!(serde_json::to_string(&ProbeStatus::Up).unwrap(), "\"UP\"");
        assert_eq!(
            serde_json::to_string(&ProbeStatus::Degraded).unwrap(),
            "\"DEGRADED\""
        );
    }

    #[test]
    fn result_serialises_camel_case() {
        let report = ProbeReport::up().detail("used", 120u64).detail("unit", "MB");
        let result = ProbeResult::from_report("memory", report, Duration::from_millis(3));

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "name": "memory",
                "status": "UP",
                "detail": {"unit": "MB", "used": 120},
                "tookMillis": 3
            })
        );
    }

    #[test]
    fn timed_out_is_down_with_error() {
        let result = ProbeResult::timed_out("slow", Duration::from_millis(50));
        assert_eq!(result.status(), ProbeStatus::Down);
        assert_eq!(
            result.detail().get("error"),
            Some(&Scalar::Text("timeout".to_string()))
        );
        assert_eq!(result.took_millis(), 50);
        assert_eq!(result.to_string(), "slow/DOWN");
    }

    #[test]
    fn scalar_from_large_u64_falls_back_to_float() {
        assert_eq!(Scalar::from(7u64), Scalar::Int(7));
        assert!(matches!(Scalar::from(u64::MAX), Scalar::Float(_)));
    }
}
