use super::{Probe, ProbeReport};
use crate::error::ProbeError;
use async_trait::async_trait;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// A health check that automatically fails when the timer has not been reset before
/// the duration. Equivalent of a dead mans handle.
#[derive(Debug, Clone)]
pub struct KickProbe {
    name: String,
    latest: Arc<Mutex<Instant>>,
    margin: Duration,
    timeout: Duration,
}

impl KickProbe {
    pub fn new<S: Into<String>>(name: S, margin: Duration) -> Self {
        Self {
            name: name.into(),
            latest: Arc::new(Mutex::new(Instant::now())),
            margin,
            timeout: Duration::from_secs(1),
        }
    }

    pub fn kick(&self) {
        *self.latest.lock().unwrap_or_else(PoisonError::into_inner) = Instant::now();
    }

    /// Report on the handle as seen at `time`
    pub fn check(&self, time: Instant) -> ProbeReport {
        let latest = *self.latest.lock().unwrap_or_else(PoisonError::into_inner);
        let since = time.saturating_duration_since(latest);

        let report = if since < self.margin {
            ProbeReport::up()
        } else {
            ProbeReport::down()
        };
        report
            .detail("sinceKickMillis", since.as_millis() as u64)
            .detail("marginMillis", self.margin.as_millis() as u64)
    }
}

#[async_trait]
impl Probe for KickProbe {
    fn name(&self) -> &str {
        &self.name
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn run(&self) -> Result<ProbeReport, ProbeError> {
        Ok(self.check(Instant::now()))
    }
}
