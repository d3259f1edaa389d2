use super::{Probe, ProbeReport, ProbeStatus};
use crate::error::ProbeError;
use async_trait::async_trait;

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// A health check that is manually controlled. Allowing the developer to manually
/// enable or disable it as appropriate.
///
/// Clones share their state, so one clone can be registered while another is
/// kept at the code site to flip it.
#[derive(Debug, Clone)]
pub struct ManualProbe {
    name: String,
    timeout: Duration,
    state: Arc<Mutex<ProbeStatus>>,
}

impl ManualProbe {
    pub fn new<S: Into<String>>(name: S, enabled: bool) -> Self {
        let status = if enabled {
            ProbeStatus::Up
        } else {
            ProbeStatus::Down
        };
        Self::with_status(name, status)
    }

    pub fn with_status<S: Into<String>>(name: S, status: ProbeStatus) -> Self {
        Self {
            name: name.into(),
            timeout: Duration::from_secs(1),
            state: Arc::new(Mutex::new(status)),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn set(&self, status: ProbeStatus) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = status;
    }

    pub fn status(&self) -> ProbeStatus {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn enable(&self) {
        self.set(ProbeStatus::Up);
    }

    pub fn disable(&self) {
        self.set(ProbeStatus::Down);
    }

    /// Flip between UP and DOWN. A degraded probe becomes UP.
    pub fn toggle(&self) -> ProbeStatus {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        *state = match *state {
            ProbeStatus::Up => ProbeStatus::Down,
            ProbeStatus::Down | ProbeStatus::Degraded => ProbeStatus::Up,
        };
        *state
    }
}

#[async_trait]
impl Probe for ManualProbe {
    fn name(&self) -> &str {
        &self.name
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn run(&self) -> Result<ProbeReport, ProbeError> {
        Ok(ProbeReport::with_status(self.status()))
    }
}
