use super::{Probe, ProbeReport};
use crate::error::ProbeError;
use async_trait::async_trait;
use std::time::Duration;
use sysinfo::System;

/// Goes DOWN when the resident memory of this process is above a threshold
#[derive(Debug, Clone)]
pub struct MemoryProbe {
    name: String,
    threshold_bytes: u64,
    timeout: Duration,
}

impl MemoryProbe {
    pub fn new<S: Into<String>>(name: S, threshold_bytes: u64, timeout: Duration) -> Self {
        Self {
            name: name.into(),
            threshold_bytes,
            timeout,
        }
    }

    pub(crate) fn evaluate(&self, used: u64) -> ProbeReport {
        let report = if used > self.threshold_bytes {
            ProbeReport::down()
        } else {
            ProbeReport::up()
        };
        report
            .detail("used", used)
            .detail("threshold", self.threshold_bytes)
    }
}

/// Resident bytes of this process
fn resident_bytes() -> Result<u64, ProbeError> {
    let pid = sysinfo::get_current_pid().map_err(|e| ProbeError::Unsupported(e.to_string()))?;

    let mut system = System::new();
    system.refresh_process(pid);
    system
        .process(pid)
        .map(|process| process.memory())
        .ok_or_else(|| ProbeError::Message(format!("no process information for {}", pid)))
}

#[async_trait]
impl Probe for MemoryProbe {
    fn name(&self) -> &str {
        &self.name
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn run(&self) -> Result<ProbeReport, ProbeError> {
        let used = tokio::task::spawn_blocking(resident_bytes)
            .await
            .map_err(|e| ProbeError::Message(format!("memory task: {}", e)))??;
        Ok(self.evaluate(used))
    }
}
