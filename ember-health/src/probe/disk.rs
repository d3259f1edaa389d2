use super::{Probe, ProbeReport};
use crate::error::ProbeError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use sysinfo::Disks;

/// Goes DOWN when the filesystem holding `path` is fuller than a threshold
#[derive(Debug, Clone)]
pub struct DiskProbe {
    name: String,
    path: PathBuf,
    /// Fraction 0.0..=1.0 of used space
    threshold: f64,
    timeout: Duration,
}

/// Sizes of a filesystem in bytes
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Usage {
    pub total: u64,
    pub available: u64,
}

impl Usage {
    pub fn used_fraction(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        1.0 - (self.available as f64 / self.total as f64)
    }
}

impl DiskProbe {
    pub fn new<S: Into<String>, P: Into<PathBuf>>(
        name: S,
        path: P,
        threshold: f64,
        timeout: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            threshold,
            timeout,
        }
    }

    pub(crate) fn evaluate(&self, usage: Usage) -> ProbeReport {
        let used = usage.used_fraction();
        let report = if used > self.threshold {
            ProbeReport::down()
        } else {
            ProbeReport::up()
        };
        report
            .detail("usedPercent", used)
            .detail("thresholdPercent", self.threshold)
            .detail("path", self.path.display().to_string())
    }
}

/// Usage of the mounted filesystem holding `path`: the mount point that is
/// the longest prefix of the canonical path
fn filesystem_usage(path: &Path) -> Result<Usage, ProbeError> {
    let path = std::fs::canonicalize(path)?;
    let disks = Disks::new_with_refreshed_list();

    let mounts = disks.list().iter().map(|disk| {
        (
            disk.mount_point(),
            Usage {
                total: disk.total_space(),
                available: disk.available_space(),
            },
        )
    });

    mount_for(&path, mounts).ok_or_else(|| {
        ProbeError::Message(format!("no mounted filesystem holds {}", path.display()))
    })
}

fn mount_for<'a, I>(path: &Path, mounts: I) -> Option<Usage>
where
    I: IntoIterator<Item = (&'a Path, Usage)>,
{
    mounts
        .into_iter()
        .filter(|(mount_point, _)| path.starts_with(mount_point))
        .max_by_key(|(mount_point, _)| mount_point.components().count())
        .map(|(_, usage)| usage)
}

#[async_trait]
impl Probe for DiskProbe {
    fn name(&self) -> &str {
        &self.name
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn run(&self) -> Result<ProbeReport, ProbeError> {
        let path = self.path.clone();
        let usage = tokio::task::spawn_blocking(move || filesystem_usage(&path))
            .await
            .map_err(|e| ProbeError::Message(format!("disk task: {}", e)))??;

        Ok(self.evaluate(usage))
    }
}
