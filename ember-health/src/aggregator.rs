use std::{
    sync::{Arc, Mutex, PoisonError},
    time::Instant,
};

use futures::future::join_all;
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio_util::task::AbortOnDropHandle;

use crate::{
    error::HealthError,
    probe::{Probe, ProbeResult, Scalar},
    registry::ProbeRegistry,
    trace::{attributes, NoopTracer, Tracer},
};

/// Overall status of a verdict
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum Overall {
    Up,
    Down,
}

impl std::fmt::Display for Overall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Overall::Up => "UP",
            Overall::Down => "DOWN",
        })
    }
}

/// Merged outcome of every probe for one aggregation pass
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct HealthVerdict {
    overall: Overall,
    results: Vec<ProbeResult>,
}

impl HealthVerdict {
    /// Sort results by probe name and decide the overall status
    pub fn from_results(mut results: Vec<ProbeResult>) -> Self {
        results.sort_by(|a, b| a.name().cmp(b.name()));
        Self {
            overall: overall(&results),
            results,
        }
    }

    pub fn overall(&self) -> Overall {
        self.overall
    }

    /// Results ordered by probe name
    pub fn results(&self) -> &[ProbeResult] {
        &self.results
    }

    pub fn is_up(&self) -> bool {
        self.overall == Overall::Up
    }
}

/// UP only when every result is UP. A degraded result still fails the verdict.
/// No results at all is UP.
pub fn overall(results: &[ProbeResult]) -> Overall {
    if results.iter().all(ProbeResult::is_up) {
        Overall::Up
    } else {
        Overall::Down
    }
}

#[cfg_attr(doc, aquamarine::aquamarine)]
/// Runs every registered probe concurrently, each bounded by its own timeout,
/// and merges the results into one [HealthVerdict].
///
/// ```mermaid
/// sequenceDiagram
///     participant Adapter
///     participant Aggregator
///     participant Registry
///     participant Probe
///
///     Adapter->>+Aggregator: run_all
///     Aggregator->>Registry: list (snapshot)
///     par each probe on its own task
///         Aggregator->>+Probe: run
///         Probe-->>-Aggregator: report, error or timeout
///     end
///     Aggregator-->>-Adapter: HealthVerdict (sorted by name)
/// ```
#[derive(Debug, Clone)]
pub struct HealthAggregator {
    registry: ProbeRegistry,
    tracer: Arc<dyn Tracer>,
    previous: Arc<Mutex<Option<Overall>>>,
}

impl HealthAggregator {
    pub fn new(registry: ProbeRegistry) -> Self {
        Self {
            registry,
            tracer: Arc::new(NoopTracer),
            previous: Arc::new(Mutex::new(None)),
        }
    }

    /// Report each aggregation pass as a span through this tracer
    pub fn with_tracer(mut self, tracer: Arc<dyn Tracer>) -> Self {
        self.tracer = tracer;
        self
    }

    pub fn registry(&self) -> &ProbeRegistry {
        &self.registry
    }

    /// Run one pass over a snapshot of the registry.
    ///
    /// Probe failures, panics and timeouts become DOWN results. The only error
    /// is being unable to schedule the probes at all.
    pub async fn run_all(&self) -> Result<HealthVerdict, HealthError> {
        let handle = Handle::try_current().map_err(|e| {
            error!("Cannot schedule health probes: {}", e);
            HealthError::from(e)
        })?;

        let probes = self.registry.list();
        let mut span = self.tracer.start_span("health.run_all");

        let runs = probes.into_iter().map(|probe| run_probe(&handle, probe));
        let verdict = HealthVerdict::from_results(join_all(runs).await);

        span.set_attributes(attributes([
            ("probes", Scalar::from(verdict.results().len() as i64)),
            ("overall", Scalar::from(verdict.overall().to_string())),
        ]));
        span.end();

        self.note_transition(&verdict);
        Ok(verdict)
    }

    fn note_transition(&self, verdict: &HealthVerdict) {
        let mut previous = self.previous.lock().unwrap_or_else(PoisonError::into_inner);
        let current = verdict.overall();
        if *previous != Some(current) {
            let summary = verdict
                .results()
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(",");
            match *previous {
                Some(before) => info!(
                    "Health changed to {} from {} [{}]",
                    current, before, summary
                ),
                None => info!("Health is {} [{}]", current, summary),
            }
            *previous = Some(current);
        }
    }
}

/// Spawn the probe on its own task and race it against its timeout.
///
/// The race is awaited here rather than inside the probe task so the timeout
/// fires even when a probe blocks its worker thread.
async fn run_probe(handle: &Handle, probe: Arc<dyn Probe>) -> ProbeResult {
    let name = probe.name().to_owned();
    let timeout = probe.timeout();
    let started = Instant::now();

    // Aborted on drop, so abandoning the pass also stops its probes
    let mut task = AbortOnDropHandle::new(handle.spawn(async move { probe.run().await }));

    let result = match tokio::time::timeout(timeout, &mut task).await {
        Ok(Ok(Ok(report))) => ProbeResult::from_report(&name, report, started.elapsed()),
        Ok(Ok(Err(e))) => {
            warn!("Probe {} failed: {}", name, e);
            ProbeResult::failed(&name, e.to_string(), started.elapsed())
        }
        Ok(Err(join_error)) => {
            let message = if join_error.is_panic() {
                "panicked"
            } else {
                "cancelled"
            };
            warn!("Probe {} {}", name, message);
            ProbeResult::failed(&name, message, started.elapsed())
        }
        Err(_elapsed) => {
            task.abort();
            warn!("Probe {} timed out after {:?}", name, timeout);
            ProbeResult::timed_out(&name, started.elapsed())
        }
    };

    debug!("Probe settled {} in {}ms", result, result.took_millis());
    result
}
