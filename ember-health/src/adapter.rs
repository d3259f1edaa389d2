//! Translate aggregator and registry output into HTTP replies
//!
//! Nothing here knows which web framework serves the reply. A [Reply] is a
//! status, a content type and a body; the transport converts it.

use std::time::{SystemTime, UNIX_EPOCH};

use http::StatusCode;
use log::{error, warn};

use crate::{
    aggregator::{HealthAggregator, HealthVerdict},
    error::HealthError,
    metrics::MetricsRegistry,
    probe::Scalar,
    trace::{attributes, Tracer},
};

pub const CONTENT_TYPE_JSON: &str = "application/json";
pub const CONTENT_TYPE_TEXT: &str = "text/plain; charset=utf-8";

/// Body of the liveness reply
pub const SERVER_RUNNING: &str = "Server running";

/// Framework independent reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub status: StatusCode,
    pub content_type: &'static str,
    pub body: String,
}

impl Reply {
    pub fn text<S: Into<String>>(status: StatusCode, body: S) -> Self {
        Self {
            status,
            content_type: CONTENT_TYPE_TEXT,
            body: body.into(),
        }
    }

    pub fn json<S: Into<String>>(status: StatusCode, body: S) -> Self {
        Self {
            status,
            content_type: CONTENT_TYPE_JSON,
            body: body.into(),
        }
    }
}

/// Serves the health verdict: 200 when UP, 503 when DOWN, 500 on systemic failure
#[derive(Debug, Clone)]
pub struct HealthEndpointAdapter {
    aggregator: HealthAggregator,
    metrics: Option<MetricsRegistry>,
}

impl HealthEndpointAdapter {
    pub fn new(aggregator: HealthAggregator) -> Self {
        Self {
            aggregator,
            metrics: None,
        }
    }

    /// Count verdicts and time probes into `metrics`
    pub fn with_metrics(mut self, metrics: MetricsRegistry) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub async fn handle(&self) -> Reply {
        match self.verdict().await {
            Ok((verdict, body)) => {
                self.record(&verdict);
                let status = if verdict.is_up() {
                    StatusCode::OK
                } else {
                    StatusCode::SERVICE_UNAVAILABLE
                };
                Reply::json(status, body)
            }
            Err(e) => {
                error!("An error occurred while checking health: {:?}", e);
                Reply::text(StatusCode::INTERNAL_SERVER_ERROR, "Error checking health")
            }
        }
    }

    async fn verdict(&self) -> Result<(HealthVerdict, String), HealthError> {
        let verdict = self.aggregator.run_all().await?;
        let body = serde_json::to_string(&verdict)?;
        Ok((verdict, body))
    }

    fn record(&self, verdict: &HealthVerdict) {
        let Some(metrics) = &self.metrics else {
            return;
        };

        let overall = verdict.overall().to_string();
        if let Err(e) = metrics
            .counter("ember_health_checks_total", &[("overall", overall.as_str())])
            .map(|counter| counter.inc())
        {
            warn!("Cannot count health check: {}", e);
        }

        for result in verdict.results() {
            if let Err(e) = metrics
                .histogram("ember_probe_duration_seconds", &[("probe", result.name())])
                .map(|histogram| histogram.observe(result.took_millis() as f64 / 1000.0))
            {
                warn!("Cannot time probe {}: {}", result.name(), e);
            }
        }
    }
}

/// Serves the text exposition of a [MetricsRegistry]
#[derive(Debug, Clone)]
pub struct MetricsEndpointAdapter {
    metrics: MetricsRegistry,
}

impl MetricsEndpointAdapter {
    pub fn new(metrics: MetricsRegistry) -> Self {
        Self { metrics }
    }

    pub fn handle(&self) -> Reply {
        match self.metrics.serialize() {
            Ok(body) => Reply {
                status: StatusCode::OK,
                content_type: self.metrics.content_type(),
                body,
            },
            Err(e) => {
                error!("Error generating metrics: {:?}", e);
                Reply::text(StatusCode::INTERNAL_SERVER_ERROR, "Error generating metrics")
            }
        }
    }
}

/// Liveness ping. Also emits a span so the tracing path can be checked by hand.
pub fn liveness(tracer: &dyn Tracer) -> Reply {
    let mut span = tracer.start_span("root");
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|since| since.as_millis() as i64)
        .unwrap_or_default();
    span.set_attributes(attributes([
        ("endpoint", Scalar::from("/")),
        ("manual", Scalar::from(true)),
        ("timestamp", Scalar::from(timestamp)),
    ]));
    span.end();

    Reply::text(StatusCode::OK, SERVER_RUNNING)
}
