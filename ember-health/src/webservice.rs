//! Routing table exposing the adapters over HTTP with warp
//!
//! | method | path       | handler                                  |
//! |--------|------------|------------------------------------------|
//! | GET    | `/`        | liveness ping                            |
//! | GET    | `/health`  | [HealthEndpointAdapter]                  |
//! | GET    | `/metrics` | [MetricsEndpointAdapter]                 |
//! | GET    | `/version` | name and version of the service          |

use std::{net::SocketAddr, sync::Arc};

use log::info;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use warp::Filter;

use crate::{
    adapter::{HealthEndpointAdapter, MetricsEndpointAdapter, Reply},
    aggregator::HealthAggregator,
    metrics::MetricsRegistry,
    trace::Tracer,
};

impl warp::Reply for Reply {
    fn into_response(self) -> warp::reply::Response {
        warp::reply::with_header(
            warp::reply::with_status(self.body, self.status),
            warp::http::header::CONTENT_TYPE,
            self.content_type,
        )
        .into_response()
    }
}

/// Reply structure for Version response
#[derive(Serialize, Clone, Debug)]
pub struct VersionReply {
    pub name: String,
    pub version: String,
}

/// Everything the handlers need, cloned into each request
#[derive(Clone, Debug)]
pub struct Endpoints {
    health: HealthEndpointAdapter,
    metrics: MetricsEndpointAdapter,
    registry: MetricsRegistry,
    tracer: Arc<dyn Tracer>,
    version: VersionReply,
}

impl Endpoints {
    pub fn new<S: Into<String>>(
        name: S,
        aggregator: HealthAggregator,
        registry: MetricsRegistry,
        tracer: Arc<dyn Tracer>,
    ) -> Self {
        Self {
            health: HealthEndpointAdapter::new(aggregator).with_metrics(registry.clone()),
            metrics: MetricsEndpointAdapter::new(registry.clone()),
            registry,
            tracer,
            version: VersionReply {
                name: name.into(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        }
    }

    /// Override the version reported on `/version`
    pub fn with_version<S: Into<String>>(mut self, version: S) -> Self {
        self.version.version = version.into();
        self
    }

    fn count_request(&self, path: &str) {
        if let Err(e) = self
            .registry
            .counter("ember_http_requests_total", &[("path", path)])
            .map(|counter| counter.inc())
        {
            log::warn!("Cannot count request to {}: {}", path, e);
        }
    }
}

pub fn ember_service(
    endpoints: Endpoints,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    let root = warp::path::end()
        .and(warp::get())
        .and(with_endpoints(endpoints.clone()))
        .and_then(handlers::root);

    let health = warp::path("health")
        .and(warp::path::end())
        .and(warp::get())
        .and(with_endpoints(endpoints.clone()))
        .and_then(handlers::health);

    let metrics = warp::path("metrics")
        .and(warp::path::end())
        .and(warp::get())
        .and(with_endpoints(endpoints.clone()))
        .and_then(handlers::metrics);

    let version = warp::path("version")
        .and(warp::path::end())
        .and(warp::get())
        .and(with_endpoints(endpoints))
        .and_then(handlers::version);

    root.or(health).or(metrics).or(version)
}

fn with_endpoints(
    endpoints: Endpoints,
) -> impl Filter<Extract = (Endpoints,), Error = std::convert::Infallible> + Clone {
    warp::any().map(move || endpoints.clone())
}

mod handlers {
    use super::Endpoints;
    use crate::adapter::liveness;
    use std::convert::Infallible;

    /// Handler for the liveness ping
    pub async fn root(endpoints: Endpoints) -> Result<impl warp::Reply, Infallible> {
        endpoints.count_request("/");
        Ok(liveness(endpoints.tracer.as_ref()))
    }

    /// Handler for health endpoint
    pub async fn health(endpoints: Endpoints) -> Result<impl warp::Reply, Infallible> {
        endpoints.count_request("/health");
        Ok(endpoints.health.handle().await)
    }

    /// Handler for metrics endpoint
    pub async fn metrics(endpoints: Endpoints) -> Result<impl warp::Reply, Infallible> {
        endpoints.count_request("/metrics");
        Ok(endpoints.metrics.handle())
    }

    /// Handler for version endpoint
    pub async fn version(endpoints: Endpoints) -> Result<impl warp::Reply, Infallible> {
        endpoints.count_request("/version");
        Ok(warp::reply::json(&endpoints.version))
    }
}

/// Start listening on `address` and serve the routes until `cancel` fires.
///
/// Returns the bound address (useful with port 0) and the server task.
pub fn service_listen(
    endpoints: Endpoints,
    address: SocketAddr,
    cancel: CancellationToken,
) -> Result<(SocketAddr, tokio::task::JoinHandle<()>), warp::Error> {
    let routes = ember_service(endpoints).with(warp::log("ember"));

    let (bound, server) =
        warp::serve(routes).try_bind_with_graceful_shutdown(address, async move {
            cancel.cancelled().await;
        })?;

    info!("Serving health and metrics on {}", bound);
    Ok((bound, tokio::task::spawn(server)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        probe::manual::ManualProbe, registry::ProbeRegistry, trace::NoopTracer,
    };
    use warp::http::StatusCode;

    fn endpoints(registry: &ProbeRegistry) -> Endpoints {
        Endpoints::new(
            "test",
            HealthAggregator::new(registry.clone()),
            MetricsRegistry::new(),
            Arc::new(NoopTracer),
        )
    }

    #[tokio::test]
    async fn root_is_running() {
        let api = ember_service(endpoints(&ProbeRegistry::new()));

        let reply = warp::test::request().path("/").reply(&api).await;
        assert_eq!(reply.status(), StatusCode::OK);
        assert_eq!(reply.body(), "Server running");
    }

    #[tokio::test]
    async fn health_follows_probes() {
        let registry = ProbeRegistry::new();
        let probe = ManualProbe::new("ready", true);
        registry.register(probe.clone());
        let api = ember_service(endpoints(&registry));

        let reply = warp::test::request().path("/health").reply(&api).await;
        assert_eq!(reply.status(), StatusCode::OK);
        assert_eq!(
            reply.headers()["content-type"],
            crate::adapter::CONTENT_TYPE_JSON
        );

        probe.disable();
        let reply = warp::test::request().path("/health").reply(&api).await;
        assert_eq!(reply.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn requests_are_counted_in_metrics() {
        let api = ember_service(endpoints(&ProbeRegistry::new()));

        warp::test::request().path("/").reply(&api).await;
        warp::test::request().path("/").reply(&api).await;
        let reply = warp::test::request().path("/metrics").reply(&api).await;

        assert_eq!(reply.status(), StatusCode::OK);
        let body = String::from_utf8(reply.body().to_vec()).unwrap();
        assert!(body.contains("ember_http_requests_total{path=\"/\"} 2"));
        assert!(body.contains("ember_http_requests_total{path=\"/metrics\"} 1"));
    }

    #[tokio::test]
    async fn version_and_unknown_paths() {
        let api = ember_service(endpoints(&ProbeRegistry::new()).with_version("9.9.9"));

        let reply = warp::test::request().path("/version").reply(&api).await;
        let body: serde_json::Value = serde_json::from_slice(reply.body()).unwrap();
        assert_eq!(body["name"], "test");
        assert_eq!(body["version"], "9.9.9");

        let reply = warp::test::request().path("/nope").reply(&api).await;
        assert_eq!(reply.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn listen_and_cancel() {
        let cancel = CancellationToken::new();
        let (bound, server) = service_listen(
            endpoints(&ProbeRegistry::new()),
            SocketAddr::from(([127, 0, 0, 1], 0)),
            cancel.clone(),
        )
        .unwrap();
        assert_ne!(bound.port(), 0);

        cancel.cancel();
        server.await.unwrap();
    }
}
