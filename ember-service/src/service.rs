//! Bootstrap: probes, metrics, telemetry and the web service, run until signalled

use std::{future::Future, net::SocketAddr, time::Duration};

use ember_health::{
    telemetry,
    webservice::{service_listen, Endpoints},
    HealthAggregator, HealthVerdict, MetricsRegistry, ProbeRegistry, ProcessDefaults,
};
use log::{info, warn};
use tokio::signal::unix::{signal, SignalKind};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::{config::Config, error::ServiceError, VERSION};

/// How often the process metrics are sampled again
const PROCESS_METRICS_INTERVAL: Duration = Duration::from_secs(15);

#[derive(Debug, Clone)]
pub struct Service {
    config: Config,
    probes: ProbeRegistry,
    metrics: MetricsRegistry,
    process: ProcessDefaults,
}

impl Service {
    /// Register the configured probes and the default process metrics
    pub fn new(config: Config) -> Result<Self, ServiceError> {
        let probes = ProbeRegistry::new();
        config.health.register_probes(&probes)?;
        let process = ProcessDefaults::new();
        let metrics = MetricsRegistry::with_defaults(&process)?;

        Ok(Self {
            config,
            probes,
            metrics,
            process,
        })
    }

    pub fn probes(&self) -> &ProbeRegistry {
        &self.probes
    }

    pub fn metrics(&self) -> &MetricsRegistry {
        &self.metrics
    }

    /// One aggregation pass over the registered probes
    pub async fn check(&self) -> Result<HealthVerdict, ServiceError> {
        let aggregator = HealthAggregator::new(self.probes.clone());
        Ok(aggregator.run_all().await?)
    }

    /// Bind the configured address and serve until `cancel` fires
    pub fn listen(
        &self,
        cancel: CancellationToken,
    ) -> Result<(SocketAddr, JoinHandle<()>), ServiceError> {
        let tracer = telemetry::tracer();
        let aggregator = HealthAggregator::new(self.probes.clone()).with_tracer(tracer.clone());
        let endpoints = Endpoints::new(
            self.config.health.name.clone(),
            aggregator,
            self.metrics.clone(),
            tracer,
        )
        .with_version(VERSION);

        Ok(service_listen(endpoints, self.config.health.address, cancel)?)
    }

    /// Serve until SIGINT, SIGTERM, SIGQUIT or SIGHUP, then shut down gracefully
    pub async fn start(&self) -> Result<(), ServiceError> {
        telemetry::init(&self.config.telemetry)?;

        let served = self.serve_until(wait_for_signal()).await;
        let shutdown = telemetry::shutdown();
        served?;
        shutdown?;

        info!("Service {} is now complete", self.config.health.name);
        Ok(())
    }

    /// Serve until `stop` completes. The server is stopped and awaited
    /// whatever `stop` returns.
    pub async fn serve_until<F>(&self, stop: F) -> Result<(), ServiceError>
    where
        F: Future<Output = Result<(), ServiceError>>,
    {
        let cancel = CancellationToken::new();
        let (address, server) = self.listen(cancel.clone())?;
        let refresher = tokio::spawn(refresh_process_metrics(
            self.process.clone(),
            self.metrics.clone(),
            cancel.clone(),
        ));
        info!(
            "Started {} ({}) on {}",
            self.config.health.name, VERSION, address
        );

        let stopped = stop.await;
        if let Err(e) = &stopped {
            warn!("Stopping after error: {}", e);
        }

        cancel.cancel();
        server.await?;
        refresher.await?;
        stopped
    }
}

/// Sample the process metrics every [PROCESS_METRICS_INTERVAL] until cancelled
async fn refresh_process_metrics(
    process: ProcessDefaults,
    metrics: MetricsRegistry,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval(PROCESS_METRICS_INTERVAL);
    // first tick is immediate and the registry was sampled at startup
    interval.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {
                if let Err(e) = process.refresh(&metrics) {
                    warn!("Cannot refresh process metrics: {}", e);
                }
            }
        }
    }
}

async fn wait_for_signal() -> Result<(), ServiceError> {
    let mut sig_terminate = signal(SignalKind::terminate())?;
    let mut sig_quit = signal(SignalKind::quit())?;
    let mut sig_hup = signal(SignalKind::hangup())?;
    info!("registered signal handlers: TERM, QUIT, HUP");

    info!("Waiting on signal handlers");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received ctrl-c signal");
        },
        _ = sig_terminate.recv() => {
            info!("Received TERM signal");
        },
        _ = sig_quit.recv() => {
            info!("Received QUIT signal");
        },
        _ = sig_hup.recv() => {
            info!("Received HUP signal");
        },
    };
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_health::{probe::manual::ManualProbe, HealthConfig, Overall};
    use std::time::Duration;

    fn config() -> Config {
        Config {
            health: HealthConfig {
                address: SocketAddr::from(([127, 0, 0, 1], 0)),
                name: "test".to_string(),
                heap_threshold_bytes: u64::MAX,
                disk_path: std::env::temp_dir(),
                disk_threshold_percent: 1.0,
                probe_timeout: Duration::from_secs(2),
                ..HealthConfig::default()
            },
            ..Config::default()
        }
    }

    #[tokio::test]
    async fn registers_configured_probes() {
        let service = Service::new(config()).unwrap();
        assert_eq!(
            service.probes().list().names(),
            vec!["disk_storage", "memory_heap"]
        );
        assert!(service
            .metrics()
            .serialize()
            .unwrap()
            .contains("process_uptime_seconds"));
    }

    #[tokio::test]
    async fn check_follows_probes() {
        let service = Service::new(config()).unwrap();
        assert_eq!(service.check().await.unwrap().overall(), Overall::Up);

        service
            .probes()
            .register(ManualProbe::new("maintenance", false));
        let verdict = service.check().await.unwrap();
        assert_eq!(verdict.overall(), Overall::Down);
        assert_eq!(verdict.results().len(), 3);
    }

    fn free_port() -> u16 {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    }

    #[tokio::test]
    async fn failed_stop_still_stops_the_server() {
        let address = SocketAddr::from(([127, 0, 0, 1], free_port()));
        let mut config = config();
        config.health.address = address;
        let service = Service::new(config).unwrap();

        let served = service
            .serve_until(async move {
                let url = url::Url::parse(&format!("http://{}", address)).unwrap();
                let (status, _) = crate::client::probe(&url).await.unwrap();
                assert_eq!(status, reqwest::StatusCode::OK);
                Err(ServiceError::Io(std::io::Error::other("signal handler")))
            })
            .await;

        assert!(matches!(served, Err(ServiceError::Io(_))));
        assert!(tokio::net::TcpStream::connect(address).await.is_err());
    }

    // Only test touching the process wide telemetry in this crate
    #[tokio::test]
    async fn failed_start_shuts_telemetry_down() {
        let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let mut config = config();
        config.health.address = taken.local_addr().unwrap();
        let service = Service::new(config).unwrap();

        assert!(matches!(service.start().await, Err(ServiceError::Warp(_))));
        assert_eq!(
            telemetry::shutdown(),
            Err(ember_health::TelemetryError::NotInitialised)
        );
    }

    #[tokio::test]
    async fn serves_until_cancelled() {
        let service = Service::new(config()).unwrap();
        let cancel = CancellationToken::new();
        let (address, server) = service.listen(cancel.clone()).unwrap();

        let url = url::Url::parse(&format!("http://{}", address)).unwrap();
        let (status, body) = crate::client::probe(&url).await.unwrap();
        assert_eq!(status, reqwest::StatusCode::OK);
        assert!(body.contains("\"overall\":\"UP\""));

        let version = reqwest::get(url.join("/version").unwrap())
            .await
            .unwrap()
            .json::<serde_json::Value>()
            .await
            .unwrap();
        assert_eq!(version["name"], "test");
        assert_eq!(version["version"], VERSION);

        cancel.cancel();
        server.await.unwrap();
    }
}
