use super::{Probe, ProbeReport};
use crate::error::ProbeError;
use async_trait::async_trait;
use std::time::Duration;
use tokio::net::TcpStream;
use url::Url;

/// Checks a database is reachable by opening a TCP connection to it.
///
/// The run is bounded by the ping timeout through [Probe::timeout].
#[derive(Debug, Clone)]
pub struct DatabaseProbe {
    name: String,
    host: String,
    port: u16,
    timeout: Duration,
}

/// Port for the schemes commonly used in database urls
fn default_port(scheme: &str) -> Option<u16> {
    match scheme {
        "postgres" | "postgresql" => Some(5432),
        "mysql" | "mariadb" => Some(3306),
        "redis" | "rediss" => Some(6379),
        "mongodb" => Some(27017),
        _ => None,
    }
}

impl DatabaseProbe {
    pub fn new<S: Into<String>>(name: S, url: &Url, timeout: Duration) -> Result<Self, ProbeError> {
        let host = url
            .host_str()
            .ok_or_else(|| ProbeError::Message(format!("no host in database url {}", url)))?;
        let port = url
            .port_or_known_default()
            .or_else(|| default_port(url.scheme()))
            .ok_or_else(|| ProbeError::Message(format!("no port in database url {}", url)))?;

        Ok(Self {
            name: name.into(),
            host: host.to_owned(),
            port,
            timeout,
        })
    }

    pub fn target(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[async_trait]
impl Probe for DatabaseProbe {
    fn name(&self) -> &str {
        &self.name
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn run(&self) -> Result<ProbeReport, ProbeError> {
        let stream = TcpStream::connect((self.host.as_str(), self.port)).await?;
        drop(stream);

        Ok(ProbeReport::up().detail("target", self.target()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::ProbeStatus;
    use tokio::net::TcpListener;

    #[test]
    fn port_from_scheme() {
        let url = Url::parse("postgres://user:pass@db/ember").unwrap();
        let probe = DatabaseProbe::new("database", &url, Duration::from_millis(300)).unwrap();
        assert_eq!(probe.target(), "db:5432");

        let url = Url::parse("postgres://db:6543/ember").unwrap();
        let probe = DatabaseProbe::new("database", &url, Duration::from_millis(300)).unwrap();
        assert_eq!(probe.target(), "db:6543");
    }

    #[test]
    fn unknown_scheme_without_port_is_rejected() {
        let url = Url::parse("cockroach://db/ember").unwrap();
        assert!(DatabaseProbe::new("database", &url, Duration::from_millis(300)).is_err());
    }

    #[tokio::test]
    async fn reachable_listener_is_up() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let url = Url::parse(&format!("postgres://127.0.0.1:{}/ember", port)).unwrap();
        let probe = DatabaseProbe::new("database", &url, Duration::from_millis(300)).unwrap();

        assert_eq!(probe.run().await.unwrap().status, ProbeStatus::Up);
    }

    #[tokio::test]
    async fn closed_port_is_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let url = Url::parse(&format!("postgres://127.0.0.1:{}/ember", port)).unwrap();
        let probe = DatabaseProbe::new("database", &url, Duration::from_millis(300)).unwrap();

        assert!(matches!(probe.run().await, Err(ProbeError::Io(_))));
    }
}
