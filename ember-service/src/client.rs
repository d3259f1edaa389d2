//! Query the health of a running service

use log::info;
use reqwest::StatusCode;
use url::Url;

use crate::error::ServiceError;

/// `health` below `base`, keeping any path prefix of `base`
fn health_url(base: &Url) -> Result<Url, ServiceError> {
    let mut base = base.clone();
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    Ok(base.join("health")?)
}

/// GET `health` below `base`, returning the status and body
pub async fn probe(base: &Url) -> Result<(StatusCode, String), ServiceError> {
    let url = health_url(base)?;
    info!("Checking health at {}", url);

    let response = reqwest::get(url).await?;
    let status = response.status();
    let body = response.text().await?;
    Ok((status, body))
}
