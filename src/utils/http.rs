//! Shared HTTP client and fetch helpers.
//!
//! Transport errors are retried on the fetch backoff schedule; non-2xx
//! responses are a permanent skip (a 404 will not become a 200), surfaced
//! as `Ok(None)`.

use anyhow::{Context, Result};
use bytes::Bytes;
use reqwest::Client;
use tracing::warn;

use super::retry::{retry, FETCH_BACKOFF};

const USER_AGENT: &str = concat!("siteport/", env!("CARGO_PKG_VERSION"));

/// Client used across the importer, resolver and discoverer.
pub fn client() -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(std::time::Duration::from_secs(30))
        .build()
        .context("building HTTP client")
}

pub struct FetchedBody {
    pub bytes: Bytes,
    pub content_type: Option<String>,
}

/// GET `url`, retrying transport failures. Returns `None` on a non-2xx
/// status after logging a warning.
pub async fn fetch_bytes(client: &Client, url: &str) -> Result<Option<FetchedBody>> {
    let response = retry(&FETCH_BACKOFF, |_: &reqwest::Error| true, || {
        client.get(url).send()
    })
    .await
    .with_context(|| format!("fetching {url}"))?;

    if !response.status().is_success() {
        warn!(url, status = %response.status(), "fetch returned non-success status, skipping");
        return Ok(None);
    }

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(';').next().unwrap_or(v).trim().to_string());
    let bytes = response
        .bytes()
        .await
        .with_context(|| format!("reading body of {url}"))?;
    Ok(Some(FetchedBody { bytes, content_type }))
}

/// GET `url` as text with the same retry/skip policy as [`fetch_bytes`].
pub async fn fetch_text(client: &Client, url: &str) -> Result<Option<String>> {
    match fetch_bytes(client, url).await? {
        Some(body) => Ok(Some(String::from_utf8_lossy(&body.bytes).into_owned())),
        None => Ok(None),
    }
}
