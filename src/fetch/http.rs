use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use crate::fetch::{variable_endpoint, FetchResult, SourceFetcher};

pub const USER_AGENT: &str = concat!("qlab-sync-monitor/", env!("CARGO_PKG_VERSION"));
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;

pub fn build_client(timeout: Duration, connect_timeout: Duration) -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .connect_timeout(connect_timeout)
        .build()
        .context("failed to build HTTP client")
}

pub async fn fetch_text(client: &Client, url: &str) -> Result<String> {
    let response = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("failed GET request: {url}"))?;
    let status = response.status();
    let body = response
        .text()
        .await
        .with_context(|| format!("failed reading response body: {url}"))?;
    if !status.is_success() {
        let preview: String = body.chars().take(180).collect();
        return Err(anyhow!("GET {url} returned {status}: {preview}"));
    }
    Ok(body)
}

#[derive(Debug, Clone)]
pub struct HttpSourceFetcher {
    client: Client,
}

impl HttpSourceFetcher {
    pub fn new(timeout: Duration, connect_timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_client(timeout, connect_timeout)?,
        })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SourceFetcher for HttpSourceFetcher {
    async fn fetch(&self, base_url: &str, source_label: &str, variable_id: &str) -> FetchResult {
        let url = variable_endpoint(base_url, source_label, variable_id);
        let response = match self.client.get(&url).send().await {
            Ok(response) => response,
            Err(error) => {
                debug!("fetch {url} failed: {error}");
                return FetchResult::failed(source_label, variable_id, error.to_string());
            }
        };
        let status = response.status();
        if !status.is_success() {
            return FetchResult::failed(
                source_label,
                variable_id,
                format!("HTTP {}", status.as_u16()),
            );
        }
        match response.text().await {
            Ok(body) => FetchResult::value(source_label, variable_id, body.trim()),
            Err(error) => FetchResult::failed(source_label, variable_id, error.to_string()),
        }
    }
}
