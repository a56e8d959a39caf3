use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::config::{DiscoveryConfig, ProviderFormat};

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("all discovery providers and the local cache are exhausted")]
    Exhausted,
}

#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("request timed out")]
    Timeout,
    #[error("http status {0}")]
    Status(u16),
    #[error("transport error: {0}")]
    Transport(String),
}

/// Injectable transport so provider fallback is testable without a network.
#[allow(async_fn_in_trait)]
pub trait Fetch {
    async fn fetch(
        &self,
        url: &str,
        headers: &std::collections::HashMap<String, String>,
        timeout: Duration,
    ) -> Result<String, FetchError>;
}

#[derive(Clone)]
pub struct ReqwestFetcher {
    client: reqwest::Client,
}

impl Default for ReqwestFetcher {
    fn default() -> Self {
        ReqwestFetcher {
            client: reqwest::Client::new(),
        }
    }
}

impl Fetch for ReqwestFetcher {
    async fn fetch(
        &self,
        url: &str,
        headers: &std::collections::HashMap<String, String>,
        timeout: Duration,
    ) -> Result<String, FetchError> {
        let mut req = self.client.get(url).timeout(timeout);
        for (name, value) in headers {
            req = req.header(name, value);
        }
        let res = req.send().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout
            } else {
                FetchError::Transport(e.to_string())
            }
        })?;
        if !res.status().is_success() {
            return Err(FetchError::Status(res.status().as_u16()));
        }
        res.text()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))
    }
}

pub fn looks_like_url(s: &str) -> bool {
    let lower = s.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

pub fn normalize_base(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}

fn parse_endpoint(format: ProviderFormat, body: &str) -> Option<String> {
    match format {
        ProviderFormat::JsonServerField => {
            let value: serde_json::Value = serde_json::from_str(body).ok()?;
            value.get("server")?.as_str().map(str::to_string)
        }
        ProviderFormat::PlainUrl => Some(body.trim().to_string()),
    }
}

fn with_cache_buster(url: &str) -> String {
    let sep = if url.contains('?') { '&' } else { '?' };
    format!("{}{}t={}", url, sep, chrono::Utc::now().timestamp_millis())
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheFile {
    #[serde(rename = "serverUrl")]
    server_url: String,
}

/// Resolves a relay endpoint through an ordered provider list with a
/// persistent cache fallback.
pub struct Resolver<F> {
    config: DiscoveryConfig,
    fetch: F,
}

impl<F: Fetch> Resolver<F> {
    pub fn new(config: DiscoveryConfig, fetch: F) -> Self {
        Resolver { config, fetch }
    }

    /// One pass over the provider list, in order. The first provider whose
    /// body yields something URL-shaped wins; every failure mode (timeout,
    /// bad status, unparseable body) just advances to the next provider.
    async fn try_providers(&self) -> Option<String> {
        let timeout = Duration::from_secs(self.config.request_timeout_seconds);
        for provider in &self.config.providers {
            let url = with_cache_buster(&provider.url);
            match self.fetch.fetch(&url, &provider.headers, timeout).await {
                Ok(body) => match parse_endpoint(provider.format, &body) {
                    Some(endpoint) if looks_like_url(&endpoint) => {
                        let endpoint = normalize_base(&endpoint);
                        log::info!("discovery ok via {}: {}", provider.name, endpoint);
                        return Some(endpoint);
                    }
                    _ => log::warn!("discovery {} returned no usable endpoint", provider.name),
                },
                Err(e) => log::warn!("discovery {} failed: {}", provider.name, e),
            }
        }
        None
    }

    /// Full resolution: up to `attempts` provider passes with a pause in
    /// between, then the cached value, then failure.
    pub async fn resolve(&self) -> Result<String, DiscoveryError> {
        for attempt in 0..self.config.attempts {
            if attempt > 0 {
                tokio::time::sleep(Duration::from_secs(self.config.retry_delay_seconds)).await;
            }
            if let Some(endpoint) = self.try_providers().await {
                self.update_cache(&endpoint);
                return Ok(endpoint);
            }
            log::warn!("discovery attempt {} exhausted all providers", attempt + 1);
        }

        match self.cached() {
            Some(cached) if looks_like_url(&cached) => {
                log::info!("falling back to cached endpoint {}", cached);
                Ok(cached)
            }
            _ => Err(DiscoveryError::Exhausted),
        }
    }

    /// Single pass for the background re-poll: no retries, no cache
    /// fallback, and a miss is not an error.
    pub async fn poll_once(&self) -> Option<String> {
        let endpoint = self.try_providers().await?;
        self.update_cache(&endpoint);
        Some(endpoint)
    }

    fn cached(&self) -> Option<String> {
        let content = std::fs::read_to_string(&self.config.cache_file).ok()?;
        let cache: CacheFile = serde_json::from_str(&content).ok()?;
        Some(cache.server_url)
    }

    fn update_cache(&self, endpoint: &str) {
        if self.cached().as_deref() == Some(endpoint) {
            return;
        }
        if let Err(e) = write_cache(&self.config.cache_file, endpoint) {
            log::warn!("failed to update discovery cache: {}", e);
        } else {
            log::info!("discovery cache updated: {}", endpoint);
        }
    }
}

fn write_cache(path: &Path, endpoint: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let cache = CacheFile {
        server_url: endpoint.to_string(),
    };
    std::fs::write(path, serde_json::to_string_pretty(&cache)?)
}
