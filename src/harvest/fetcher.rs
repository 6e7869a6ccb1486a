//! HTTP fetcher implementation
//!
//! This module handles all requests to the remote API, including:
//! - Building the shared HTTP client with timeouts and a bounded pool
//! - Decorating each request with rotating identity headers
//! - Pre-request jitter
//! - The bounded retry loop for rate limits and transient faults
//! - Error classification

use crate::config::{ApiConfig, Config};
use crate::harvest::backoff::{BackoffPolicy, MAX_RETRIES_REASON};
use crate::harvest::identity::{RequestDecorator, RotatingIdentity};
use crate::harvest::pacing::random_delay;
use crate::harvest::payload::{classify_payload, classify_response, Attempt};
use crate::state::FetchResult;
use crate::HarvestError;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::sync::Arc;
use std::time::Instant;

/// Fetches one identifier to a terminal outcome
///
/// Implementations own their retries: whatever happens, `fetch` returns
/// exactly one `Success` or `Failure` for the id it was given.
#[async_trait]
pub trait ItemFetcher: Send + Sync {
    async fn fetch(&self, id: u32) -> FetchResult;
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `config` - The API configuration (timeouts, TLS policy)
/// * `max_connections` - Idle connections kept per host, normally the worker count
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
pub fn build_http_client(
    config: &ApiConfig,
    max_connections: usize,
) -> Result<Client, reqwest::Error> {
    Client::builder()
        .timeout(config.request_timeout())
        .connect_timeout(config.connect_timeout())
        .pool_max_idle_per_host(max_connections)
        .danger_accept_invalid_certs(config.accept_invalid_certs)
        .gzip(true)
        .brotli(true)
        .build()
}

/// Fetcher that POSTs `<id_param>=<id>` to the configured endpoint
pub struct HttpFetcher {
    client: Client,
    endpoint: String,
    id_param: String,
    name_field: String,
    decorator: Arc<dyn RequestDecorator>,
    backoff: BackoffPolicy,
    jitter_min_ms: u64,
    jitter_max_ms: u64,
}

impl HttpFetcher {
    /// Creates a fetcher from the full configuration
    ///
    /// # Returns
    ///
    /// * `Ok(HttpFetcher)` - Client and identity pool are ready
    /// * `Err(HarvestError)` - The client could not be built or a header is invalid
    pub fn from_config(config: &Config) -> Result<Self, HarvestError> {
        let client = build_http_client(
            &config.api,
            config.harvest.max_concurrent_requests as usize,
        )?;
        let decorator = RotatingIdentity::from_config(&config.identity)?;

        Ok(Self {
            client,
            endpoint: config.api.endpoint.clone(),
            id_param: config.api.id_param.clone(),
            name_field: config.api.name_field.clone(),
            decorator: Arc::new(decorator),
            backoff: BackoffPolicy::from_config(&config.backoff),
            jitter_min_ms: config.harvest.jitter_min_ms,
            jitter_max_ms: config.harvest.jitter_max_ms,
        })
    }

    /// Replaces the request decorator
    pub fn with_decorator(mut self, decorator: Arc<dyn RequestDecorator>) -> Self {
        self.decorator = decorator;
        self
    }

    /// Issues a single request and classifies it
    async fn attempt(&self, id: u32) -> Attempt {
        let response = match self
            .client
            .post(&self.endpoint)
            .headers(self.decorator.headers())
            .form(&[(self.id_param.as_str(), id.to_string())])
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => return classify_transport_error(&e),
        };

        let status = response.status();
        if status != StatusCode::OK {
            return classify_response(status, "", &self.name_field);
        }

        match response.text().await {
            Ok(body) => classify_payload(&body, &self.name_field),
            Err(e) => classify_transport_error(&e),
        }
    }
}

#[async_trait]
impl ItemFetcher for HttpFetcher {
    /// Fetches one identifier with bounded retries
    ///
    /// # Retry Logic
    ///
    /// | Condition | Action |
    /// |-----------|--------|
    /// | 200 + name | Success |
    /// | 429, or 200 with a rate-limit message | Sleep `backoff`, then `backoff * factor` (capped) |
    /// | Connect / timeout / transfer error | Sleep `min(cap, backoff / 2)`, then `backoff * transient_factor` (capped) |
    /// | 200 with another error | Failure(message) |
    /// | Other status | Failure("HTTP <status>") |
    /// | Attempts or time budget spent | Failure("max retries exceeded") |
    async fn fetch(&self, id: u32) -> FetchResult {
        let started = Instant::now();
        let mut backoff = self.backoff.initial();
        let mut attempts: u32 = 0;

        loop {
            attempts += 1;
            tokio::time::sleep(random_delay(self.jitter_min_ms, self.jitter_max_ms)).await;

            let (pause, next_backoff) = match self.attempt(id).await {
                Attempt::Success(name) => {
                    tracing::info!(id, "ID {}: Successfully fetched '{}'", id, name);
                    return FetchResult::Success { id, name };
                }
                Attempt::Failed(reason) => {
                    tracing::error!(id, "ID {}: {}", id, reason);
                    return FetchResult::Failure { id, reason };
                }
                Attempt::RateLimited(detail) => {
                    tracing::warn!(
                        id,
                        attempt = attempts,
                        backoff_ms = backoff.as_millis() as u64,
                        "ID {}: Rate limited ({})",
                        id,
                        detail
                    );
                    (backoff, self.backoff.after_rate_limit(backoff))
                }
                Attempt::Transient(error) => {
                    tracing::error!(
                        id,
                        attempt = attempts,
                        "ID {}: Connection error - {}",
                        id,
                        error
                    );
                    (
                        self.backoff.transient_pause(backoff),
                        self.backoff.after_transient(backoff),
                    )
                }
            };

            if self.backoff.exhausted(attempts, started.elapsed() + pause) {
                tracing::error!(
                    id,
                    attempts,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "ID {}: giving up",
                    id
                );
                return FetchResult::Failure {
                    id,
                    reason: MAX_RETRIES_REASON.to_string(),
                };
            }

            tracing::debug!(id, "ID {}: Backing off for {:?}", id, pause);
            tokio::time::sleep(pause).await;
            backoff = next_backoff;
        }
    }
}

/// Maps a reqwest error to a retryable or terminal attempt
fn classify_transport_error(error: &reqwest::Error) -> Attempt {
    if error.is_timeout() || error.is_connect() || error.is_request() || error.is_body() {
        Attempt::Transient(error.to_string())
    } else {
        Attempt::Failed(format!("Unexpected error - {}", error))
    }
}
