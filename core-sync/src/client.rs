//! # Sheet Client
//!
//! Single-request transport to the spreadsheet script.
//!
//! Each attempt is bounded by the configured request timeout. Transport
//! failures (connection errors, timeouts, non-2xx statuses, non-JSON bodies
//! and malformed envelopes) are retried with a linearly growing delay until
//! the attempt budget is spent. A well-formed `success: false` answer is
//! returned as-is and never retried.
//!
//! Every terminal outcome is reported to an optional [`ApiStatusSink`]:
//! `online` after any parsed response, `error` once retries are exhausted.

use crate::error::{Result, SyncError};
use crate::protocol::{ApiRequest, ApiResponse};
use async_trait::async_trait;
use bridge_traits::error::BridgeError;
use bridge_traits::http::{HttpClient, HttpRequest, HttpResponse, RetryPolicy};
use core_routes::{ApiStatus, RouteStateManager};
use core_runtime::config::SyncSettings;
use core_runtime::logging::redact_url;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Receives the outcome classification of every remote call.
#[async_trait]
pub trait ApiStatusSink: Send + Sync {
    async fn report(&self, status: ApiStatus);
}

#[async_trait]
impl ApiStatusSink for RouteStateManager {
    async fn report(&self, status: ApiStatus) {
        self.set_api_status(status).await;
    }
}

/// Why a single attempt failed, before the attempt count is known.
#[derive(Debug)]
enum AttemptFailure {
    Connectivity(String),
    Timeout,
    Protocol(String),
}

impl AttemptFailure {
    fn from_bridge(err: BridgeError) -> Self {
        match err {
            BridgeError::Timeout(_) => AttemptFailure::Timeout,
            other => AttemptFailure::Connectivity(other.to_string()),
        }
    }

    fn into_error(self, attempts: u32, timeout: Duration) -> SyncError {
        match self {
            AttemptFailure::Connectivity(message) => SyncError::Connectivity { message, attempts },
            AttemptFailure::Timeout => SyncError::Timeout {
                timeout_ms: timeout.as_millis() as u64,
                attempts,
            },
            AttemptFailure::Protocol(message) => SyncError::Protocol { message, attempts },
        }
    }
}

pub struct SheetClient {
    http: Arc<dyn HttpClient>,
    endpoint: Option<String>,
    timeout: Duration,
    retry: RetryPolicy,
    status_sink: Option<Arc<dyn ApiStatusSink>>,
}

impl SheetClient {
    pub fn new(http: Arc<dyn HttpClient>, endpoint: Option<String>, settings: &SyncSettings) -> Self {
        Self {
            http,
            endpoint: endpoint.filter(|url| !url.trim().is_empty()),
            timeout: settings.request_timeout,
            retry: settings.retry_policy(),
            status_sink: None,
        }
    }

    pub fn with_status_sink(mut self, sink: Arc<dyn ApiStatusSink>) -> Self {
        self.status_sink = Some(sink);
        self
    }

    pub fn is_configured(&self) -> bool {
        self.endpoint.is_some()
    }

    pub fn request_timeout(&self) -> Duration {
        self.timeout
    }

    /// Send `request`, retrying transport failures.
    ///
    /// # Errors
    ///
    /// - [`SyncError::NotConfigured`] without an endpoint (no request is made)
    /// - [`SyncError::Connectivity`], [`SyncError::Timeout`] or
    ///   [`SyncError::Protocol`] once every attempt has failed
    pub async fn send(&self, request: &ApiRequest) -> Result<ApiResponse> {
        let endpoint = self.endpoint.as_deref().ok_or(SyncError::NotConfigured)?;
        let body = HttpRequest::post(endpoint)
            .header("Accept", "application/json")
            .timeout(self.timeout)
            .json(request)
            .map_err(|e| SyncError::Protocol {
                message: e.to_string(),
                attempts: 0,
            })?;

        let mut attempt = 0;
        loop {
            attempt += 1;
            debug!(
                action = request.action(),
                attempt,
                endpoint = %redact_url(endpoint),
                "Sending spreadsheet request"
            );

            match self.attempt(body.clone()).await {
                Ok(response) => {
                    self.report(ApiStatus::Online).await;
                    return Ok(response);
                }
                Err(failure) if self.retry.should_retry(attempt) => {
                    let delay = self.retry.delay_after(attempt);
                    warn!(
                        action = request.action(),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        failure = ?failure,
                        "Spreadsheet request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(failure) => {
                    let err = failure.into_error(attempt, self.timeout);
                    error!(action = request.action(), error = %err, "Spreadsheet request failed");
                    self.report(ApiStatus::Error).await;
                    return Err(err);
                }
            }
        }
    }

    async fn attempt(&self, request: HttpRequest) -> std::result::Result<ApiResponse, AttemptFailure> {
        let response = match tokio::time::timeout(self.timeout, self.http.execute(request)).await {
            Err(_) => return Err(AttemptFailure::Timeout),
            Ok(result) => result.map_err(AttemptFailure::from_bridge)?,
        };
        parse_envelope(&response)
    }

    async fn report(&self, status: ApiStatus) {
        if let Some(sink) = &self.status_sink {
            sink.report(status).await;
        }
    }
}

fn parse_envelope(response: &HttpResponse) -> std::result::Result<ApiResponse, AttemptFailure> {
    if !response.is_success() {
        return Err(AttemptFailure::Protocol(format!("HTTP {}", response.status)));
    }
    if !response.is_json() {
        let preview: String = response
            .text()
            .unwrap_or_default()
            .chars()
            .take(200)
            .collect();
        debug!(preview = %preview, "Non-JSON response body");
        return Err(AttemptFailure::Protocol(
            "response is not valid JSON".to_string(),
        ));
    }
    response
        .json::<ApiResponse>()
        .map_err(|e| AttemptFailure::Protocol(e.to_string()))
}
