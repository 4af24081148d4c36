//! HTTP transport seam.
//!
//! The executor only ever talks to a [`Transport`]. [`ReqwestTransport`] is
//! the production implementation over the configured endpoint clients; tests
//! substitute scripted fakes.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};
use verity_api::ApiClients;
use verity_types::HttpMethod;
use verity_util::{is_sensitive_header, redact_sensitive};

/// Fixed delay between connection retries.
pub const RETRY_BACKOFF: Duration = Duration::from_millis(200);

/// A fully resolved request, ready to send.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    /// Configured endpoint name the path is relative to.
    pub endpoint: String,
    pub method: HttpMethod,
    pub path: String,
    pub headers: IndexMap<String, String>,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
    pub timeout: Option<Duration>,
}

/// Raw response as seen by the executor.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct HttpResponse {
    pub status: u16,
    /// Header names are lowercase.
    pub headers: IndexMap<String, String>,
    pub elapsed: Duration,
    pub body: Vec<u8>,
}

/// Transport-level failures. Every variant is an infrastructure failure.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request timed out after {elapsed_ms} ms")]
    Timeout { elapsed_ms: u64 },

    #[error("connection failed: {message}")]
    Connect { message: String },

    #[error("request failed: {message}")]
    Request { message: String },

    #[error("invalid request: {message}")]
    InvalidRequest { message: String },
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

/// Production transport backed by one `reqwest` client per endpoint.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    clients: ApiClients,
}

impl ReqwestTransport {
    pub fn new(clients: ApiClients) -> Self {
        Self { clients }
    }

    async fn send_once(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        let client = self.clients.get(&request.endpoint).ok_or_else(|| TransportError::InvalidRequest {
            message: format!("unknown endpoint '{}'", request.endpoint),
        })?;
        let method = reqwest::Method::from_bytes(request.method.as_str().as_bytes()).map_err(|error| TransportError::InvalidRequest {
            message: error.to_string(),
        })?;

        let mut builder = client.request(method, &request.path);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        let started = Instant::now();
        let response = builder.send().await.map_err(|error| classify(error, started))?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| (name.as_str().to_ascii_lowercase(), String::from_utf8_lossy(value.as_bytes()).into_owned()))
            .collect();
        let body = response.bytes().await.map_err(|error| classify(error, started))?;

        Ok(HttpResponse {
            status,
            headers,
            elapsed: started.elapsed(),
            body: body.to_vec(),
        })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let retries = self.clients.get(&request.endpoint).map(|client| client.retries).unwrap_or(0);
        if tracing::enabled!(tracing::Level::DEBUG) {
            let headers: Vec<String> = request
                .headers
                .iter()
                .map(|(name, value)| {
                    if is_sensitive_header(name) {
                        format!("{name}: <redacted>")
                    } else {
                        redact_sensitive(&format!("{name}: {value}"))
                    }
                })
                .collect();
            debug!(endpoint = %request.endpoint, method = request.method.as_str(), path = %request.path, ?headers, "sending request");
        }

        let mut attempt = 0;
        loop {
            match self.send_once(&request).await {
                Err(TransportError::Connect { message }) if attempt < retries => {
                    attempt += 1;
                    warn!(endpoint = %request.endpoint, attempt, error = %message, "connection failed; retrying");
                    tokio::time::sleep(RETRY_BACKOFF).await;
                }
                other => return other,
            }
        }
    }
}

fn classify(error: reqwest::Error, started: Instant) -> TransportError {
    if error.is_timeout() {
        TransportError::Timeout {
            elapsed_ms: started.elapsed().as_millis().try_into().unwrap_or(u64::MAX),
        }
    } else if error.is_connect() {
        TransportError::Connect {
            message: error.to_string(),
        }
    } else if error.is_builder() {
        TransportError::InvalidRequest {
            message: error.to_string(),
        }
    } else {
        TransportError::Request {
            message: error.to_string(),
        }
    }
}
