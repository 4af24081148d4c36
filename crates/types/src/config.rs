//! Harness configuration model.
//!
//! Loading and `${env:...}` / `${secret:...}` interpolation live in
//! `verity-util`; this module only describes the shape of the file.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;
/// Default response-time ceiling applied when a step declares none.
pub const DEFAULT_MAX_ELAPSED_MS: u64 = 3_000;
/// Header carrying the source tag when none is configured.
pub const DEFAULT_SOURCE_HEADER: &str = "X-Source";

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

fn default_max_elapsed_ms() -> u64 {
    DEFAULT_MAX_ELAPSED_MS
}

fn default_source_header() -> String {
    DEFAULT_SOURCE_HEADER.to_string()
}

/// Top-level harness configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HarnessConfig {
    /// Named endpoints; suites select one by name.
    #[serde(default)]
    pub endpoints: IndexMap<String, EndpointConfig>,
    /// Response-time ceiling for steps that declare none.
    #[serde(default = "default_max_elapsed_ms")]
    pub default_max_elapsed_ms: u64,
    /// Slots seeded into every run's variable store.
    #[serde(default)]
    pub variables: IndexMap<String, Value>,
    /// Extra values exposed to templates as `env.*`.
    #[serde(default)]
    pub environment: IndexMap<String, String>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            endpoints: IndexMap::new(),
            default_max_elapsed_ms: DEFAULT_MAX_ELAPSED_MS,
            variables: IndexMap::new(),
            environment: IndexMap::new(),
        }
    }
}

/// Connection settings for one backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EndpointConfig {
    pub base_url: String,
    /// Default headers sent with every request.
    #[serde(default)]
    pub headers: IndexMap<String, String>,
    #[serde(default)]
    pub auth: Option<AuthConfig>,
    /// Value identifying the calling client (for example `buyer-app`).
    #[serde(default)]
    pub source_tag: Option<String>,
    #[serde(default = "default_source_header")]
    pub source_header: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Transport-level retries for connection failures.
    #[serde(default)]
    pub retries: u32,
}

impl EndpointConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            headers: IndexMap::new(),
            auth: None,
            source_tag: None,
            source_header: default_source_header(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            retries: 0,
        }
    }
}

/// Authentication scheme applied as a default header.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum AuthScheme {
    #[default]
    None,
    /// `Authorization: Bearer <token>`
    Bearer,
    /// `Authorization: Basic <token>` (token already base64-encoded)
    Basic,
    /// `<header>: <token>`
    ApiKey,
}

impl AuthScheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthScheme::None => "none",
            AuthScheme::Bearer => "bearer",
            AuthScheme::Basic => "basic",
            AuthScheme::ApiKey => "api_key",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct AuthConfig {
    #[serde(default)]
    pub scheme: AuthScheme,
    #[serde(default)]
    pub token: String,
    /// Header name used by the `api_key` scheme.
    #[serde(default)]
    pub header: Option<String>,
}
