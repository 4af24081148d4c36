//! HTTP client utilities for the endpoints a harness run talks to.
//!
//! This crate turns an [`EndpointConfig`] into a ready-to-use client:
//!
//! - Constructing an HTTP client with a per-endpoint timeout
//! - Applying default headers, the configured auth scheme, and the source tag
//! - Validating the endpoint (base URL, auth token) before any request is built
//!
//! The primary entry point is [`ApiClient`]. Create one per endpoint with
//! [`ApiClient::from_endpoint`], or all of them at once with
//! [`ApiClients::from_config`], then build requests with
//! [`ApiClient::request`].
//!
//! # Example
//!
//! ```ignore
//! use verity_api::ApiClient;
//! use verity_types::EndpointConfig;
//!
//! let client = ApiClient::from_endpoint("default", &EndpointConfig::new("http://localhost:8080"))?;
//! let response = client.request(reqwest::Method::GET, "/health").send().await?;
//! println!("status: {}", response.status());
//! ```

use std::{env, time::Duration};

use anyhow::{Context, Result, anyhow};
use indexmap::IndexMap;
use reqwest::{
    Client, RequestBuilder,
    header::{self, HeaderMap, HeaderName, HeaderValue},
};
use tracing::debug;
use verity_types::{AuthScheme, EndpointConfig, HarnessConfig};
use verity_util::validate_endpoint;

/// Header used by the `api_key` auth scheme when none is configured.
const DEFAULT_API_KEY_HEADER: &str = "X-Api-Key";

/// Thin wrapper around a configured `reqwest::Client` for one endpoint.
///
/// The client pre-configures default headers and builds requests against a
/// validated base URL.
#[derive(Debug, Clone)]
pub struct ApiClient {
    pub name: String,
    pub base_url: String,
    pub http: Client,
    pub user_agent: String,
    pub timeout: Duration,
    /// Transport-level retries for connection failures.
    pub retries: u32,
}

impl ApiClient {
    /// Construct an [`ApiClient`] from an endpoint entry of the harness config.
    ///
    /// Header precedence, lowest first: the JSON `Accept` default, configured
    /// `headers`, the source tag, then authentication.
    pub fn from_endpoint(name: &str, endpoint: &EndpointConfig) -> Result<Self> {
        validate_endpoint(name, endpoint)?;
        let base_url = endpoint.base_url.trim().trim_end_matches('/').to_string();

        let mut default_headers = HeaderMap::new();
        default_headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        for (key, value) in &endpoint.headers {
            insert_header(&mut default_headers, key, value).with_context(|| format!("endpoint '{name}' header '{key}'"))?;
        }
        if let Some(source_tag) = endpoint.source_tag.as_deref()
            && !source_tag.is_empty()
        {
            insert_header(&mut default_headers, &endpoint.source_header, source_tag)
                .with_context(|| format!("endpoint '{name}' source header"))?;
        }
        if let Some(auth) = &endpoint.auth {
            match auth.scheme {
                AuthScheme::None => {}
                AuthScheme::Bearer => insert_header(&mut default_headers, "Authorization", &format!("Bearer {}", auth.token))?,
                AuthScheme::Basic => insert_header(&mut default_headers, "Authorization", &format!("Basic {}", auth.token))?,
                AuthScheme::ApiKey => {
                    let header_name = auth.header.as_deref().unwrap_or(DEFAULT_API_KEY_HEADER);
                    insert_header(&mut default_headers, header_name, &auth.token)?;
                }
            }
        }

        let timeout = Duration::from_millis(endpoint.timeout_ms);
        let http = Client::builder()
            .default_headers(default_headers)
            .timeout(timeout)
            .build()
            .context("build http client")?;

        Ok(Self {
            name: name.to_string(),
            base_url,
            http,
            user_agent: format!("verity/{}; {}", env!("CARGO_PKG_VERSION"), env::consts::OS),
            timeout,
            retries: endpoint.retries,
        })
    }

    /// Absolute URL for an endpoint-relative path.
    pub fn url_for(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    /// Build a `reqwest::RequestBuilder` for a method and endpoint-relative path.
    pub fn request(&self, method: reqwest::Method, path: &str) -> RequestBuilder {
        let url = self.url_for(path);
        debug!(endpoint = %self.name, %url, "building request");

        self.http.request(method, url).header(header::USER_AGENT, &self.user_agent)
    }
}

/// Clients for every configured endpoint, keyed by endpoint name.
#[derive(Debug, Clone, Default)]
pub struct ApiClients {
    clients: IndexMap<String, ApiClient>,
}

impl ApiClients {
    pub fn from_config(config: &HarnessConfig) -> Result<Self> {
        let mut clients = IndexMap::new();
        for (name, endpoint) in &config.endpoints {
            clients.insert(name.clone(), ApiClient::from_endpoint(name, endpoint)?);
        }
        Ok(Self { clients })
    }

    pub fn insert(&mut self, client: ApiClient) {
        self.clients.insert(client.name.clone(), client);
    }

    pub fn get(&self, name: &str) -> Option<&ApiClient> {
        self.clients.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.clients.keys().map(String::as_str)
    }
}

fn insert_header(headers: &mut HeaderMap, name: &str, value: &str) -> Result<()> {
    let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| anyhow!("invalid header name '{}': {}", name, e))?;
    let header_value = HeaderValue::from_str(value).map_err(|e| anyhow!("invalid value for header '{}': {}", name, e))?;
    headers.insert(header_name, header_value);
    Ok(())
}

#[cfg(test)]
mod tests {
    use verity_types::AuthConfig;

    use super::*;

    #[test]
    fn localhost_http_is_accepted() {
        assert!(ApiClient::from_endpoint("default", &EndpointConfig::new("http://localhost:8080")).is_ok());
        assert!(ApiClient::from_endpoint("default", &EndpointConfig::new("https://api.example.com/v2")).is_ok());
    }

    #[test]
    fn invalid_endpoints_are_rejected() {
        for base_url in ["", "ftp://files.example.com", "/relative/only"] {
            assert!(ApiClient::from_endpoint("default", &EndpointConfig::new(base_url)).is_err(), "{base_url:?} accepted");
        }
        let mut endpoint = EndpointConfig::new("https://api.example.com");
        endpoint.auth = Some(AuthConfig {
            scheme: AuthScheme::Basic,
            token: String::new(),
            header: None,
        });
        let error = ApiClient::from_endpoint("default", &endpoint).expect_err("token required");
        assert_eq!(error.to_string(), "endpoint 'default' uses basic auth but has no token");
    }

    #[test]
    fn url_for_joins_paths_without_double_slashes() {
        let client = ApiClient::from_endpoint("default", &EndpointConfig::new("https://api.example.com/")).expect("client");
        assert_eq!(client.url_for("/catalog"), "https://api.example.com/catalog");
        assert_eq!(client.url_for("catalog"), "https://api.example.com/catalog");
    }

    #[test]
    fn invalid_header_values_fail_construction() {
        let mut endpoint = EndpointConfig::new("https://api.example.com");
        endpoint.auth = Some(AuthConfig {
            scheme: AuthScheme::Bearer,
            token: "line\nbreak".to_string(),
            header: None,
        });
        assert!(ApiClient::from_endpoint("default", &endpoint).is_err());
    }

    #[test]
    fn clients_are_built_for_every_endpoint() {
        let mut config = HarnessConfig::default();
        config.endpoints.insert("default".into(), EndpointConfig::new("https://api.example.com"));
        config.endpoints.insert("admin".into(), EndpointConfig::new("https://admin.example.com"));
        let clients = ApiClients::from_config(&config).expect("clients");
        assert_eq!(clients.names().collect::<Vec<_>>(), vec!["default", "admin"]);
        assert_eq!(clients.get("admin").map(|c| c.base_url.as_str()), Some("https://admin.example.com"));
    }
}
