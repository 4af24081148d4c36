//! Harness configuration discovery, parsing, and interpolation.

use std::{
    env,
    path::{Path, PathBuf},
};

use dirs_next::{config_dir, home_dir};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};
use url::Url;
use verity_types::{AuthScheme, EndpointConfig, HarnessConfig};

use crate::interpolation::{InterpolationError, interpolate_string};

/// Environment variable overriding the configuration file location.
pub const CONFIG_PATH_ENV_VAR: &str = "VERITY_CONFIG_PATH";

/// Errors raised while loading the harness configuration. All of them are
/// fatal: no step runs against a half-resolved configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("failed to interpolate config value at '{location}': {source}")]
    Interpolation {
        location: String,
        #[source]
        source: InterpolationError,
    },

    #[error("endpoint '{endpoint}' has an empty base_url")]
    MissingBaseUrl { endpoint: String },

    #[error("endpoint '{endpoint}' has an invalid base_url '{base_url}': {reason}")]
    InvalidBaseUrl { endpoint: String, base_url: String, reason: String },

    #[error("endpoint '{endpoint}' uses {scheme} auth but has no token")]
    MissingAuthToken { endpoint: String, scheme: &'static str },

    #[error("suite '{suite}' references unknown endpoint '{endpoint}'")]
    UnknownEndpoint { suite: String, endpoint: String },
}

/// Expands a leading `~` to the user's home directory.
pub fn expand_tilde(path: &str) -> PathBuf {
    let p = path.trim();
    if p == "~" {
        return home_dir().unwrap_or_else(|| PathBuf::from("~"));
    }
    if let Some(rest) = p.strip_prefix("~/") {
        return home_dir().unwrap_or_else(|| PathBuf::from("~")).join(rest);
    }
    if let Some(rest) = p.strip_prefix("~\\") {
        return home_dir().unwrap_or_else(|| PathBuf::from("~")).join(rest);
    }
    PathBuf::from(p)
}

/// Get the default path for the harness configuration file.
pub fn default_config_path() -> PathBuf {
    if let Ok(path) = env::var(CONFIG_PATH_ENV_VAR)
        && !path.trim().is_empty()
    {
        return expand_tilde(&path);
    }

    config_dir().unwrap_or_else(|| PathBuf::from(".")).join("verity").join("config.yaml")
}

/// Loads the configuration from an explicit path, or from the default
/// location. A missing file at the default location yields the default
/// configuration; a missing explicit file is an error.
pub fn load_config(explicit: Option<&Path>) -> Result<HarnessConfig, ConfigError> {
    if let Some(path) = explicit {
        return load_config_from_path(path);
    }
    let path = default_config_path();
    if !path.exists() {
        debug!(path = %path.display(), "no config file found; using defaults");
        return Ok(HarnessConfig::default());
    }
    load_config_from_path(&path)
}

/// Reads, interpolates, and validates a configuration file.
///
/// Files ending in `.json` are parsed as JSON; anything else as YAML.
pub fn load_config_from_path(path: &Path) -> Result<HarnessConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let is_json = path.extension().and_then(|ext| ext.to_str()).is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    let mut raw: Value = if is_json {
        serde_json::from_str(&content).map_err(|error| ConfigError::Parse {
            path: path.to_path_buf(),
            message: error.to_string(),
        })?
    } else {
        serde_yaml::from_str(&content).map_err(|error| ConfigError::Parse {
            path: path.to_path_buf(),
            message: error.to_string(),
        })?
    };
    if raw.is_null() {
        raw = Value::Object(Default::default());
    }

    interpolate_value_in_place(&mut raw, "")?;

    let config: HarnessConfig = serde_json::from_value(raw).map_err(|error| ConfigError::Parse {
        path: path.to_path_buf(),
        message: error.to_string(),
    })?;
    validate_config(&config)?;

    info!(path = %path.display(), endpoints = config.endpoints.len(), "loaded harness config");
    Ok(config)
}

/// Checks every configured endpoint with [`validate_endpoint`].
pub fn validate_config(config: &HarnessConfig) -> Result<(), ConfigError> {
    config
        .endpoints
        .iter()
        .try_for_each(|(name, endpoint)| validate_endpoint(name, endpoint))
}

/// Base URL must be non-empty, absolute, http(s), with a host. Any auth
/// scheme other than `none` needs a token.
pub fn validate_endpoint(name: &str, endpoint: &EndpointConfig) -> Result<(), ConfigError> {
    validate_base_url(name, &endpoint.base_url)?;
    if let Some(auth) = &endpoint.auth
        && auth.scheme != AuthScheme::None
        && auth.token.trim().is_empty()
    {
        return Err(ConfigError::MissingAuthToken {
            endpoint: name.to_string(),
            scheme: auth.scheme.as_str(),
        });
    }
    Ok(())
}

pub fn validate_base_url(name: &str, base_url: &str) -> Result<(), ConfigError> {
    let base_url = base_url.trim();
    if base_url.is_empty() {
        return Err(ConfigError::MissingBaseUrl { endpoint: name.to_string() });
    }
    let invalid = |reason: String| ConfigError::InvalidBaseUrl {
        endpoint: name.to_string(),
        base_url: base_url.to_string(),
        reason,
    };
    let parsed = Url::parse(base_url).map_err(|error| invalid(error.to_string()))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme '{}'", parsed.scheme())));
    }
    if parsed.host_str().is_none_or(str::is_empty) {
        return Err(invalid("missing host".to_string()));
    }
    Ok(())
}

/// Ensures every `(suite, endpoint)` reference names a configured endpoint.
pub fn check_endpoint_references<'a>(
    config: &HarnessConfig,
    references: impl IntoIterator<Item = (&'a str, &'a str)>,
) -> Result<(), ConfigError> {
    for (suite, endpoint) in references {
        if !config.endpoints.contains_key(endpoint) {
            return Err(ConfigError::UnknownEndpoint {
                suite: suite.to_string(),
                endpoint: endpoint.to_string(),
            });
        }
    }
    Ok(())
}

fn interpolate_value_in_place(value: &mut Value, location: &str) -> Result<(), ConfigError> {
    match value {
        Value::String(text) => {
            let resolved = interpolate_string(text).map_err(|source| ConfigError::Interpolation {
                location: location.to_string(),
                source,
            })?;
            *text = resolved;
        }
        Value::Array(items) => {
            for (index, item) in items.iter_mut().enumerate() {
                interpolate_value_in_place(item, &format!("{location}[{index}]"))?;
            }
        }
        Value::Object(map) => {
            for (key, item) in map.iter_mut() {
                let child = if location.is_empty() { key.clone() } else { format!("{location}.{key}") };
                interpolate_value_in_place(item, &child)?;
            }
        }
        _ => {}
    }
    Ok(())
}
