//! `${env:NAME}` and `${secret:NAME}` placeholders in configuration values.
//!
//! Secrets come from the OS keychain (service `verity`) unless
//! `VERITY_SECRETS_BACKEND=env`, in which case they are read from the process
//! environment like `${env:...}`.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use thiserror::Error;
use tracing::debug;

const KEYCHAIN_SERVICE: &str = "verity";
/// Selects where `${secret:NAME}` values come from.
pub const SECRETS_BACKEND_ENV_VAR: &str = "VERITY_SECRETS_BACKEND";

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{(env|secret):([A-Za-z0-9_.+-]*)\}").expect("valid config placeholder regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretsBackend {
    Keychain,
    Environment,
}

/// Reads [`SECRETS_BACKEND_ENV_VAR`]; anything other than `env` means the
/// keychain.
pub fn secrets_backend() -> SecretsBackend {
    match std::env::var(SECRETS_BACKEND_ENV_VAR) {
        Ok(value) if value.trim().eq_ignore_ascii_case("env") => SecretsBackend::Environment,
        _ => SecretsBackend::Keychain,
    }
}

pub fn has_placeholders(value: &str) -> bool {
    PLACEHOLDER.is_match(value)
}

/// Replaces every placeholder in `value`, failing on the first one that
/// cannot be resolved. Text outside placeholders is kept as is.
pub fn interpolate_string(value: &str) -> Result<String, InterpolationError> {
    let mut output = String::with_capacity(value.len());
    let mut cursor = 0;
    for captures in PLACEHOLDER.captures_iter(value) {
        let Some(placeholder) = captures.get(0) else {
            continue;
        };
        output.push_str(&value[cursor..placeholder.start()]);
        output.push_str(&resolve_placeholder(&captures)?);
        cursor = placeholder.end();
    }
    output.push_str(&value[cursor..]);
    Ok(output)
}

fn resolve_placeholder(captures: &Captures<'_>) -> Result<String, InterpolationError> {
    let name = &captures[2];
    if &captures[1] == "env" {
        debug!(variable = name, "resolving config env placeholder");
        return std::env::var(name).map_err(|_| InterpolationError::MissingEnvVar { name: name.to_string() });
    }
    debug!(secret = name, "resolving config secret placeholder");
    resolve_secret(name)
}

/// Looks up one secret through the active backend.
pub fn resolve_secret(name: &str) -> Result<String, InterpolationError> {
    let missing = |reason: String| InterpolationError::MissingSecret {
        name: name.to_string(),
        reason,
    };
    match secrets_backend() {
        SecretsBackend::Environment => std::env::var(name).map_err(|error| missing(error.to_string())),
        SecretsBackend::Keychain => {
            let entry = keyring::Entry::new(KEYCHAIN_SERVICE, name).map_err(|error| InterpolationError::Keychain {
                name: name.to_string(),
                reason: error.to_string(),
            })?;
            entry.get_password().map_err(|error| missing(error.to_string()))
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InterpolationError {
    #[error("environment variable '{name}' is not set")]
    MissingEnvVar { name: String },

    #[error("secret '{name}' is unavailable: {reason}")]
    MissingSecret { name: String, reason: String },

    #[error("keychain lookup for '{name}' failed: {reason}")]
    Keychain { name: String, reason: String },
}
