//! Leaf helpers shared by the Verity engine, client, and CLI.

pub mod config_loader;
pub mod http;
pub mod interpolation;

use once_cell::sync::Lazy;
use regex::Regex;

pub use config_loader::{
    ConfigError, check_endpoint_references, default_config_path, expand_tilde, load_config, load_config_from_path, validate_base_url,
    validate_config, validate_endpoint,
};
pub use http::{DecodeError, build_path, decode_response_body};
pub use interpolation::{InterpolationError, SecretsBackend, has_placeholders, interpolate_string, resolve_secret, secrets_backend};

static SENSITIVE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)(authorization: )([\w\-\.=:/+ ]+)",
        r"(?i)(x-api-key: )([^\s]+)",
        r"(?i)([A-Z0-9_]*?(?:KEY|TOKEN|SECRET|PASSWORD)=)([^\s]+)",
        r#"(?i)("(?:token|accessToken|refreshToken|password)"\s*:\s*)("[^"]*")"#,
    ]
    .iter()
    .filter_map(|pattern| Regex::new(pattern).ok())
    .collect()
});

/// Redacts values that look like secrets in a string.
pub fn redact_sensitive(input: &str) -> String {
    let mut redacted = input.to_string();
    for regex in SENSITIVE_PATTERNS.iter() {
        redacted = regex
            .replace_all(&redacted, |caps: &regex::Captures| {
                let prefix = caps.get(1).map(|m| m.as_str()).unwrap_or("");
                format!("{}<redacted>", prefix)
            })
            .to_string();
    }
    redacted
}

/// Returns true when a header carries credentials and must not be logged verbatim.
pub fn is_sensitive_header(name: &str) -> bool {
    let lowered = name.to_ascii_lowercase();
    lowered == "authorization" || lowered == "cookie" || lowered.contains("token") || lowered.contains("api-key")
}
