//! Response body decoding.

use serde_json::Value;
use thiserror::Error;

/// Decodes a raw response body into a JSON document.
///
/// An empty (or whitespace-only) body decodes to `null`; unknown fields are
/// kept as-is and never cause a failure. Anything that is not valid JSON is
/// reported with the status code and a collapsed preview of the body.
///
/// ```rust
/// use verity_util::decode_response_body;
///
/// let value = decode_response_body(br#"{"data": {"_id": "abc123"}}"#, 200).unwrap();
/// assert_eq!(value["data"]["_id"], "abc123");
/// assert!(decode_response_body(b"", 204).unwrap().is_null());
/// assert!(decode_response_body(b"<html>", 502).is_err());
/// ```
pub fn decode_response_body(body: &[u8], status: u16) -> Result<Value, DecodeError> {
    let text = String::from_utf8_lossy(body);
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str::<Value>(&text).map_err(|source| DecodeError {
        status,
        body_preview: truncate_response_preview(&text, 200),
        source,
    })
}

fn truncate_response_preview(text: &str, limit: usize) -> String {
    let mut preview = String::new();
    for ch in text.chars() {
        if preview.len() >= limit {
            preview.push_str("...");
            break;
        }
        match ch {
            '\n' | '\r' | '\t' => {
                if !preview.ends_with(' ') {
                    preview.push(' ');
                }
            }
            _ => preview.push(ch),
        }
    }
    preview.trim().to_string()
}

/// Error returned when a response body is not valid JSON.
#[derive(Debug, Error)]
#[error("failed to decode JSON response (status {status}): {source}. body preview: {body_preview}")]
pub struct DecodeError {
    pub status: u16,
    pub body_preview: String,
    #[source]
    pub source: serde_json::Error,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whitespace_body_decodes_to_null() {
        assert_eq!(decode_response_body(b"  \n", 200).expect("decode"), Value::Null);
    }

    #[test]
    fn decode_error_collapses_newlines_in_preview() {
        let error = decode_response_body(b"<html>\n<body>Bad gateway</body>\n</html>", 502).expect_err("not json");
        assert_eq!(error.status, 502);
        assert_eq!(error.body_preview, "<html> <body>Bad gateway</body> </html>");
        assert!(error.to_string().contains("status 502"));
    }

    #[test]
    fn long_previews_are_truncated() {
        let body = "x".repeat(500);
        let error = decode_response_body(body.as_bytes(), 500).expect_err("not json");
        assert!(error.body_preview.ends_with("..."));
        assert!(error.body_preview.len() <= 203);
    }
}
