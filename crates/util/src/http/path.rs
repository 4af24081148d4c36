use indexmap::IndexMap;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde_json::Value;

/// Bytes left untouched in path placeholder values (RFC 3986 unreserved).
const PATH_VALUE: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'.').remove(b'_').remove(b'~');

/// Fills `{name}` placeholders of a path template.
///
/// Values are percent-encoded so an identifier containing `/` or spaces cannot
/// change the shape of the path. Placeholders without a value are left as-is.
///
/// ```rust
/// use indexmap::IndexMap;
/// use serde_json::json;
/// use verity_util::build_path;
///
/// let mut params = IndexMap::new();
/// params.insert("catalogId".to_string(), json!("65f0c1d2e3a4b5c6d7e8f901"));
/// assert_eq!(build_path("/catalog/{catalogId}", &params), "/catalog/65f0c1d2e3a4b5c6d7e8f901");
/// ```
pub fn build_path(template: &str, variables: &IndexMap<String, Value>) -> String {
    let mut path = template.to_string();
    for (key, value) in variables {
        let raw = match value {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        };
        path = path.replace(&format!("{{{}}}", key), &encode_path_segment(&raw));
    }
    path
}

/// Percent-encodes one path segment, keeping only RFC 3986 unreserved bytes.
pub fn encode_path_segment(raw: &str) -> String {
    utf8_percent_encode(raw, PATH_VALUE).to_string()
}

/// Lists `{name}` placeholders still present in a path.
pub fn unfilled_placeholders(path: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut remainder = path;
    while let Some(start) = remainder.find('{') {
        let after = &remainder[start + 1..];
        let Some(end) = after.find('}') else {
            break;
        };
        let name = &after[..end];
        if !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
            names.push(name.to_string());
        }
        remainder = &after[end + 1..];
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn build_path_preserves_unreserved_identifier_bytes() {
        let mut variables = IndexMap::new();
        variables.insert("videoId".to_string(), json!("vid-d5f6a7b8"));

        let path = build_path("/v1/videos/{videoId}/tags", &variables);
        assert_eq!(path, "/v1/videos/vid-d5f6a7b8/tags");
    }

    #[test]
    fn build_path_encodes_reserved_bytes_for_placeholder_values() {
        let mut variables = IndexMap::new();
        variables.insert("title".to_string(), json!("team/summer sale"));

        let path = build_path("/catalog/by-title/{title}", &variables);
        assert_eq!(path, "/catalog/by-title/team%2Fsummer%20sale");
    }

    #[test]
    fn build_path_renders_numbers_without_quotes() {
        let mut variables = IndexMap::new();
        variables.insert("page".to_string(), json!(3));
        assert_eq!(build_path("/pages/{page}", &variables), "/pages/3");
    }

    #[test]
    fn unfilled_placeholders_lists_remaining_names() {
        assert_eq!(unfilled_placeholders("/catalog/{catalogId}/video/{videoId}"), vec!["catalogId", "videoId"]);
        assert!(unfilled_placeholders("/catalog/abc").is_empty());
    }
}
