//! Field path parsing and resolution for contract rules.
//!
//! Supports `a.b.c`, `a[0].b`, numeric segments (`a.0.b`), and the `[]`
//! wildcard which fans out over every element of an array.

use serde_json::Value;

/// A parsed field path segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Field(String),
    Index(usize),
    /// `[]`: every element of an array.
    Each,
}

/// Parses a rule path into segments. Malformed bracket groups are kept as
/// literal field names so they simply fail to resolve.
pub fn parse(path: &str) -> Vec<Segment> {
    let path = path.strip_prefix("$.").unwrap_or(path);
    let mut segments = Vec::new();

    for part in path.split('.').filter(|part| !part.is_empty()) {
        let Some(bracket_pos) = part.find('[') else {
            match part.parse::<usize>() {
                Ok(index) => segments.push(Segment::Index(index)),
                Err(_) => segments.push(Segment::Field(part.to_string())),
            }
            continue;
        };

        let field = &part[..bracket_pos];
        if !field.is_empty() {
            segments.push(Segment::Field(field.to_string()));
        }
        let mut rest = &part[bracket_pos..];
        while let Some(stripped) = rest.strip_prefix('[') {
            let Some(close) = stripped.find(']') else {
                segments.push(Segment::Field(rest.to_string()));
                break;
            };
            let inner = stripped[..close].trim();
            match inner {
                "" | "*" => segments.push(Segment::Each),
                other => match other.parse::<usize>() {
                    Ok(index) => segments.push(Segment::Index(index)),
                    Err(_) => segments.push(Segment::Field(format!("[{other}]"))),
                },
            }
            rest = &stripped[close + 1..];
        }
    }

    segments
}

/// One concrete location produced by resolving a path.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved<'a> {
    /// Concrete path with wildcards replaced by element indices.
    pub path: String,
    /// `None` when the location does not exist in the document.
    pub value: Option<&'a Value>,
    /// Element index chosen at each `[]` wildcard on the way here.
    pub wildcards: Vec<usize>,
}

/// Resolves a path against a document, expanding wildcards.
///
/// A wildcard over an empty array yields no locations. A missing segment
/// yields a single location with `value: None` reported at the full path.
pub fn resolve<'a>(document: &'a Value, path: &str) -> Vec<Resolved<'a>> {
    let segments = parse(path);
    let mut out = Vec::new();
    walk(document, &segments, String::new(), Vec::new(), &mut out);
    out
}

/// Returns the first value at `path` (wildcards take the first element).
pub fn lookup<'a>(document: &'a Value, path: &str) -> Option<&'a Value> {
    resolve(document, path).into_iter().find_map(|resolved| resolved.value)
}

/// True when `path` resolves to at least one existing location.
pub fn is_present(document: &Value, path: &str) -> bool {
    resolve(document, path).iter().any(|resolved| resolved.value.is_some())
}

fn walk<'a>(current: &'a Value, segments: &[Segment], prefix: String, wildcards: Vec<usize>, out: &mut Vec<Resolved<'a>>) {
    let Some((segment, rest)) = segments.split_first() else {
        out.push(Resolved {
            path: prefix,
            value: Some(current),
            wildcards,
        });
        return;
    };

    match segment {
        Segment::Field(name) => {
            let next_prefix = join_field(&prefix, name);
            match current.get(name.as_str()) {
                Some(next) => walk(next, rest, next_prefix, wildcards, out),
                None => out.push(missing(next_prefix, rest, wildcards)),
            }
        }
        Segment::Index(index) => {
            let next_prefix = format!("{prefix}[{index}]");
            match current.get(*index) {
                Some(next) => walk(next, rest, next_prefix, wildcards, out),
                None => out.push(missing(next_prefix, rest, wildcards)),
            }
        }
        Segment::Each => match current {
            Value::Array(items) => {
                for (index, item) in items.iter().enumerate() {
                    let mut chosen = wildcards.clone();
                    chosen.push(index);
                    walk(item, rest, format!("{prefix}[{index}]"), chosen, out);
                }
            }
            _ => out.push(missing(format!("{prefix}[]"), rest, wildcards)),
        },
    }
}

fn missing<'a>(prefix: String, rest: &[Segment], wildcards: Vec<usize>) -> Resolved<'a> {
    Resolved {
        path: render(prefix, rest),
        value: None,
        wildcards,
    }
}

fn render(mut prefix: String, segments: &[Segment]) -> String {
    for segment in segments {
        prefix = match segment {
            Segment::Field(name) => join_field(&prefix, name),
            Segment::Index(index) => format!("{prefix}[{index}]"),
            Segment::Each => format!("{prefix}[]"),
        };
    }
    prefix
}

fn join_field(prefix: &str, name: &str) -> String {
    if prefix.is_empty() { name.to_string() } else { format!("{prefix}.{name}") }
}

/// Joins a parent location and a child path for reporting.
pub fn join(parent: &str, child: &str) -> String {
    if parent.is_empty() || parent == "$" {
        child.to_string()
    } else if child.is_empty() {
        parent.to_string()
    } else if child.starts_with('[') {
        format!("{parent}{child}")
    } else {
        format!("{parent}.{child}")
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn parse_handles_indices_wildcards_and_numeric_segments() {
        assert_eq!(
            parse("$.data[0].tags[].name"),
            vec![
                Segment::Field("data".into()),
                Segment::Index(0),
                Segment::Field("tags".into()),
                Segment::Each,
                Segment::Field("name".into()),
            ]
        );
        assert_eq!(parse("items.1"), vec![Segment::Field("items".into()), Segment::Index(1)]);
    }

    #[test]
    fn wildcard_expands_to_concrete_paths() {
        let document = json!({"data": [{"_id": "a"}, {"name": "no id"}]});
        let resolved = resolve(&document, "data[]._id");
        assert_eq!(resolved.len(), 2);
        assert_eq!(resolved[0].path, "data[0]._id");
        assert_eq!(resolved[0].value, Some(&json!("a")));
        assert_eq!(resolved[1].path, "data[1]._id");
        assert_eq!(resolved[1].value, None);
        assert_eq!(resolved[1].wildcards, vec![1]);
    }

    #[test]
    fn missing_intermediate_reports_full_path() {
        let document = json!({"data": {}});
        let resolved = resolve(&document, "data.owner.email");
        assert_eq!(
            resolved,
            vec![Resolved {
                path: "data.owner.email".into(),
                value: None,
                wildcards: Vec::new(),
            }]
        );
    }

    #[test]
    fn wildcard_over_empty_array_yields_nothing() {
        let document = json!({"data": []});
        assert!(resolve(&document, "data[]._id").is_empty());
        assert!(!is_present(&document, "data[]._id"));
    }

    #[test]
    fn join_handles_index_children() {
        assert_eq!(join("data", "[0]"), "data[0]");
        assert_eq!(join("data[0]", "_id"), "data[0]._id");
        assert_eq!(join("", "_id"), "_id");
    }
}
