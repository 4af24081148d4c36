//! Finding `${{ ... }}` templates that cannot be resolved yet.

use serde_json::Value;

use crate::resolve::{RunContext, resolve_template_expression_value};

/// A template that could not be resolved, with where it was found.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct UnresolvedTemplateRef {
    /// Dotted location inside the step, e.g. `request.body.items[0]`.
    pub source_path: String,
    /// Expression without the `${{ }}` delimiters.
    pub expression: String,
}

impl UnresolvedTemplateRef {
    pub fn describe(&self) -> String {
        format!("unresolved template at {}: ${{{{ {} }}}}", self.source_path, self.expression)
    }
}

/// Trimmed expressions in order of appearance. Empty and unterminated
/// templates are ignored.
pub fn extract_template_expressions(text: &str) -> Vec<String> {
    text.split("${{")
        .skip(1)
        .filter_map(|segment| segment.split_once("}}"))
        .map(|(expression, _)| expression.trim())
        .filter(|expression| !expression.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn collect_unresolved_templates_from_str(
    text: &str,
    source_path: &str,
    context: &RunContext,
    unresolved: &mut Vec<UnresolvedTemplateRef>,
) {
    unresolved.extend(
        extract_template_expressions(text)
            .into_iter()
            .filter(|expression| resolve_template_expression_value(expression, context).is_none())
            .map(|expression| UnresolvedTemplateRef {
                source_path: source_path.to_string(),
                expression,
            }),
    );
}

/// Walks every string leaf of `value`; array elements are located as
/// `path[i]` and object members as `path.key`.
pub fn collect_unresolved_templates_from_value(
    value: &Value,
    source_path: &str,
    context: &RunContext,
    unresolved: &mut Vec<UnresolvedTemplateRef>,
) {
    let mut pending = vec![(source_path.to_string(), value)];
    while let Some((location, current)) = pending.pop() {
        match current {
            Value::String(text) => collect_unresolved_templates_from_str(text, &location, context, unresolved),
            // Pushed in reverse so leaves are visited in document order.
            Value::Array(items) => pending.extend(
                items
                    .iter()
                    .enumerate()
                    .rev()
                    .map(|(index, item)| (format!("{location}[{index}]"), item)),
            ),
            Value::Object(members) => pending.extend(
                members
                    .iter()
                    .rev()
                    .map(|(key, member)| (format!("{location}.{key}"), member)),
            ),
            _ => {}
        }
    }
}
