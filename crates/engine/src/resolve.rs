//! # Template Resolution and Expression Evaluation
//!
//! Step requests and conditions reference run state through `${{ ... }}`
//! templates. This module resolves them against a [`RunContext`].
//!
//! ## Template Syntax
//!
//! - `${{ vars.NAME }}` / `${{ vars.NAME.path.to[0].field }}` - Variable Store slot
//! - `${{ env.NAME }}` - environment value (process environment overlaid with config)
//! - `${{ steps.STEP.body.data._id }}`, `${{ steps.STEP.status }}` - last response of a step;
//!   `steps.SUITE.STEP...` addresses a step of another suite in the same run
//! - `${{ run.id }}`, `${{ run.timestamp }}`, `${{ run.epoch_ms }}` - run metadata
//! - `${{ vars.NAME ?? "fallback" }}` - literal used when the left side is absent or null
//!
//! A string that consists of exactly one template resolves to the typed JSON
//! value, so `"${{ vars.count }}"` stays a number. Templates embedded in
//! longer strings are rendered as text.
//!
//! ## Usage
//!
//! ```rust
//! use verity_engine::resolve::{RunContext, interpolate_value, eval_condition};
//! use serde_json::json;
//!
//! let mut context = RunContext::default();
//! context.variables.set("catalogId", json!("65f0c1d2e3a4b5c6d7e8f901"), "create_catalog");
//! context.environment_variables.insert("SOURCE".into(), "buyer-app".into());
//!
//! let value = json!({
//!     "catalog": "${{ vars.catalogId }}",
//!     "note": "from ${{ env.SOURCE }}",
//!     "video": "${{ vars.videoId ?? \"vid-default\" }}"
//! });
//!
//! let interpolated = interpolate_value(&value, &context);
//! assert_eq!(interpolated["catalog"], "65f0c1d2e3a4b5c6d7e8f901");
//! assert_eq!(interpolated["note"], "from buyer-app");
//! assert_eq!(interpolated["video"], "vid-default");
//! assert!(eval_condition("env.SOURCE == \"buyer-app\"", &context));
//! ```

use std::collections::HashMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;
use verity_types::HarnessConfig;

use crate::store::VariableStore;

const REFERENCE_PREFIXES: [&str; 4] = ["vars.", "env.", "steps.", "run."];

/// Execution context for resolving step templates and expressions.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    /// Values visible as `env.*`.
    pub environment_variables: HashMap<String, String>,
    /// Run-scoped Variable Store.
    pub variables: VariableStore,
    /// Last recorded response per step, keyed by step id and by `suite.step`.
    pub steps: HashMap<String, Value>,
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new("run")
    }
}

impl RunContext {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            started_at: Utc::now(),
            environment_variables: HashMap::new(),
            variables: VariableStore::new(),
            steps: HashMap::new(),
        }
    }

    /// Builds a context from the process environment and the harness config.
    ///
    /// Config `environment` entries override process variables of the same
    /// name; config `variables` seed the store.
    pub fn from_config(config: &HarnessConfig, run_id: impl Into<String>) -> Self {
        let mut context = Self::new(run_id);
        context.environment_variables = std::env::vars().collect();
        for (name, value) in &config.environment {
            context.environment_variables.insert(name.clone(), value.clone());
        }
        context.variables = VariableStore::seeded(&config.variables, "config");
        context
    }

    /// Same environment and seed values, fresh store state and step records.
    pub fn fork(&self, run_id: impl Into<String>, seed: &VariableStore) -> Self {
        Self {
            run_id: run_id.into(),
            started_at: Utc::now(),
            environment_variables: self.environment_variables.clone(),
            variables: seed.clone(),
            steps: HashMap::new(),
        }
    }

    /// Records a step's response so later templates can reference it.
    pub fn record_step(&mut self, suite: &str, step: &str, record: Value) {
        self.steps.insert(format!("{suite}.{step}"), record.clone());
        self.steps.insert(step.to_string(), record);
    }
}

/// Recursively interpolates all template expressions in a JSON value.
///
/// Unresolvable templates are left in place verbatim; callers that must not
/// send a request with a hole in it check first with
/// [`crate::templates::collect_unresolved_templates_from_value`].
///
/// ```rust
/// use verity_engine::resolve::{RunContext, interpolate_value};
/// use serde_json::json;
///
/// let mut context = RunContext::default();
/// context.variables.set("price", json!(499), "create_listing");
///
/// let body = json!({"price": "${{ vars.price }}", "label": "price ${{ vars.price }}"});
/// let result = interpolate_value(&body, &context);
/// assert_eq!(result["price"], json!(499));
/// assert_eq!(result["label"], "price 499");
/// ```
pub fn interpolate_value(value: &Value, context: &RunContext) -> Value {
    match value {
        Value::String(string_value) => interpolate_string_value(string_value, context),
        Value::Array(array_values) => Value::Array(
            array_values
                .iter()
                .map(|array_value| interpolate_value(array_value, context))
                .collect(),
        ),
        Value::Object(object_map) => {
            let mut interpolated_map = serde_json::Map::new();
            for (key, value) in object_map.iter() {
                interpolated_map.insert(key.clone(), interpolate_value(value, context));
            }
            Value::Object(interpolated_map)
        }
        _ => value.clone(),
    }
}

/// Interpolates a string, always producing text.
pub fn interpolate_text(input_string: &str, context: &RunContext) -> String {
    match interpolate_string_value(input_string, context) {
        Value::String(text) => text,
        other => format_json_value(&other),
    }
}

/// Interpolates a string, passing each resolved value through `encode`
/// before it is spliced in. Literal text is kept as written.
pub fn interpolate_text_with(input_string: &str, context: &RunContext, encode: impl Fn(&str) -> String) -> String {
    interpolate_string(input_string, context, &encode)
}

fn interpolate_string_value(input_string: &str, context: &RunContext) -> Value {
    if let Some(expression) = whole_template_expression(input_string) {
        return resolve_template_expression_value(expression, context).unwrap_or_else(|| Value::String(input_string.to_string()));
    }
    Value::String(interpolate_string(input_string, context, &str::to_string))
}

/// Returns the inner expression when `input` is exactly one `${{ ... }}` template.
fn whole_template_expression(input: &str) -> Option<&str> {
    let trimmed = input.trim();
    let inner = trimmed.strip_prefix("${{")?.strip_suffix("}}")?;
    if inner.contains("${{") || inner.contains("}}") {
        return None;
    }
    Some(inner.trim())
}

fn interpolate_string(input_string: &str, context: &RunContext, encode: &dyn Fn(&str) -> String) -> String {
    let mut output_string = String::new();
    let mut remaining_string = input_string;

    while let Some(template_start) = remaining_string.find("${{") {
        let (string_before_template, string_after_template) = remaining_string.split_at(template_start);
        output_string.push_str(string_before_template);

        if let Some(template_end_index) = string_after_template.find("}}") {
            let template_expression = string_after_template[3..template_end_index].trim();
            match resolve_template_expression_value(template_expression, context) {
                Some(resolved_value) => output_string.push_str(&encode(&format_json_value(&resolved_value))),
                None => output_string.push_str(&string_after_template[..template_end_index + 2]),
            }
            remaining_string = &string_after_template[template_end_index + 2..];
        } else {
            // Unterminated template: keep the rest verbatim.
            output_string.push_str(string_after_template);
            return output_string;
        }
    }

    output_string.push_str(remaining_string);
    output_string
}

/// Resolves a template expression (without delimiters) to a JSON value.
///
/// Returns `None` when the expression references state that does not exist
/// and declares no `??` fallback.
pub fn resolve_template_expression_value(expression: &str, context: &RunContext) -> Option<Value> {
    let expression = expression.trim();
    if let Some((primary, fallback)) = split_fallback(expression) {
        return match resolve_reference(primary, context) {
            Some(value) if !value.is_null() => Some(value),
            _ => Some(parse_literal(fallback)),
        };
    }
    resolve_reference(expression, context)
}

/// Splits `left ?? right` at the first `??` outside a quoted literal.
fn split_fallback(expression: &str) -> Option<(&str, &str)> {
    let mut quote: Option<char> = None;
    let bytes = expression.as_bytes();
    for (index, character) in expression.char_indices() {
        match quote {
            Some(open) if character == open => quote = None,
            Some(_) => {}
            None if character == '"' || character == '\'' => quote = Some(character),
            None if character == '?' && bytes.get(index + 1) == Some(&b'?') => {
                return Some((expression[..index].trim(), expression[index + 2..].trim()));
            }
            None => {}
        }
    }
    None
}

/// Parses a literal: JSON (`"text"`, `42`, `true`, `null`, `[..]`), `'text'`, or a bare word.
fn parse_literal(raw: &str) -> Value {
    let trimmed = raw.trim();
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return value;
    }
    if let Some(inner) = trimmed.strip_prefix('\'').and_then(|rest| rest.strip_suffix('\'')) {
        return Value::String(inner.to_string());
    }
    Value::String(trimmed.to_string())
}

fn is_reference(expression: &str) -> bool {
    REFERENCE_PREFIXES.iter().any(|prefix| expression.starts_with(prefix))
}

/// Resolves a context path into a raw JSON value.
fn resolve_reference(expression: &str, context: &RunContext) -> Option<Value> {
    if let Some(rest) = expression.strip_prefix("vars.") {
        let split_at = rest.find(['.', '[']).unwrap_or(rest.len());
        let (name, path) = rest.split_at(split_at);
        let value = context.variables.get(name)?;
        return select_path(value, Some(path.trim_start_matches('.')));
    }

    if let Some(variable_name) = expression.strip_prefix("env.") {
        return context.environment_variables.get(variable_name).map(|value| Value::String(value.clone()));
    }

    if let Some(rest) = expression.strip_prefix("steps.") {
        let parts: Vec<&str> = rest.split('.').collect();
        if parts.len() >= 2
            && let Some(record) = context.steps.get(&format!("{}.{}", parts[0], parts[1]))
        {
            return select_path(record, Some(parts[2..].join(".").as_str()));
        }
        let record = context.steps.get(*parts.first()?)?;
        return select_path(record, Some(parts[1..].join(".").as_str()));
    }

    match expression {
        "run.id" => Some(Value::String(context.run_id.clone())),
        "run.timestamp" => Some(Value::String(context.started_at.to_rfc3339_opts(SecondsFormat::Millis, true))),
        "run.epoch_ms" => Some(Value::from(context.started_at.timestamp_millis())),
        _ => None,
    }
}

/// Evaluates a conditional expression against the execution context.
///
/// # Supported Operations
///
/// - **Equality**: `left == "right"`, `left != right`
/// - **Membership**: `["a","b"].includes(steps.build.status)`, `vars.list.includes("x")`
/// - **Truthiness**: `vars.flag` (false for absent, null, `false`, `0`, and empty values)
///
/// The expression may optionally be wrapped in `${{ ... }}`.
///
/// ```rust
/// use verity_engine::resolve::{RunContext, eval_condition};
/// use serde_json::json;
///
/// let mut context = RunContext::default();
/// context.variables.set("role", json!("admin"), "login");
///
/// assert!(eval_condition("vars.role == \"admin\"", &context));
/// assert!(eval_condition("${{ vars.role }}", &context));
/// assert!(!eval_condition("vars.missing", &context));
/// ```
pub fn eval_condition(expression: &str, context: &RunContext) -> bool {
    let expression = whole_template_expression(expression).unwrap_or(expression.trim());
    if let Some(result) = evaluate_includes(expression, context) {
        return result;
    }
    if let Some(result) = evaluate_comparison(expression, context) {
        return result;
    }
    resolve_value_or_literal(expression, context).as_ref().is_some_and(is_truthy)
}

/// Lists context references in a condition that do not currently resolve.
pub fn find_unresolved_references_in_condition(expression: &str, context: &RunContext) -> Vec<String> {
    let expression = whole_template_expression(expression).unwrap_or(expression.trim());
    let mut operands: Vec<&str> = Vec::new();
    if let Some(index) = expression.find(".includes(") {
        let (left, right) = expression.split_at(index);
        operands.push(left);
        operands.push(right.trim_start_matches(".includes(").trim().trim_end_matches(')'));
    } else if let Some((left, right)) = expression.split_once("!=").or_else(|| expression.split_once("==")) {
        operands.push(left);
        operands.push(right);
    } else {
        operands.push(expression);
    }

    operands
        .into_iter()
        .map(str::trim)
        .filter(|operand| is_reference(operand) && resolve_template_expression_value(operand, context).is_none())
        .map(str::to_string)
        .collect()
}

/// Evaluates `[...].includes(expr)` style expressions.
///
/// Returns `Some(bool)` if the expression matches the `.includes(...)` shape,
/// otherwise `None` to allow other handlers to process it.
fn evaluate_includes(expression: &str, context: &RunContext) -> Option<bool> {
    let idx = expression.find(".includes(")?;
    let (left, right_with_paren) = expression.split_at(idx);
    let right = right_with_paren.trim_start_matches(".includes(").trim();
    let right = right.strip_suffix(')').unwrap_or(right).trim();

    let list = match resolve_value_or_literal(left.trim(), context) {
        Some(Value::Array(items)) => items,
        Some(Value::String(text)) if text.trim_start().starts_with('[') => serde_json::from_str::<Value>(&text)
            .ok()
            .and_then(|value| value.as_array().cloned())
            .unwrap_or_default(),
        _ => vec![],
    };

    let needle = match resolve_value_or_literal(right, context) {
        Some(value) => format_json_value(&value),
        None => return Some(false),
    };
    Some(list.iter().any(|value| format_json_value(value) == needle))
}

/// Evaluates `left == right` / `left != right`.
/// Returns `Some(bool)` if a comparison operator is present, otherwise `None`.
fn evaluate_comparison(expression: &str, context: &RunContext) -> Option<bool> {
    let (left_expression, right_expression, negate) = if let Some((left, right)) = expression.split_once("!=") {
        (left, right, true)
    } else {
        let (left, right) = expression.split_once("==")?;
        (left, right, false)
    };
    let left_value = resolve_value_or_literal(left_expression, context)
        .map(|value| format_json_value(&value))
        .unwrap_or_default();
    let right_value = resolve_value_or_literal(right_expression, context)
        .map(|value| format_json_value(&value))
        .unwrap_or_default();
    Some((left_value == right_value) != negate)
}

/// Resolve an operand: context references go through the template resolver,
/// anything else is read as a literal.
fn resolve_value_or_literal(expression: &str, context: &RunContext) -> Option<Value> {
    let trimmed = expression.trim();
    if trimmed.is_empty() {
        return None;
    }
    if is_reference(trimmed) {
        return resolve_template_expression_value(trimmed, context);
    }
    Some(parse_literal(trimmed))
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|float| float != 0.0),
        Value::String(text) => !text.is_empty() && text != "false" && text != "0",
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// Formats a JSON value as text: strings as-is, null as empty, everything
/// else in its JSON form.
pub fn format_json_value(value: &Value) -> String {
    match value {
        Value::String(string_value) => string_value.clone(),
        Value::Number(number_value) => number_value.to_string(),
        Value::Bool(boolean_value) => boolean_value.to_string(),
        Value::Null => String::new(),
        _ => value.to_string(),
    }
}

/// Select a nested JSON value by a minimal dot path with optional numeric indices.
///
/// Supports segments like `a`, `a.b`, array indices `a[0].b[1]`, and numeric
/// segments `a.0.b`. Returns `None` when any segment is missing or applied to
/// the wrong JSON type. When `path` is `None` or empty, the input `value` is
/// cloned and returned as-is.
pub fn select_path(value: &Value, path: Option<&str>) -> Option<Value> {
    let Some(path) = path else {
        return Some(value.clone());
    };
    let trimmed = path.trim();
    if trimmed.is_empty() {
        return Some(value.clone());
    }

    let mut current = value;
    for segment in trimmed.split('.') {
        if segment.is_empty() {
            continue;
        }
        let (key, indices) = split_indices(segment)?;
        if !key.is_empty() {
            current = match current {
                Value::Array(items) => items.get(key.parse::<usize>().ok()?)?,
                _ => current.get(key)?,
            };
        }
        for idx in indices {
            current = current.get(idx)?;
        }
    }
    Some(current.clone())
}

fn split_indices(segment: &str) -> Option<(&str, Vec<usize>)> {
    let key_end = segment.find('[').unwrap_or(segment.len());
    let key = &segment[..key_end];
    let mut indices = Vec::new();
    let mut rest = &segment[key_end..];
    while let Some(stripped) = rest.strip_prefix('[') {
        let close = stripped.find(']')?;
        indices.push(stripped[..close].trim().parse::<usize>().ok()?);
        rest = &stripped[close + 1..];
    }
    if !rest.is_empty() {
        return None;
    }
    Some((key, indices))
}
