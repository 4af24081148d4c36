//! Shape Validator.
//!
//! [`validate`] checks a decoded response against a [`ShapeContract`] and
//! returns every violation it finds. It never short-circuits and never
//! panics: a malformed rule (for example an invalid regex) is itself reported
//! as a violation.
//!
//! For each rule, checks run in a fixed order: presence, type, then
//! format/pattern/bounds/length, then equality, then enum, then child rules.
//!
//! ```rust
//! use serde_json::json;
//! use verity_engine::contract::validate;
//! use verity_types::{FieldFormat, FieldRule, ShapeContract};
//!
//! let contract = ShapeContract {
//!     root: None,
//!     fields: vec![FieldRule {
//!         path: "data.phone".into(),
//!         format: Some(FieldFormat::Phone),
//!         ..Default::default()
//!     }],
//! };
//! assert!(validate(&json!({"data": {"phone": "+91620484373"}}), &contract).is_empty());
//! assert_eq!(validate(&json!({"data": {"phone": "620484373"}}), &contract).len(), 1);
//! ```

pub mod formats;
pub mod paths;

use regex::Regex;
use serde_json::Value;
use verity_types::{EqualsTarget, FieldRule, FieldType, ShapeContract, Violation};

use self::{formats::check_format, paths::Resolved};
use crate::resolve::format_json_value;

/// Validates `document` against `contract`, collecting every violation.
pub fn validate(document: &Value, contract: &ShapeContract) -> Vec<Violation> {
    let mut violations = Vec::new();
    if let Some(root_type) = contract.root
        && !root_type.matches(document)
    {
        violations.push(Violation::TypeMismatch {
            path: "$".to_string(),
            expected: root_type.as_str().to_string(),
            actual: FieldType::describe(document).to_string(),
        });
    }
    check_rules(document, document, &contract.fields, "", &mut violations);
    violations
}

fn check_rules(base: &Value, root: &Value, rules: &[FieldRule], location: &str, violations: &mut Vec<Violation>) {
    for rule in rules {
        let required = rule.required && rule.present_if.as_deref().is_none_or(|condition| paths::is_present(base, condition));

        for resolved in resolve_with_aliases(base, rule) {
            let path = paths::join(location, &resolved.path);
            match resolved.value {
                None if required => violations.push(Violation::MissingField { path }),
                None => {}
                Some(value) => check_value(value, root, rule, &path, violations),
            }
        }
    }
}

/// Resolves the primary path and fills each missing location from the
/// aliases, tried in order.
///
/// When the primary exists nowhere, the first alias that resolves anywhere
/// replaces it wholesale. Otherwise a missing primary location takes the
/// alias location reached through the same wildcard elements, so mixed
/// arrays (`{"_id": ..}` next to `{"id": ..}`) validate per element.
fn resolve_with_aliases<'a>(base: &'a Value, rule: &FieldRule) -> Vec<Resolved<'a>> {
    let primary = paths::resolve(base, &rule.path);
    if rule.aliases.is_empty() {
        return primary;
    }
    let alternates: Vec<Vec<Resolved<'a>>> = rule.aliases.iter().map(|alias| paths::resolve(base, alias)).collect();

    if !primary.iter().any(|resolved| resolved.value.is_some()) {
        return alternates
            .into_iter()
            .find(|candidate| candidate.iter().any(|resolved| resolved.value.is_some()))
            .unwrap_or(primary);
    }

    primary
        .into_iter()
        .map(|resolved| {
            if resolved.value.is_some() {
                return resolved;
            }
            alternates
                .iter()
                .flatten()
                .find(|alternate| alternate.value.is_some() && alternate.wildcards == resolved.wildcards)
                .cloned()
                .unwrap_or(resolved)
        })
        .collect()
}

fn check_value(value: &Value, root: &Value, rule: &FieldRule, path: &str, violations: &mut Vec<Violation>) {
    if value.is_null() {
        let null_allowed = rule.nullable || matches!(rule.field_type, Some(FieldType::Null | FieldType::Any));
        if !null_allowed {
            violations.push(Violation::TypeMismatch {
                path: path.to_string(),
                expected: rule.field_type.map_or("non-null", |field_type| field_type.as_str()).to_string(),
                actual: "null".to_string(),
            });
        }
        return;
    }

    if let Some(field_type) = rule.field_type
        && !field_type.matches(value)
    {
        violations.push(Violation::TypeMismatch {
            path: path.to_string(),
            expected: field_type.as_str().to_string(),
            actual: FieldType::describe(value).to_string(),
        });
    }

    check_constraints(value, rule, path, violations);
    check_equality(value, root, rule, path, violations);

    if !rule.allowed_values.is_empty() && !rule.allowed_values.iter().any(|allowed| values_equal(allowed, value)) {
        violations.push(Violation::EnumViolation {
            path: path.to_string(),
            allowed: rule.allowed_values.clone(),
            actual: value.clone(),
        });
    }

    if !rule.fields.is_empty() {
        match value {
            Value::Array(items) => {
                for (index, item) in items.iter().enumerate() {
                    check_rules(item, root, &rule.fields, &format!("{path}[{index}]"), violations);
                }
            }
            Value::Object(_) => check_rules(value, root, &rule.fields, path, violations),
            _ => {}
        }
    }
}

fn check_constraints(value: &Value, rule: &FieldRule, path: &str, violations: &mut Vec<Violation>) {
    let mut constraint = |name: &str, detail: String| {
        violations.push(Violation::ConstraintViolation {
            path: path.to_string(),
            constraint: name.to_string(),
            detail,
        });
    };
    let untyped = rule.field_type.is_none();

    if let Some(pattern) = &rule.pattern {
        match (Regex::new(pattern), value) {
            (Err(error), _) => constraint("pattern", format!("invalid pattern '{pattern}': {error}")),
            (Ok(regex), Value::String(_) | Value::Number(_)) => {
                let text = format_json_value(value);
                if !regex.is_match(&text) {
                    constraint("pattern", format!("'{text}' does not match '{pattern}'"));
                }
            }
            (Ok(_), other) if untyped => {
                constraint("pattern", format!("expected a string, found {}", FieldType::describe(other)));
            }
            _ => {}
        }
    }

    if let Some(format) = rule.format {
        match value.as_str() {
            Some(text) => {
                if let Err(detail) = check_format(format, text) {
                    constraint(format.as_str(), detail);
                }
            }
            None if untyped => constraint(format.as_str(), format!("expected a string, found {}", FieldType::describe(value))),
            None => {}
        }
    }

    let has_bounds =
        rule.minimum.is_some() || rule.maximum.is_some() || rule.exclusive_minimum.is_some() || rule.exclusive_maximum.is_some();
    if has_bounds {
        match value.as_f64() {
            Some(number) => {
                if let Some(minimum) = rule.minimum
                    && number < minimum
                {
                    constraint("minimum", format!("{number} is less than {minimum}"));
                }
                if let Some(maximum) = rule.maximum
                    && number > maximum
                {
                    constraint("maximum", format!("{number} is greater than {maximum}"));
                }
                if let Some(bound) = rule.exclusive_minimum
                    && number <= bound
                {
                    constraint("exclusive_minimum", format!("{number} must be greater than {bound}"));
                }
                if let Some(bound) = rule.exclusive_maximum
                    && number >= bound
                {
                    constraint("exclusive_maximum", format!("{number} must be less than {bound}"));
                }
            }
            None if untyped => constraint("bounds", format!("expected a number, found {}", FieldType::describe(value))),
            None => {}
        }
    }

    if rule.min_length.is_some() || rule.max_length.is_some() {
        let length = match value {
            Value::String(text) => Some(text.chars().count()),
            Value::Array(items) => Some(items.len()),
            _ => None,
        };
        if let Some(length) = length {
            if let Some(min_length) = rule.min_length
                && length < min_length
            {
                constraint("min_length", format!("length {length} is less than {min_length}"));
            }
            if let Some(max_length) = rule.max_length
                && length > max_length
            {
                constraint("max_length", format!("length {length} is greater than {max_length}"));
            }
        }
    }
}

fn check_equality(value: &Value, root: &Value, rule: &FieldRule, path: &str, violations: &mut Vec<Violation>) {
    let expected = match &rule.equals {
        None => return,
        Some(EqualsTarget::Field(other)) => paths::lookup(root, other).cloned().unwrap_or(Value::Null),
        Some(EqualsTarget::Value(expected)) => expected.clone(),
    };
    if !values_equal(&expected, value) {
        violations.push(Violation::ConsistencyViolation {
            path: path.to_string(),
            expected,
            actual: value.clone(),
        });
    }
}

/// JSON equality where numbers compare by value (`5 == 5.0`).
pub fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => match (a.as_i64(), b.as_i64()) {
            (Some(a), Some(b)) => a == b,
            _ => a.as_f64() == b.as_f64(),
        },
        _ => left == right,
    }
}
