//! Declarative response shape contracts and the violations they produce.
//!
//! A [`ShapeContract`] is a tree of [`FieldRule`]s. Rules address fields by a
//! dot path (`data.items[0]._id`, with `[]` meaning "every element"), declare
//! whether the field must be present, and attach optional constraints. The
//! validator in the engine walks the tree and reports every mismatch as a
//! [`Violation`].

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Expected shape of a decoded response body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ShapeContract {
    /// Optional type constraint on the document root.
    #[serde(default)]
    pub root: Option<FieldType>,
    /// Field rules evaluated against the document root.
    #[serde(default)]
    pub fields: Vec<FieldRule>,
}

impl ShapeContract {
    /// True when the contract places no constraint on the body.
    pub fn is_empty(&self) -> bool {
        self.root.is_none() && self.fields.is_empty()
    }
}

fn default_required() -> bool {
    true
}

/// A single node of a shape contract.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FieldRule {
    /// Dot path relative to the enclosing value.
    pub path: String,
    /// Alternate names tried in order when `path` is absent.
    #[serde(default)]
    pub aliases: Vec<String>,
    /// Whether absence is a violation. Defaults to true.
    #[serde(default = "default_required")]
    pub required: bool,
    /// Whether an explicit `null` satisfies the type constraint.
    #[serde(default)]
    pub nullable: bool,
    #[serde(default, rename = "type")]
    pub field_type: Option<FieldType>,
    /// Regular expression the string value must match.
    #[serde(default)]
    pub pattern: Option<String>,
    /// Named format with a built-in pattern.
    #[serde(default)]
    pub format: Option<FieldFormat>,
    #[serde(default)]
    pub minimum: Option<f64>,
    #[serde(default)]
    pub maximum: Option<f64>,
    #[serde(default)]
    pub exclusive_minimum: Option<f64>,
    #[serde(default)]
    pub exclusive_maximum: Option<f64>,
    /// Minimum length (characters for strings, items for arrays).
    #[serde(default)]
    pub min_length: Option<usize>,
    /// Maximum length (characters for strings, items for arrays).
    #[serde(default)]
    pub max_length: Option<usize>,
    /// Allowed literal values.
    #[serde(default, rename = "enum")]
    pub allowed_values: Vec<Value>,
    /// Equality against another field or a resolved value.
    #[serde(default)]
    pub equals: Option<EqualsTarget>,
    /// The rule only requires presence when this path is present.
    #[serde(default)]
    pub present_if: Option<String>,
    /// Child rules evaluated relative to this field (per element for arrays).
    #[serde(default)]
    pub fields: Vec<FieldRule>,
}

impl Default for FieldRule {
    fn default() -> Self {
        Self {
            path: String::new(),
            aliases: Vec::new(),
            required: true,
            nullable: false,
            field_type: None,
            pattern: None,
            format: None,
            minimum: None,
            maximum: None,
            exclusive_minimum: None,
            exclusive_maximum: None,
            min_length: None,
            max_length: None,
            allowed_values: Vec::new(),
            equals: None,
            present_if: None,
            fields: Vec::new(),
        }
    }
}

/// Target of an equality rule.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum EqualsTarget {
    /// Another path in the same document (resolved from the document root).
    Field(String),
    /// A literal, usually a `${{ vars.name }}` template resolved before validation.
    Value(Value),
}

/// JSON types a field may be constrained to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    String,
    Integer,
    Number,
    Boolean,
    Object,
    Array,
    Null,
    Any,
}

impl FieldType {
    /// Returns true when `value` has this type. Integers satisfy `number`.
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            FieldType::String => value.is_string(),
            FieldType::Integer => is_integral(value),
            FieldType::Number => value.is_number(),
            FieldType::Boolean => value.is_boolean(),
            FieldType::Object => value.is_object(),
            FieldType::Array => value.is_array(),
            FieldType::Null => value.is_null(),
            FieldType::Any => true,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Integer => "integer",
            FieldType::Number => "number",
            FieldType::Boolean => "boolean",
            FieldType::Object => "object",
            FieldType::Array => "array",
            FieldType::Null => "null",
            FieldType::Any => "any",
        }
    }

    /// Names the type of an actual JSON value.
    pub fn describe(value: &Value) -> &'static str {
        match value {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) if is_integral(value) => "integer",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
        }
    }
}

fn is_integral(value: &Value) -> bool {
    match value {
        Value::Number(number) => number.is_i64() || number.is_u64() || number.as_f64().is_some_and(|float| float.fract() == 0.0),
        _ => false,
    }
}

/// Named formats with built-in validation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FieldFormat {
    /// `+` followed by 10 to 15 digits.
    Phone,
    /// 24 hexadecimal characters.
    ObjectId,
    Email,
    Uri,
    /// RFC 3339 timestamp.
    DateTime,
    Uuid,
}

impl FieldFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldFormat::Phone => "phone",
            FieldFormat::ObjectId => "object_id",
            FieldFormat::Email => "email",
            FieldFormat::Uri => "uri",
            FieldFormat::DateTime => "date_time",
            FieldFormat::Uuid => "uuid",
        }
    }
}

/// A single detected mismatch between a response and its contract.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Violation {
    MissingField {
        path: String,
    },
    TypeMismatch {
        path: String,
        expected: String,
        actual: String,
    },
    ConstraintViolation {
        path: String,
        constraint: String,
        detail: String,
    },
    ConsistencyViolation {
        path: String,
        expected: Value,
        actual: Value,
    },
    EnumViolation {
        path: String,
        allowed: Vec<Value>,
        actual: Value,
    },
}

impl Violation {
    /// Path of the offending field.
    pub fn path(&self) -> &str {
        match self {
            Violation::MissingField { path }
            | Violation::TypeMismatch { path, .. }
            | Violation::ConstraintViolation { path, .. }
            | Violation::ConsistencyViolation { path, .. }
            | Violation::EnumViolation { path, .. } => path,
        }
    }

    /// Short machine-friendly kind label.
    pub fn kind(&self) -> &'static str {
        match self {
            Violation::MissingField { .. } => "missing_field",
            Violation::TypeMismatch { .. } => "type_mismatch",
            Violation::ConstraintViolation { .. } => "constraint_violation",
            Violation::ConsistencyViolation { .. } => "consistency_violation",
            Violation::EnumViolation { .. } => "enum_violation",
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::MissingField { path } => write!(f, "{path}: required field is missing"),
            Violation::TypeMismatch { path, expected, actual } => {
                write!(f, "{path}: expected {expected}, got {actual}")
            }
            Violation::ConstraintViolation { path, constraint, detail } => {
                write!(f, "{path}: {constraint} constraint failed ({detail})")
            }
            Violation::ConsistencyViolation { path, expected, actual } => {
                write!(f, "{path}: expected {expected}, got {actual}")
            }
            Violation::EnumViolation { path, allowed, actual } => {
                let allowed = allowed.iter().map(Value::to_string).collect::<Vec<_>>().join(", ");
                write!(f, "{path}: {actual} is not one of [{allowed}]")
            }
        }
    }
}
