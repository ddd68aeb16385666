//! Value shapes and validation results.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// One validation finding at a specific location in the value tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    /// Dotted path from the root, e.g. `a.items.2`. Empty for the root.
    pub path: String,
    pub message: String,
    pub code: IssueCode,
}

impl ValidationIssue {
    pub fn new(path: impl Into<String>, message: impl Into<String>, code: IssueCode) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
            code,
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{}: {}", self.path, self.message)
        }
    }
}

/// Machine-readable issue classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueCode {
    TypeMismatch,
    MissingRequired,
    UnknownField,
    NotAnObject,
}

/// The result of validating one value against one schema.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub issues: Vec<ValidationIssue>,
}

impl ValidationOutcome {
    pub fn valid() -> Self {
        Self::default()
    }

    pub fn is_valid(&self) -> bool {
        self.issues.is_empty()
    }
}

impl From<Vec<ValidationIssue>> for ValidationOutcome {
    fn from(issues: Vec<ValidationIssue>) -> Self {
        Self { issues }
    }
}

/// Accepted shape for a single value.
///
/// `Integer` accepts whole JSON numbers only; `Number` accepts any JSON
/// number. Objects reject fields that are neither declared nor covered by
/// `Any`; callers declare what they accept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ValueSchema {
    Any,
    Boolean,
    Integer,
    Number,
    String,
    Array {
        items: Box<ValueSchema>,
    },
    Object {
        fields: IndexMap<String, ValueSchema>,
        #[serde(default)]
        required: Vec<String>,
    },
}

impl ValueSchema {
    pub fn array_of(items: ValueSchema) -> Self {
        Self::Array {
            items: Box::new(items),
        }
    }

    /// Validate `value`, reporting issues rooted at `path`.
    pub fn validate_at(&self, path: &str, value: &Value) -> Vec<ValidationIssue> {
        match self {
            Self::Any => Vec::new(),
            Self::Boolean => expect(path, value, value.is_boolean(), "boolean"),
            Self::Integer => expect(path, value, value.is_i64() || value.is_u64(), "integer"),
            Self::Number => expect(path, value, value.is_number(), "number"),
            Self::String => expect(path, value, value.is_string(), "string"),
            Self::Array { items } => match value.as_array() {
                Some(elements) => elements
                    .iter()
                    .enumerate()
                    .flat_map(|(index, element)| {
                        items.validate_at(&child_path(path, &index.to_string()), element)
                    })
                    .collect(),
                None => expect(path, value, false, "array"),
            },
            Self::Object { fields, required } => match value.as_object() {
                Some(map) => {
                    let mut issues = Vec::new();
                    for name in required {
                        if !map.contains_key(name) {
                            issues.push(ValidationIssue::new(
                                child_path(path, name),
                                format!("missing required field `{name}`"),
                                IssueCode::MissingRequired,
                            ));
                        }
                    }
                    for (name, field_value) in map {
                        match fields.get(name) {
                            Some(schema) => {
                                issues.extend(schema.validate_at(&child_path(path, name), field_value));
                            }
                            None => issues.push(ValidationIssue::new(
                                child_path(path, name),
                                format!("unknown field `{name}`"),
                                IssueCode::UnknownField,
                            )),
                        }
                    }
                    issues
                }
                None => expect(path, value, false, "object"),
            },
        }
    }

    /// Validate with an empty root path.
    pub fn validate(&self, value: &Value) -> ValidationOutcome {
        self.validate_at("", value).into()
    }
}

fn expect(path: &str, value: &Value, ok: bool, expected: &str) -> Vec<ValidationIssue> {
    if ok {
        Vec::new()
    } else {
        vec![ValidationIssue::new(
            path,
            format!("expected {expected}, got {}", type_name(value)),
            IssueCode::TypeMismatch,
        )]
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn child_path(parent: &str, segment: &str) -> String {
    if parent.is_empty() {
        segment.to_owned()
    } else {
        format!("{parent}.{segment}")
    }
}
