//! Field-level input validation against a list of rules.

use regex::Regex;
use serde_json::{Map, Value};

use crate::error::ServiceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    String,
    Number,
    Boolean,
    Object,
    Array,
}

impl FieldKind {
    fn matches(&self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Number => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::Object => value.is_object(),
            Self::Array => value.is_array(),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Object => "object",
            Self::Array => "array",
        }
    }
}

#[derive(Debug, Clone)]
pub struct FieldRule {
    pub field: String,
    pub required: bool,
    pub kind: Option<FieldKind>,
    pub pattern: Option<Regex>,
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
}

impl FieldRule {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            required: false,
            kind: None,
            pattern: None,
            min_length: None,
            max_length: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn kind(mut self, kind: FieldKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn pattern(mut self, pattern: Regex) -> Self {
        self.pattern = Some(pattern);
        self
    }

    pub fn min_length(mut self, n: usize) -> Self {
        self.min_length = Some(n);
        self
    }

    pub fn max_length(mut self, n: usize) -> Self {
        self.max_length = Some(n);
        self
    }
}

/// Empty strings, `null`, `0` and `false` count as absent.
fn is_filled(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn length_of(value: &Value) -> Option<usize> {
    match value {
        Value::String(s) => Some(s.chars().count()),
        Value::Array(items) => Some(items.len()),
        _ => None,
    }
}

/// Check `data` against every rule, collecting all messages before failing.
pub fn validate_input(data: &Map<String, Value>, rules: &[FieldRule]) -> Result<(), ServiceError> {
    let mut errors = Vec::new();

    for rule in rules {
        let value = data.get(&rule.field).filter(|v| is_filled(v));
        let Some(value) = value else {
            if rule.required {
                errors.push(format!("{} is required", rule.field));
            }
            continue;
        };

        if let Some(kind) = rule.kind {
            if !kind.matches(value) {
                errors.push(format!("{} must be {}", rule.field, kind.name()));
            }
        }

        if let Some(pattern) = &rule.pattern {
            let text = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            if !pattern.is_match(&text) {
                errors.push(format!("{} format is invalid", rule.field));
            }
        }

        if let Some(len) = length_of(value) {
            if let Some(min) = rule.min_length.filter(|min| len < *min) {
                errors.push(format!("{} must be at least {} characters", rule.field, min));
            }
            if let Some(max) = rule.max_length.filter(|max| len > *max) {
                errors.push(format!("{} must be at most {} characters", rule.field, max));
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ServiceError::Validation { errors })
    }
}
