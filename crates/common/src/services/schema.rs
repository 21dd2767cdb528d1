//! Declarative field rules for resource validation and row coercion

use crate::db::Document;
use crate::errors::FieldError;
use crate::query::{as_number, parse_timestamp};
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;
use validator::ValidateEmail;

#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    String,
    Number,
    Boolean,
    Email,
    Date,
    Enum(Vec<String>),
    Array,
}

impl FieldKind {
    fn label(&self) -> String {
        match self {
            FieldKind::String => "string".to_string(),
            FieldKind::Number => "number".to_string(),
            FieldKind::Boolean => "boolean".to_string(),
            FieldKind::Email => "email".to_string(),
            FieldKind::Date => "date".to_string(),
            FieldKind::Enum(values) => format!("enum ({})", values.join("|")),
            FieldKind::Array => "array".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldRule {
    pub kind: FieldKind,
    pub required: bool,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
    pub default: Option<Value>,
    pub unique: bool,
    pub foreign_key: Option<String>,
}

impl FieldRule {
    fn of(kind: FieldKind) -> Self {
        Self {
            kind,
            required: false,
            min: None,
            max: None,
            min_length: None,
            max_length: None,
            default: None,
            unique: false,
            foreign_key: None,
        }
    }

    pub fn string() -> Self {
        Self::of(FieldKind::String)
    }

    pub fn number() -> Self {
        Self::of(FieldKind::Number)
    }

    pub fn boolean() -> Self {
        Self::of(FieldKind::Boolean)
    }

    pub fn email() -> Self {
        Self::of(FieldKind::Email)
    }

    pub fn date() -> Self {
        Self::of(FieldKind::Date)
    }

    pub fn array() -> Self {
        Self::of(FieldKind::Array)
    }

    pub fn one_of(values: &[&str]) -> Self {
        Self::of(FieldKind::Enum(values.iter().map(|v| v.to_string()).collect()))
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn min(mut self, min: f64) -> Self {
        self.min = Some(min);
        self
    }

    pub fn max(mut self, max: f64) -> Self {
        self.max = Some(max);
        self
    }

    pub fn length(mut self, min: usize, max: usize) -> Self {
        self.min_length = Some(min);
        self.max_length = Some(max);
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Value must be the id of a record in `collection`
    pub fn references(mut self, collection: &str) -> Self {
        self.foreign_key = Some(collection.to_string());
        self
    }

    /// One-line human description, used by import templates
    pub fn describe(&self) -> String {
        let mut parts = vec![self.kind.label()];
        if self.required {
            parts.push("required".to_string());
        }
        if let Some(target) = &self.foreign_key {
            parts.push(format!("FK: {target}"));
        }
        if let Some(min) = self.min {
            parts.push(format!("min: {min}"));
        }
        if let Some(max) = self.max {
            parts.push(format!("max: {max}"));
        }
        if let Some(default) = &self.default {
            parts.push(format!("default: {default}"));
        }
        parts.join(", ")
    }

    fn check(&self, field: &str, value: &Value) -> Option<String> {
        match (&self.kind, value) {
            (FieldKind::String, Value::String(s)) => self.check_length(field, s),
            (FieldKind::String, _) => Some(format!("{field} must be a string")),

            (FieldKind::Number, Value::Number(n)) => {
                let n = n.as_f64().unwrap_or(f64::NAN);
                match (self.min, self.max) {
                    (Some(min), _) if n < min => Some(format!("{field} must be >= {min}")),
                    (_, Some(max)) if n > max => Some(format!("{field} must be <= {max}")),
                    _ => None,
                }
            }
            (FieldKind::Number, _) => Some(format!("{field} must be a number")),

            (FieldKind::Boolean, Value::Bool(_)) => None,
            (FieldKind::Boolean, _) => Some(format!("{field} must be a boolean")),

            (FieldKind::Email, Value::String(s)) if s.validate_email() => None,
            (FieldKind::Email, _) => Some(format!("{field} must be a valid email")),

            (FieldKind::Date, Value::String(s)) if parse_timestamp(s).is_some() => None,
            (FieldKind::Date, _) => Some(format!("{field} must be a valid date")),

            (FieldKind::Enum(values), Value::String(s)) if values.contains(s) => None,
            (FieldKind::Enum(values), _) => {
                Some(format!("{field} must be one of: {}", values.join(", ")))
            }

            (FieldKind::Array, Value::Array(_)) => None,
            (FieldKind::Array, _) => Some(format!("{field} must be an array")),
        }
    }

    fn check_length(&self, field: &str, text: &str) -> Option<String> {
        let len = text.chars().count();
        match (self.min_length, self.max_length) {
            (Some(min), _) if len < min => {
                Some(format!("{field} must be at least {min} characters"))
            }
            (_, Some(max)) if len > max => {
                Some(format!("{field} must be at most {max} characters"))
            }
            _ => None,
        }
    }

    /// Convert a loosely typed cell (as read from a spreadsheet row)
    fn coerce(&self, value: &Value) -> Value {
        match (&self.kind, value) {
            (FieldKind::Number, Value::String(_)) => as_number(value)
                .and_then(|n| {
                    if n.fract() == 0.0 && n.abs() < 9.0e15 {
                        Some(Value::from(n as i64))
                    } else {
                        serde_json::Number::from_f64(n).map(Value::Number)
                    }
                })
                .unwrap_or_else(|| value.clone()),
            (FieldKind::Boolean, Value::String(s)) => match s.trim().to_lowercase().as_str() {
                "true" | "1" | "yes" => Value::Bool(true),
                "false" | "0" | "no" => Value::Bool(false),
                _ => value.clone(),
            },
            (FieldKind::Boolean, Value::Number(n)) => match n.as_f64() {
                Some(x) if x == 1.0 => Value::Bool(true),
                Some(x) if x == 0.0 => Value::Bool(false),
                _ => value.clone(),
            },
            (FieldKind::Date, Value::String(s)) => parse_timestamp(s)
                .and_then(DateTime::<Utc>::from_timestamp_millis)
                .map(|dt| Value::String(dt.to_rfc3339_opts(SecondsFormat::Millis, true)))
                .unwrap_or_else(|| value.clone()),
            (FieldKind::String | FieldKind::Email | FieldKind::Enum(_), Value::String(s)) => {
                Value::String(s.trim().to_string())
            }
            (FieldKind::String | FieldKind::Email | FieldKind::Enum(_), Value::Number(n)) => {
                Value::String(n.to_string())
            }
            _ => value.clone(),
        }
    }
}

/// Whether a full record or a partial patch is being validated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationMode {
    Create,
    Update,
}

fn is_blank(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        _ => false,
    }
}

/// Ordered set of field rules for one resource
#[derive(Debug, Clone, Default)]
pub struct Schema {
    fields: Vec<(String, FieldRule)>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, name: &str, rule: FieldRule) -> Self {
        self.fields.push((name.to_string(), rule));
        self
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldRule)> {
        self.fields.iter().map(|(name, rule)| (name.as_str(), rule))
    }

    pub fn get(&self, name: &str) -> Option<&FieldRule> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, rule)| rule)
    }

    pub fn required_fields(&self) -> Vec<&str> {
        self.fields()
            .filter(|(_, rule)| rule.required)
            .map(|(name, _)| name)
            .collect()
    }

    pub fn unique_fields(&self) -> Vec<&str> {
        self.fields()
            .filter(|(_, rule)| rule.unique)
            .map(|(name, _)| name)
            .collect()
    }

    pub fn foreign_keys(&self) -> Vec<(&str, &str)> {
        self.fields()
            .filter_map(|(name, rule)| rule.foreign_key.as_deref().map(|target| (name, target)))
            .collect()
    }

    /// Check a document against every rule, collecting all failures
    ///
    /// In update mode absent fields are skipped, but a required field may
    /// not be cleared.
    pub fn validate(&self, doc: &Document, mode: ValidationMode) -> Vec<FieldError> {
        let mut errors = Vec::new();

        for (name, rule) in self.fields() {
            let value = doc.get(name);
            if is_blank(value) {
                let enforce = match mode {
                    ValidationMode::Create => rule.required && rule.default.is_none(),
                    ValidationMode::Update => rule.required && value.is_some(),
                };
                if enforce {
                    errors.push(FieldError::new(name, format!("{name} is required")));
                }
                continue;
            }

            if let Some(message) = value.and_then(|v| rule.check(name, v)) {
                errors.push(FieldError::new(name, message));
            }
        }

        errors
    }

    /// Fill absent fields that declare a default
    pub fn apply_defaults(&self, doc: &mut Document) {
        for (name, rule) in self.fields() {
            if let Some(default) = &rule.default {
                if is_blank(doc.get(name)) {
                    doc.insert(name.to_string(), default.clone());
                }
            }
        }
    }

    /// Project an imported row onto the schema, converting cell types
    ///
    /// Columns outside the schema are dropped and blank cells omitted, so
    /// defaults and required checks apply afterwards.
    pub fn coerce_row(&self, row: &Document) -> Document {
        let mut out = Document::new();
        for (name, rule) in self.fields() {
            match row.get(name) {
                Some(value) if !is_blank(Some(value)) => {
                    out.insert(name.to_string(), rule.coerce(value));
                }
                _ => {}
            }
        }
        out
    }
}
