//! Declared parameter schemas for handlers.
//!
//! A handler's parameters are declared when it is registered instead of being
//! discovered from the callable. [`bind_params`] checks an incoming parameter
//! object against that declaration, fills defaults and coerces textual values
//! (as delivered by query strings) into the declared type.

use crate::error::ValidationError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

/// Bound handler parameters.
pub type Params = Map<String, Value>;

/// Declared type of a handler parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    /// UTF-8 string. Untyped parameters are strings.
    #[default]
    String,
    /// Signed 64-bit integer.
    Integer,
    /// 64-bit float.
    Float,
    /// Boolean; textual `true`/`1`/`yes`/`on` (any case) are true.
    Boolean,
    /// Any JSON value, passed through unchanged.
    Any,
}

impl ParamType {
    fn name(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Boolean => "boolean",
            Self::Any => "any",
        }
    }

    /// Coerce `value` into this type.
    ///
    /// Native JSON values of the right type pass through; strings are parsed.
    fn coerce(self, value: Value) -> Option<Value> {
        match (self, value) {
            (Self::Any, v) => Some(v),
            (Self::String, Value::String(s)) => Some(Value::String(s)),
            (Self::String, v @ (Value::Number(_) | Value::Bool(_))) => {
                Some(Value::String(v.to_string()))
            }
            (Self::Integer, Value::Number(n)) if n.is_i64() => Some(Value::Number(n)),
            (Self::Integer, Value::String(s)) => s.trim().parse::<i64>().ok().map(Value::from),
            (Self::Float, Value::Number(n)) => n.as_f64().and_then(Number::from_f64).map(Value::Number),
            (Self::Float, Value::String(s)) => s
                .trim()
                .parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map(Value::Number),
            (Self::Boolean, Value::Bool(b)) => Some(Value::Bool(b)),
            (Self::Boolean, Value::String(s)) => Some(Value::Bool(matches!(
                s.to_ascii_lowercase().as_str(),
                "true" | "1" | "yes" | "on"
            ))),
            _ => None,
        }
    }
}

/// Declaration of one handler parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSpec {
    /// Parameter name.
    pub name: String,
    /// Declared type.
    #[serde(rename = "type", default)]
    pub kind: ParamType,
    /// Explicit required flag. When absent, a parameter is required iff it has
    /// no default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required: Option<bool>,
    /// Value used when the parameter is omitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl ParamSpec {
    /// Declare a parameter of the given type with no default (required).
    pub fn new(name: impl Into<String>, kind: ParamType) -> Self {
        Self {
            name: name.into(),
            kind,
            required: None,
            default: None,
        }
    }

    /// Attach a default value, making the parameter optional.
    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }

    /// Mark the parameter optional without a default.
    pub fn optional(mut self) -> Self {
        self.required = Some(false);
        self
    }

    /// Whether a caller must supply this parameter.
    pub fn is_required(&self) -> bool {
        self.required.unwrap_or(self.default.is_none())
    }
}

/// Check `raw` against `schema` and produce the parameters a handler receives.
///
/// # Errors
///
/// Returns a [`ValidationError`] listing every unknown parameter, missing
/// required parameter and uncoercible value.
pub fn bind_params(schema: &[ParamSpec], mut raw: Params) -> Result<Params, ValidationError> {
    let mut errors = Vec::new();

    let mut unknown: Vec<&String> = raw
        .keys()
        .filter(|key| !schema.iter().any(|p| &p.name == *key))
        .collect();
    if !unknown.is_empty() {
        unknown.sort();
        let names: Vec<&str> = unknown.iter().map(|s| s.as_str()).collect();
        errors.push(ValidationError::custom(format!(
            "Invalid parameter(s): {}",
            names.join(", ")
        )));
    }

    let mut bound = Params::new();
    for spec in schema {
        match raw.remove(&spec.name) {
            Some(value) => match spec.kind.coerce(value.clone()) {
                Some(coerced) => {
                    bound.insert(spec.name.clone(), coerced);
                }
                None => errors.push(ValidationError::invalid_field(
                    &spec.name,
                    format!("expected {}, got {}", spec.kind.name(), value),
                )),
            },
            None => {
                if let Some(default) = &spec.default {
                    bound.insert(spec.name.clone(), default.clone());
                } else if spec.is_required() {
                    errors.push(ValidationError::invalid_field(
                        &spec.name,
                        "missing required parameter",
                    ));
                }
            }
        }
    }

    match ValidationError::from_list(errors) {
        Some(err) => Err(err),
        None => Ok(bound),
    }
}
