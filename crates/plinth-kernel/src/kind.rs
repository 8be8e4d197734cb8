//! Parameter kinds, constraints, and coercion of raw input onto them.
//!
//! Raw input arrives either as text (CLI tokens) or as JSON (network
//! bodies). Both are carried as [`serde_json::Value`]; text is simply a
//! `Value::String`, so both channels share one coercion function.

use crate::error::SchemaError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Number, Value};
use std::fmt::{Display, Formatter};

/// The declared kind of one parameter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ParamKind {
    Str,
    Int,
    Float,
    Bool,
    /// Arbitrary JSON; textual input is parsed when it is valid JSON.
    Json,
    /// A closed set of literal string values.
    Choice(Vec<String>),
}

impl ParamKind {
    pub fn choice<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Choice(values.into_iter().map(Into::into).collect())
    }

    /// Parse a textual kind such as `int`, `number` or `choice[a|b]`.
    pub fn parse(param: &str, text: &str) -> Result<Self, SchemaError> {
        let trimmed = text.trim();
        let kind = match trimmed {
            "str" | "string" => Self::Str,
            "int" | "integer" => Self::Int,
            "float" | "number" => Self::Float,
            "bool" | "boolean" => Self::Bool,
            "json" | "any" => Self::Json,
            _ => {
                let inner = trimmed
                    .strip_prefix("choice[")
                    .and_then(|rest| rest.strip_suffix(']'))
                    .ok_or_else(|| SchemaError::UnsupportedKind {
                        param: param.to_string(),
                        kind: trimmed.to_string(),
                    })?;
                Self::Choice(
                    inner
                        .split('|')
                        .map(|v| v.trim().to_string())
                        .filter(|v| !v.is_empty())
                        .collect(),
                )
            }
        };
        Ok(kind)
    }

    pub fn choices(&self) -> Option<&[String]> {
        match self {
            Self::Choice(values) => Some(values),
            _ => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Int | Self::Float)
    }

    /// Coerce one raw value onto this kind. The error string is the
    /// field-level message surfaced to callers.
    pub fn coerce(&self, raw: &Value) -> Result<Value, String> {
        match self {
            Self::Str => match raw {
                Value::String(_) => Ok(raw.clone()),
                Value::Number(n) => Ok(Value::String(n.to_string())),
                Value::Bool(b) => Ok(Value::String(b.to_string())),
                other => Err(format!("expected str, got {}", json_type(other))),
            },
            Self::Int => match raw {
                Value::Number(n) => number_as_int(n)
                    .map(Value::from)
                    .ok_or_else(|| format!("expected int, got {n}")),
                Value::String(s) => s
                    .trim()
                    .parse::<i64>()
                    .map(Value::from)
                    .map_err(|_| format!("expected int, got '{s}'")),
                other => Err(format!("expected int, got {}", json_type(other))),
            },
            Self::Float => {
                let parsed = match raw {
                    Value::Number(n) => n.as_f64(),
                    Value::String(s) => s.trim().parse::<f64>().ok(),
                    _ => None,
                };
                parsed
                    .and_then(Number::from_f64)
                    .map(Value::Number)
                    .ok_or_else(|| match raw {
                        Value::String(s) => format!("expected float, got '{s}'"),
                        other => format!("expected float, got {}", json_type(other)),
                    })
            }
            Self::Bool => match raw {
                Value::Bool(_) => Ok(raw.clone()),
                Value::String(s) => parse_bool(s)
                    .map(Value::Bool)
                    .ok_or_else(|| format!("expected bool, got '{s}'")),
                Value::Number(n) => match n.as_i64() {
                    Some(0) => Ok(Value::Bool(false)),
                    Some(1) => Ok(Value::Bool(true)),
                    _ => Err(format!("expected bool, got {n}")),
                },
                other => Err(format!("expected bool, got {}", json_type(other))),
            },
            Self::Json => match raw {
                Value::String(s) => match serde_json::from_str::<Value>(s) {
                    Ok(parsed @ (Value::Object(_) | Value::Array(_))) => Ok(parsed),
                    _ => Ok(raw.clone()),
                },
                _ => Ok(raw.clone()),
            },
            Self::Choice(values) => {
                let text = match raw {
                    Value::String(s) => s.clone(),
                    Value::Number(n) => n.to_string(),
                    Value::Bool(b) => b.to_string(),
                    other => {
                        return Err(format!(
                            "expected one of {}, got {}",
                            values.join(", "),
                            json_type(other)
                        ));
                    }
                };
                if values.iter().any(|v| *v == text) {
                    Ok(Value::String(text))
                } else {
                    Err(format!("'{text}' is not one of: {}", values.join(", ")))
                }
            }
        }
    }
}

impl Display for ParamKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Str => write!(f, "str"),
            Self::Int => write!(f, "int"),
            Self::Float => write!(f, "float"),
            Self::Bool => write!(f, "bool"),
            Self::Json => write!(f, "json"),
            Self::Choice(values) => write!(f, "choice[{}]", values.join("|")),
        }
    }
}

impl Serialize for ParamKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ParamKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::parse("<kind>", &text).map_err(serde::de::Error::custom)
    }
}

/// A value restriction attached to a parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Constraint {
    Gt(f64),
    Ge(f64),
    Lt(f64),
    Le(f64),
    MinLen(usize),
    MaxLen(usize),
}

impl Constraint {
    pub fn applies_to(&self, kind: &ParamKind) -> bool {
        match self {
            Self::Gt(_) | Self::Ge(_) | Self::Lt(_) | Self::Le(_) => kind.is_numeric(),
            Self::MinLen(_) | Self::MaxLen(_) => matches!(kind, ParamKind::Str),
        }
    }

    /// Check an already-coerced value.
    pub fn check(&self, value: &Value) -> Result<(), String> {
        match self {
            Self::Gt(bound) => {
                compare(value, |v| v > *bound, || format!("must be greater than {bound}"))
            }
            Self::Ge(bound) => compare(value, |v| v >= *bound, || {
                format!("must be greater than or equal to {bound}")
            }),
            Self::Lt(bound) => {
                compare(value, |v| v < *bound, || format!("must be less than {bound}"))
            }
            Self::Le(bound) => compare(value, |v| v <= *bound, || {
                format!("must be less than or equal to {bound}")
            }),
            Self::MinLen(min) => match value.as_str() {
                Some(s) if s.chars().count() >= *min => Ok(()),
                _ => Err(format!("must be at least {min} characters")),
            },
            Self::MaxLen(max) => match value.as_str() {
                Some(s) if s.chars().count() <= *max => Ok(()),
                _ => Err(format!("must be at most {max} characters")),
            },
        }
    }
}

impl Display for Constraint {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Gt(v) => write!(f, "gt {v}"),
            Self::Ge(v) => write!(f, "ge {v}"),
            Self::Lt(v) => write!(f, "lt {v}"),
            Self::Le(v) => write!(f, "le {v}"),
            Self::MinLen(v) => write!(f, "min_len {v}"),
            Self::MaxLen(v) => write!(f, "max_len {v}"),
        }
    }
}

fn compare(
    value: &Value,
    holds: impl Fn(f64) -> bool,
    message: impl Fn() -> String,
) -> Result<(), String> {
    match value.as_f64() {
        Some(v) if holds(v) => Ok(()),
        _ => Err(message()),
    }
}

fn number_as_int(n: &Number) -> Option<i64> {
    if let Some(i) = n.as_i64() {
        return Some(i);
    }
    let f = n.as_f64()?;
    if f.is_finite() && f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64 {
        Some(f as i64)
    } else {
        None
    }
}

pub(crate) fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
