//! Schema synthesis and argument validation.
//!
//! A [`Schema`] is built exactly once from a method's declared
//! [`ParamSpec`] list, before any handler instance exists. Dispatch only
//! ever reads it.

use crate::entry::{CallArgs, RawArgs};
use crate::error::{FieldError, SchemaError, ValidationError};
use crate::kind::{Constraint, ParamKind};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;

fn identifier_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_-]*$").expect("identifier regex must compile")
    })
}

/// True when `name` is usable as a parameter, method, or handler name.
pub fn is_identifier(name: &str) -> bool {
    identifier_re().is_match(name)
}

/// One declared parameter, as written by the author of a handler.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamSpec {
    pub name: String,
    pub kind: ParamKind,
    pub default: Option<Value>,
    pub description: Option<String>,
    pub constraints: Vec<Constraint>,
}

impl ParamSpec {
    pub fn new(name: impl Into<String>, kind: ParamKind) -> Self {
        Self {
            name: name.into(),
            kind,
            default: None,
            description: None,
            constraints: Vec::new(),
        }
    }

    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn constrain(mut self, constraint: Constraint) -> Self {
        self.constraints.push(constraint);
        self
    }

    pub fn required(&self) -> bool {
        self.default.is_none()
    }
}

/// Externally visible description of one field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldSchema {
    pub name: String,
    pub kind: ParamKind,
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    /// Materialized for closed enumerations so consumers never re-derive it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub choices: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub constraints: Vec<Constraint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl FieldSchema {
    fn check(&self, raw: &Value) -> Result<Value, String> {
        let value = self.kind.coerce(raw)?;
        for constraint in &self.constraints {
            constraint.check(&value)?;
        }
        Ok(value)
    }

    /// Short label used in help tables: `<a:int>` or `[b:int=2]`.
    pub fn signature(&self) -> String {
        match (&self.default, self.required) {
            (Some(default), _) => {
                format!("[{}:{}={}]", self.name, self.kind, render_scalar(default))
            }
            (None, true) => format!("<{}:{}>", self.name, self.kind),
            (None, false) => format!("[{}:{}]", self.name, self.kind),
        }
    }
}

fn render_scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Immutable, ordered field table for one method.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Schema {
    pub fields: Vec<FieldSchema>,
}

impl Schema {
    /// Build the schema for `params`, omitting any name in `reserved`
    /// (those are injected by interceptors, never supplied by callers).
    pub fn synthesize(
        params: &[ParamSpec],
        reserved: &BTreeSet<String>,
    ) -> Result<Self, SchemaError> {
        let mut seen = BTreeSet::new();
        let mut fields = Vec::with_capacity(params.len());
        for param in params {
            if !is_identifier(&param.name) {
                return Err(SchemaError::InvalidParamName(param.name.clone()));
            }
            if !seen.insert(param.name.as_str()) {
                return Err(SchemaError::DuplicateParam(param.name.clone()));
            }
            if reserved.contains(&param.name) {
                continue;
            }
            if let ParamKind::Choice(values) = &param.kind {
                validate_choices(&param.name, values)?;
            }
            for constraint in &param.constraints {
                if !constraint.applies_to(&param.kind) {
                    return Err(SchemaError::ConstraintMismatch {
                        param: param.name.clone(),
                        kind: param.kind.to_string(),
                        constraint: constraint.to_string(),
                    });
                }
            }

            let mut field = FieldSchema {
                name: param.name.clone(),
                kind: param.kind.clone(),
                required: param.required(),
                default: None,
                choices: param.kind.choices().map(<[String]>::to_vec),
                constraints: param.constraints.clone(),
                description: param.description.clone(),
            };
            if let Some(default) = &param.default {
                let checked = if default.is_null() {
                    Value::Null
                } else {
                    field.check(default).map_err(|reason| SchemaError::InvalidDefault {
                        param: param.name.clone(),
                        reason,
                    })?
                };
                field.default = Some(checked);
            }
            fields.push(field);
        }
        Ok(Self { fields })
    }

    pub fn field(&self, name: &str) -> Option<&FieldSchema> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Bind `raw` onto the field table, coercing and checking each value.
    ///
    /// Positional values bind in field order. Named keys listed in
    /// `reserved` are left for interceptors and are not validated here.
    /// Every failing field is reported, not only the first.
    pub fn validate(
        &self,
        raw: &RawArgs,
        reserved: &BTreeSet<String>,
    ) -> Result<CallArgs, ValidationError> {
        let mut errors = Vec::new();
        let mut supplied: BTreeMap<&str, &Value> = BTreeMap::new();

        if raw.positional.len() > self.fields.len() {
            errors.push(FieldError::new(
                "args",
                format!(
                    "expected at most {} positional arguments, got {}",
                    self.fields.len(),
                    raw.positional.len()
                ),
            ));
        }
        for (field, value) in self.fields.iter().zip(raw.positional.iter()) {
            supplied.insert(field.name.as_str(), value);
        }

        for (key, value) in &raw.named {
            if reserved.contains(key) {
                continue;
            }
            if self.field(key).is_none() {
                errors.push(FieldError::new(key.clone(), "unexpected field"));
                continue;
            }
            if supplied.insert(key.as_str(), value).is_some() {
                errors.push(FieldError::new(key.clone(), "given both positionally and by name"));
            }
        }

        let mut values = Map::new();
        for field in &self.fields {
            match supplied.get(field.name.as_str()) {
                Some(Value::Null) | None => match &field.default {
                    Some(default) => {
                        values.insert(field.name.clone(), default.clone());
                    }
                    None if field.required => {
                        errors.push(FieldError::new(field.name.clone(), "field required"));
                    }
                    None => {}
                },
                Some(value) => match field.check(value) {
                    Ok(coerced) => {
                        values.insert(field.name.clone(), coerced);
                    }
                    Err(message) => errors.push(FieldError::new(field.name.clone(), message)),
                },
            }
        }

        if errors.is_empty() {
            Ok(CallArgs::from_values(values))
        } else {
            Err(ValidationError::new(errors))
        }
    }
}

fn validate_choices(param: &str, values: &[String]) -> Result<(), SchemaError> {
    if values.is_empty() {
        return Err(SchemaError::InvalidChoices {
            param: param.to_string(),
            reason: "no allowed values".to_string(),
        });
    }
    let mut seen = BTreeSet::new();
    for value in values {
        if !seen.insert(value) {
            return Err(SchemaError::InvalidChoices {
                param: param.to_string(),
                reason: format!("`{value}` listed twice"),
            });
        }
    }
    Ok(())
}
