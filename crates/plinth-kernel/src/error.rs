//! Error types for Plinth kernel operations.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::{Display, Formatter};

/// Errors raised while synthesizing a parameter schema at declaration time.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SchemaError {
    /// A textual kind could not be mapped onto a supported parameter kind.
    #[error("unsupported parameter kind `{kind}` for `{param}`")]
    UnsupportedKind { param: String, kind: String },

    /// A closed enumeration with no members, or with repeated members.
    #[error("invalid choice set for `{param}`: {reason}")]
    InvalidChoices { param: String, reason: String },

    /// The same parameter name appears twice in one signature.
    #[error("duplicate parameter `{0}`")]
    DuplicateParam(String),

    /// Parameter names must be identifiers.
    #[error("invalid parameter name `{0}`")]
    InvalidParamName(String),

    /// The declared default does not satisfy the parameter's own rules.
    #[error("default for `{param}` is invalid: {reason}")]
    InvalidDefault { param: String, reason: String },

    /// A constraint was attached to a kind it cannot apply to.
    #[error("constraint {constraint} does not apply to `{param}` of kind {kind}")]
    ConstraintMismatch {
        param: String,
        kind: String,
        constraint: String,
    },
}

/// Errors from registry mutation and lookup.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RegistryError {
    /// A name is already registered in this scope. The first registration
    /// is left untouched.
    #[error("name collision: `{name}` is already registered in `{scope}`")]
    NameCollision { scope: String, name: String },

    /// No handler or method matches the requested path.
    #[error("not found: {0}")]
    NotFound(String),

    /// Handler and method names must be identifiers.
    #[error("invalid name `{0}`")]
    InvalidName(String),

    /// The method's parameter list could not be turned into a schema.
    #[error(transparent)]
    Schema(#[from] SchemaError),
}

/// One field-level validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Arguments did not match a method's schema. Raised before the callable
/// runs, so it never leaves partial side effects behind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    pub errors: Vec<FieldError>,
}

impl ValidationError {
    pub fn new(errors: Vec<FieldError>) -> Self {
        Self { errors }
    }

    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            errors: vec![FieldError::new(field, message)],
        }
    }

    pub fn fields(&self) -> Vec<&str> {
        self.errors.iter().map(|e| e.field.as_str()).collect()
    }

    pub fn mentions(&self, field: &str) -> bool {
        self.errors.iter().any(|e| e.field == field)
    }
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid arguments:")?;
        for (i, err) in self.errors.iter().enumerate() {
            let sep = if i == 0 { " " } else { "; " };
            write!(f, "{sep}{}: {}", err.field, err.message)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

/// A domain failure raised by a handler body. Passed through the chain
/// unmodified unless an interceptor explicitly converts it.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message}")]
pub struct HandlerError {
    pub message: String,
    pub detail: Option<Value>,
}

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: Value) -> Self {
        self.detail = Some(detail);
        self
    }
}

impl From<String> for HandlerError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for HandlerError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<serde_json::Error> for HandlerError {
    fn from(err: serde_json::Error) -> Self {
        Self::new(format!("serialization error: {err}"))
    }
}

/// Everything that can go wrong between a resolved request and its result.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DispatchError {
    /// Unknown handler or method.
    #[error("not found: {0}")]
    NotFound(String),

    /// Arguments rejected by the schema.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The handler body failed.
    #[error("{0}")]
    Runtime(#[from] HandlerError),

    /// A scoped resource could not be acquired, committed or rolled back.
    #[error("resource error: {0}")]
    Resource(String),

    /// The callable's execution model cannot be reconciled with the caller.
    #[error("execution bridge error: {0}")]
    Bridge(String),
}

impl DispatchError {
    /// Stable machine-readable class shared by every channel.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::Validation(_) => "validation",
            Self::Runtime(_) => "runtime",
            Self::Resource(_) => "resource",
            Self::Bridge(_) => "bridge",
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            Self::NotFound(_) => 3,
            Self::Validation(_) => 2,
            Self::Runtime(_) | Self::Resource(_) | Self::Bridge(_) => 1,
        }
    }

    pub fn as_validation(&self) -> Option<&ValidationError> {
        match self {
            Self::Validation(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RegistryError> for DispatchError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::NotFound(path) => Self::NotFound(path),
            other => Self::Runtime(HandlerError::new(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_lists_every_field() {
        let err = ValidationError::new(vec![
            FieldError::new("a", "expected int, got 'ten'"),
            FieldError::new("b", "field required"),
        ]);
        assert_eq!(
            err.to_string(),
            "invalid arguments: a: expected int, got 'ten'; b: field required"
        );
        assert_eq!(err.fields(), vec!["a", "b"]);
    }

    #[test]
    fn dispatch_error_kinds_are_stable() {
        let err = DispatchError::from(ValidationError::single("a", "bad"));
        assert_eq!(err.kind(), "validation");
        assert_eq!(err.exit_code(), 2);
        assert_eq!(DispatchError::NotFound("x".into()).exit_code(), 3);
    }

    #[test]
    fn registry_not_found_maps_to_dispatch_not_found() {
        let err = DispatchError::from(RegistryError::NotFound("calc.mul".into()));
        assert_eq!(err, DispatchError::NotFound("calc.mul".into()));
    }
}
