//! Dispatch of CLI tokens and network payloads onto registry entries.

use crate::context::{CallContext, Channel, Outcome};
use crate::entry::RawArgs;
use crate::error::{DispatchError, FieldError, ValidationError};
use crate::registry::{Resolved, SharedRegistry, Target};
use serde_json::Value;
use tokio::runtime::Handle;
use tracing::debug;

/// Split CLI tokens into positional and named arguments.
///
/// `--key value` and `--key=value` are named; a bare `--` makes every
/// later token positional. An option followed by another option or by
/// nothing is a missing value. Values stay textual and are coerced by the
/// schema.
pub fn split_cli_args<S: AsRef<str>>(tokens: &[S]) -> Result<RawArgs, ValidationError> {
    let mut raw = RawArgs::new();
    let mut missing = Vec::new();
    let mut index = 0;
    while index < tokens.len() {
        let token = tokens[index].as_ref();
        index += 1;
        if token == "--" {
            raw.positional
                .extend(tokens[index..].iter().map(|t| Value::String(t.as_ref().to_string())));
            break;
        }
        let Some(flag) = token.strip_prefix("--").filter(|f| !f.is_empty()) else {
            raw.positional.push(Value::String(token.to_string()));
            continue;
        };
        if let Some((key, value)) = flag.split_once('=') {
            raw.named.insert(key.to_string(), Value::String(value.to_string()));
            continue;
        }
        match tokens.get(index).map(AsRef::as_ref) {
            Some(next) if !next.starts_with("--") => {
                raw.named.insert(flag.to_string(), Value::String(next.to_string()));
                index += 1;
            }
            _ => missing.push(FieldError::new(
                flag,
                format!("missing value for option '--{flag}'"),
            )),
        }
    }
    if missing.is_empty() {
        Ok(raw)
    } else {
        Err(ValidationError::new(missing))
    }
}

/// Resolves requests against a shared registry tree and invokes them.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    tree: SharedRegistry,
}

impl Dispatcher {
    pub fn new(tree: SharedRegistry) -> Self {
        Self { tree }
    }

    pub fn tree(&self) -> &SharedRegistry {
        &self.tree
    }

    fn visible(
        &self,
        resolved: Resolved,
        channel: Channel,
        label: &str,
    ) -> Result<Resolved, DispatchError> {
        if resolved.exposure.allows(channel) {
            Ok(resolved)
        } else {
            Err(DispatchError::NotFound(label.to_string()))
        }
    }

    /// Resolve a path for `channel`. Entries hidden from the channel are
    /// reported as not found.
    pub fn resolve(&self, path: &str, channel: Channel) -> Result<Resolved, DispatchError> {
        let resolved = self.tree.read().resolve(path)?;
        self.visible(resolved, channel, path)
    }

    /// Invoke the entry at `path`.
    pub fn call(
        &self,
        path: &str,
        raw: RawArgs,
        channel: Channel,
        context: CallContext,
    ) -> Outcome {
        match self.resolve(path, channel) {
            Ok(resolved) => {
                debug!(path = %resolved.path, %channel, "dispatch");
                resolved.entry.invoke(&resolved.path, raw, channel, context)
            }
            Err(err) => Outcome::Ready(Err(err)),
        }
    }

    /// Consume `tokens` as `<handler...> <method> [args...]` and run the
    /// call to completion on the current thread.
    pub fn call_cli<S: AsRef<str>>(&self, tokens: &[S]) -> Result<Value, DispatchError> {
        let (target, consumed) = self.tree.read().resolve_tokens(tokens);
        let label = tokens
            .iter()
            .take(consumed.max(1))
            .map(AsRef::as_ref)
            .collect::<Vec<_>>()
            .join(" ");
        let resolved = match target {
            Target::Method(resolved) => self.visible(resolved, Channel::Cli, &label)?,
            Target::Node(_) => {
                let missing = tokens
                    .iter()
                    .take(consumed + 1)
                    .map(AsRef::as_ref)
                    .collect::<Vec<_>>()
                    .join(" ");
                return Err(DispatchError::NotFound(missing));
            }
        };
        let raw = split_cli_args(&tokens[consumed..])?;
        debug!(path = %resolved.path, channel = "cli", "dispatch");
        resolved
            .entry
            .invoke(&resolved.path, raw, Channel::Cli, CallContext::Blocking)
            .into_ready()
    }

    /// Invoke `path` with a JSON body on behalf of a network worker
    /// running on `handle`.
    pub fn call_network(&self, path: &str, body: Value, handle: Handle) -> Outcome {
        let raw = match body {
            Value::Object(object) => RawArgs::from_object(object),
            Value::Null => RawArgs::new(),
            other => {
                let found = match other {
                    Value::Array(_) => "array",
                    Value::String(_) => "string",
                    Value::Number(_) => "number",
                    _ => "bool",
                };
                return Outcome::Ready(Err(ValidationError::single(
                    "body",
                    format!("expected a JSON object, got {found}"),
                )
                .into()));
            }
        };
        self.call(path, raw, Channel::Network, CallContext::Scheduled(handle))
    }
}
