//! Calling context and call outcomes.
//!
//! The channel adapter decides the context explicitly: the CLI calls in a
//! [`CallContext::Blocking`] context, network workers pass the handle of
//! the runtime they run on. Nothing in the kernel inspects ambient state
//! to find out.

use crate::error::DispatchError;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::{Display, Formatter};
use tokio::runtime::Handle;

/// The channel a call arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Cli,
    Network,
}

impl Display for Channel {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cli => write!(f, "cli"),
            Self::Network => write!(f, "network"),
        }
    }
}

/// Whether the caller can suspend.
#[derive(Debug, Clone)]
pub enum CallContext {
    /// The caller blocks its thread until the result is available.
    Blocking,
    /// The caller runs inside a cooperative scheduler and accepts a
    /// pending computation.
    Scheduled(Handle),
}

impl CallContext {
    pub fn is_scheduled(&self) -> bool {
        matches!(self, Self::Scheduled(_))
    }
}

/// Result of one dispatch.
pub enum Outcome {
    Ready(Result<Value, DispatchError>),
    /// Returned only in a scheduled context; post-call hooks run when the
    /// future completes.
    Pending(BoxFuture<'static, Result<Value, DispatchError>>),
}

impl Outcome {
    /// Await the outcome regardless of shape.
    pub async fn resolve(self) -> Result<Value, DispatchError> {
        match self {
            Self::Ready(result) => result,
            Self::Pending(future) => future.await,
        }
    }

    /// Take a ready result. A pending outcome here means a scheduled
    /// computation reached a caller that cannot await it.
    pub fn into_ready(self) -> Result<Value, DispatchError> {
        match self {
            Self::Ready(result) => result,
            Self::Pending(_) => Err(DispatchError::Bridge(
                "pending computation returned to a blocking caller".to_string(),
            )),
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending(_))
    }
}

impl std::fmt::Debug for Outcome {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ready(result) => f.debug_tuple("Ready").field(result).finish(),
            Self::Pending(_) => f.write_str("Pending(..)"),
        }
    }
}
