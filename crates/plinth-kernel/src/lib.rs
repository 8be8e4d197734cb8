//! # Plinth Kernel
//!
//! The method exposure engine: declare a method once, with an explicit
//! parameter list, and call it from any channel through one interceptor
//! chain.
//!
//! ## Architecture
//!
//! ```text
//! ParamSpec / ParamKind   ← Declared parameters and their kinds
//!     │
//! Schema                  ← Synthesized once per method, before any instance
//!     │
//! Api<H> → Binding        ← Declaration table; bound to an instance on load
//!     │
//! RegistryTree            ← Arena of namespaces and entries, unique per scope
//!     │
//! InterceptorChain        ← Onion of before / after / on_error hooks
//!     │
//! Dispatcher              ← CLI tokens or network payloads → entry + args
//! ```
//!
//! Execution context is explicit: callers pass a [`CallContext`] and
//! receive an [`Outcome`], ready or pending.

pub mod api;
pub mod chain;
pub mod context;
pub mod describe;
pub mod dispatch;
pub mod entry;
pub mod error;
pub mod interceptors;
pub mod kind;
pub mod registry;
pub mod schema;

pub use api::{Api, Binding, MethodBuilder, MethodToken};
pub use chain::{Interceptor, InterceptorChain, Invocation};
pub use context::{CallContext, Channel, Outcome};
pub use describe::{API_DOCUMENT_KIND, ApiDocument, Description, MethodDescription};
pub use dispatch::{Dispatcher, split_cli_args};
pub use entry::{
    CallArgs, Callable, ExecutionModel, ExecutionPlan, Exposure, HandlerResult, MethodEntry,
    MethodSpec, RawArgs,
};
pub use error::{
    DispatchError, FieldError, HandlerError, RegistryError, SchemaError, ValidationError,
};
pub use interceptors::{
    AUTOCOMMIT_ARG, BridgeInterceptor, CommitPolicy, ResourceInterceptor, ResourceProvider,
    TracingInterceptor, ValidationInterceptor,
};
pub use kind::{Constraint, ParamKind};
pub use registry::{NodeId, RegistryTree, Resolved, SharedRegistry, Target};
pub use schema::{FieldSchema, ParamSpec, Schema};
