//! # Plinth Publisher
//!
//! The root object of a plinth process. A [`Publisher`] composes:
//!
//! ```text
//! PublisherConfig   ← defaults, ~/.plinth, .plinth, PLINTH_* env
//!     │
//! Publisher
//!     ├── SharedRegistry   ← live tree, `_system` mounted at the root
//!     ├── AppRegistry      ← persisted specs and their lifecycle
//!     ├── HandlerCatalog   ← compiled-in handler types
//!     └── Dispatcher
//!           ├── run_cli          → CliOutput (value or help text)
//!           ├── complete         → CompletionPayload for shell completion
//!           └── network_channel  → plinth_http::NetworkChannel
//! ```
//!
//! [`discover_app`] picks the registry an application lives in, project
//! first and per-user second, before a publisher is opened.

pub mod complete;
pub mod config;
pub mod discover;
pub mod error;
pub mod format;
pub mod publisher;
pub mod system;

pub use complete::{CompletionPayload, Suggestion, SuggestionKind, parse_completion_args};
pub use config::{ConfigError, ConfigLoader, PublisherConfig, global_registry_path};
pub use discover::{Discovered, RegistryScope, discover_app};
pub use error::PublishError;
pub use format::{render_help, render_method_help, render_value};
pub use publisher::{CliOutput, PROGRAM, Publisher};
pub use system::{SYSTEM_HANDLER, SystemCommands, system_binding};
