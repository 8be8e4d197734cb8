//! # Plinth Apps
//!
//! Named applications that can be added, loaded into a live registry
//! tree, unloaded, removed, and snapshotted to disk.
//!
//! ```text
//! ApplicationSpec     ← name, source path, type, constructor args, channel flags
//!     │
//! SourceUnit          ← one manifest file exporting handler types
//!     │
//! HandlerCatalog      ← compiled-in factories keyed by type name
//!     │
//! AppRegistry         ← spec-only ⇄ loaded, persisted as ApplicationState
//! ```

pub mod catalog;
pub mod error;
pub mod lifecycle;
pub mod source;
pub mod spec;
pub mod state;
pub mod store;

pub use catalog::{ApiFactory, HandlerCatalog, HandlerFactory};
pub use error::{AppError, LoadError, StoreError};
pub use lifecycle::{AppListing, AppRegistry, AppStatus, LoadedApp, RestoreReport};
pub use source::SourceUnit;
pub use spec::{ApplicationSpec, parse_target};
pub use state::{APPLICATION_STATE_KIND, ApplicationState};
pub use store::{read_state, write_state};
