//! Stock interceptors, in their reference order from outermost to
//! innermost: observability, validation, scoped resources, bridging.

mod bridge;
mod observe;
mod resource;
mod validate;

pub use bridge::BridgeInterceptor;
pub use observe::TracingInterceptor;
pub use resource::{AUTOCOMMIT_ARG, CommitPolicy, ResourceInterceptor, ResourceProvider};
pub use validate::ValidationInterceptor;
