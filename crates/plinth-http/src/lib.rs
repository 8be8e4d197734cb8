//! # Plinth HTTP
//!
//! The network channel: a small HTTP/1.1 JSON server over a registry tree.
//!
//! ```text
//! POST /{handler...}/{method}   JSON body keyed by field name → {status, result|error}
//! POST /_system/{method}        system commands
//! GET  /_http/health            status + handler count
//! GET  /_http/openapi           OpenAPI 3.0 document
//! GET  /_http/describe          native description document
//! GET  /_http/metrics           handler names, requests served
//! ```
//!
//! Each connection runs on its own task. Handlers are shared across those
//! tasks without any locking added here.

pub mod envelope;
pub mod openapi;
pub mod route;
pub mod server;

pub use envelope::HttpResponse;
pub use openapi::openapi_document;
pub use route::{Route, RouteError};
pub use server::{
    HttpRequest, HttpServeError, HttpServerConfig, NetworkChannel, serve, serve_with_limit,
};
