use crate::config::ConfigError;
use plinth_apps::AppError;
use plinth_http::HttpServeError;
use plinth_kernel::{DispatchError, RegistryError};
use thiserror::Error;

/// Anything a publisher operation can fail with, as seen by a channel.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    App(#[from] AppError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    Serve(#[from] HttpServeError),

    #[error("usage: {0}")]
    Usage(String),
}

impl PublishError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config(_) | Self::Usage(_) => "usage",
            Self::App(err) => err.kind(),
            Self::Dispatch(err) => err.kind(),
            Self::Serve(_) => "runtime",
        }
    }

    /// 0 success, 1 runtime, 2 validation or usage, 3 not found, 4 load,
    /// 5 name collision.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::Usage(_) => 2,
            Self::App(err) => err.exit_code(),
            Self::Dispatch(err) => err.exit_code(),
            Self::Serve(_) => 1,
        }
    }
}

impl From<RegistryError> for PublishError {
    fn from(err: RegistryError) -> Self {
        Self::App(AppError::from(err))
    }
}
