//! Error types for the application registry.

use plinth_kernel::RegistryError;

/// A spec could not be turned into a live handler.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LoadError {
    /// The spec's path does not exist any more.
    #[error("source for `{app}` not found: {path}")]
    SourceMissing { app: String, path: String },

    /// Directories and packages are not source units.
    #[error("{path} is not a single source unit: {reason}")]
    NotAUnit { path: String, reason: String },

    #[error("invalid source manifest {path}: {message}")]
    Manifest { path: String, message: String },

    /// The manifest does not export the requested type.
    #[error("type `{type_name}` is not exported by {path}")]
    TypeNotExported { path: String, type_name: String },

    /// No compiled-in factory for the type.
    #[error("unknown handler type `{0}`")]
    UnknownType(String),

    /// The constructor rejected its arguments.
    #[error("failed to instantiate `{type_name}`: {message}")]
    Instantiate { type_name: String, message: String },

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Reading or writing a registry file or snapshot failed.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StoreError {
    #[error("failed to access {path}: {message}")]
    Io { path: String, message: String },

    #[error("failed to parse {path}: {message}")]
    Json { path: String, message: String },

    #[error("state lock busy: {lock_path}")]
    LockBusy { lock_path: String },

    #[error("failed to acquire state lock {lock_path}: {message}")]
    LockIo { lock_path: String, message: String },

    #[error("unsupported state in {path}: {reason}")]
    Unsupported { path: String, reason: String },

    /// The stored digest does not match the stored specs.
    #[error("digest mismatch in {path}: expected {expected}, found {actual}")]
    DigestMismatch {
        path: String,
        expected: String,
        actual: String,
    },
}

impl StoreError {
    pub(crate) fn io(path: &std::path::Path, err: impl std::fmt::Display) -> Self {
        Self::Io {
            path: path.display().to_string(),
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AppError {
    #[error("application not found: {0}")]
    NotFound(String),

    #[error("application `{0}` already exists")]
    NameCollision(String),

    #[error("invalid application spec: {0}")]
    InvalidSpec(String),

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl AppError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::NameCollision(_) => "name_collision",
            Self::InvalidSpec(_) => "validation",
            Self::Load(LoadError::Registry(RegistryError::NameCollision { .. })) => {
                "name_collision"
            }
            Self::Load(_) => "load",
            Self::Store(_) => "store",
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self.kind() {
            "not_found" => 3,
            "validation" => 2,
            "load" => 4,
            "name_collision" => 5,
            _ => 1,
        }
    }
}

impl From<RegistryError> for AppError {
    fn from(err: RegistryError) -> Self {
        Self::Load(LoadError::Registry(err))
    }
}
