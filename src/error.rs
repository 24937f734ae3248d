//! Error types for backend orchestration
//!
//! Backends report native failures as [`BackendError`]; the orchestration
//! layer wraps them into a typed [`SimError`] which is returned up to the
//! process boundary. Nothing below `main` terminates the process.

use crate::backend::BackendError;
use thiserror::Error;

/// Result type for orchestration operations
pub type SimResult<T> = Result<T, SimError>;

/// Broad classification of a [`SimError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The user asked for something that cannot be satisfied; fixed by
    /// re-invoking with corrected arguments
    Configuration,
    /// A backend failed to acquire its native resources
    Initialization,
    /// The build registered an inconsistent set of backends
    RegistryIntegrity,
    /// A running backend failed while pumping, presenting or tearing down
    Runtime,
}

#[derive(Debug, Error)]
pub enum SimError {
    #[error("no such backend: {0}")]
    UnknownBackend(String),

    #[error("{0}")]
    Configuration(String),

    #[error("no display-capable backend is compiled in")]
    NoDisplayBackend,

    #[error("backend {0} cannot be both the primary and the auxiliary input backend")]
    InputConflict(String),

    #[error("failed to initialize backend {backend}: {source}")]
    Initialization {
        backend: String,
        #[source]
        source: BackendError,
    },

    #[error("backend {0} is registered more than once")]
    DuplicateBackend(String),

    #[error("backend name must not be empty")]
    EmptyBackendName,

    #[error("backend {backend} failed: {source}")]
    Backend {
        backend: String,
        #[source]
        source: BackendError,
    },
}

impl SimError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SimError::UnknownBackend(_)
            | SimError::Configuration(_)
            | SimError::NoDisplayBackend
            | SimError::InputConflict(_) => ErrorKind::Configuration,
            SimError::Initialization { .. } => ErrorKind::Initialization,
            SimError::DuplicateBackend(_) | SimError::EmptyBackendName => {
                ErrorKind::RegistryIntegrity
            }
            SimError::Backend { .. } => ErrorKind::Runtime,
        }
    }

    /// Process exit status for this error
    pub fn exit_code(&self) -> i32 {
        1
    }

    pub(crate) fn backend(name: &str, source: BackendError) -> Self {
        SimError::Backend {
            backend: name.to_string(),
            source,
        }
    }
}
