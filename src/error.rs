//! Error types for the native-handle crate.

use thiserror::Error;

/// Result type alias for handle operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for handle operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The resource token could not be introspected; no handle was produced.
    #[error("cannot wrap resource: {0}")]
    Construction(String),

    /// The handle's resource has already been destroyed.
    #[error("invalid handle '{name}': cannot {op} a destroyed handle")]
    InvalidHandle {
        /// Name of the handle the operation targeted.
        name: String,
        /// Operation that was rejected.
        op: &'static str,
    },

    /// Function argument is invalid.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl Error {
    pub(crate) fn invalid_handle(name: &str, op: &'static str) -> Self {
        Error::InvalidHandle {
            name: name.to_string(),
            op,
        }
    }

    /// Check if this is an invalid handle error.
    pub fn is_invalid_handle(&self) -> bool {
        matches!(self, Error::InvalidHandle { .. })
    }

    /// Check if this is a construction error.
    pub fn is_construction(&self) -> bool {
        matches!(self, Error::Construction(_))
    }
}
