use thiserror::Error;

use crate::codec::{DecodeError, EncodeError};

pub type Result<T = (), E = RegistryError> = std::result::Result<T, E>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RegistryError {
    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Registry is read only: {0}")]
    ReadOnly(String),

    #[error("Failed to decode stored object: {0}")]
    Decode(String),

    #[error("Failed to encode object: {0}")]
    Encode(String),

    #[error("Failed to open or create registry key: {0}")]
    CreationFailed(String),

    #[error("Invalid namespace: {0}")]
    InvalidNamespace(String),

    #[error("Registry key has subkeys: {0}")]
    KeyNotEmpty(String),

    #[error("Cannot convert value: {0}")]
    TypeMismatch(String),

    #[error("Registry handle is closed")]
    Closed,

    #[error("Registry I/O error: {0}")]
    Io(String),
}

impl RegistryError {
    /// `NotFound` is the expected outcome when reading optional configuration.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    #[must_use]
    pub const fn is_access_denied(&self) -> bool {
        matches!(self, Self::AccessDenied(_) | Self::ReadOnly(_))
    }
}

impl From<DecodeError> for RegistryError {
    fn from(e: DecodeError) -> Self {
        Self::Decode(e.to_string())
    }
}

impl From<EncodeError> for RegistryError {
    fn from(e: EncodeError) -> Self {
        Self::Encode(e.to_string())
    }
}
