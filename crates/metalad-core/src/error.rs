//! Error taxonomy for the metadata store.

use crate::types::{BlobId, Path, RealmId};

pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned from any realm, model, or pipeline operation.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Attempted to create something at a path that is already occupied.
    #[error("path already exists: {0}")]
    PathAlreadyExists(Path),

    /// Attempted to add a metadata entry where one already exists and no
    /// overwrite was requested.
    #[error("metadata already exists at {path} ({format})")]
    MetadataAlreadyExists { path: Path, format: String },

    /// A realm, blob, path, or version reference did not resolve.
    #[error("not found: {0}")]
    NotFound(String),

    /// An on-disk index or graph root carries a version tag other than the
    /// one this build understands, e.g. a `SimpleFileIndex` whose `version`
    /// field isn't `"SimpleFileIndex-0.1"`.
    #[error("version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: String, found: String },

    /// A caller supplied arguments that are individually well-formed but
    /// collectively invalid, e.g. an odd-length path/realm pair list.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The operation is a recognized part of the model but has no
    /// implementation for the current backend or configuration.
    #[error("not implemented: {0}")]
    NotImplemented(String),

    /// The storage backend failed in a way that is not one of the above,
    /// e.g. a permission error or a corrupted index.
    #[error("backend error: {0}")]
    BackendError(String),

    /// Failed to acquire or release a realm's advisory lock.
    #[error("lock error on realm {realm}: {message}")]
    LockError { realm: RealmId, message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    pub fn not_found(what: impl Into<String>) -> Self {
        Error::NotFound(what.into())
    }

    pub fn backend(what: impl Into<String>) -> Self {
        Error::BackendError(what.into())
    }
}

/// Convenience used by code that resolves a [`BlobId`] within a realm and
/// wants a consistent message shape.
pub(crate) fn blob_not_found(realm: &RealmId, id: &BlobId) -> Error {
    Error::NotFound(format!("blob {} in realm {}", id, realm))
}
