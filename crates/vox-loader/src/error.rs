//! Error types for the library loading kernel.
//!
//! The enum is `Clone` because most failures are attached to an otherwise
//! valid, returned manifest object rather than propagated: callers inspect
//! [`LibraryManifest::error`](crate::LibraryManifest::error) before trusting
//! a library as functional. Only manifest-parse failures and nonexistent
//! paths are returned as `Err` directly.

use std::path::PathBuf;

use vox_meta::VersionNumber;

/// Result type for vox-loader operations
pub type Result<T> = std::result::Result<T, Error>;

/// Failure kinds of the loading kernel.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// A manifest or fragment field is missing or mistyped.
    #[error("invalid format: {0}")]
    InvalidFormat(String),

    /// A library directory, manifest or referenced file is unreadable.
    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// The same `(id, version)` is already loaded from a different path.
    #[error("library '{id}' version {version} already loaded from {}", existing.display())]
    FileDuplicated {
        id: String,
        version: VersionNumber,
        existing: PathBuf,
    },

    /// The dependency chain being opened leads back to this library.
    #[error("recursive dependency on library '{id}' version {version}")]
    RecursiveDependency { id: String, version: VersionNumber },

    /// No registered provider implements a requested capability.
    #[error("feature not supported: {0}")]
    FeatureNotSupported(String),

    /// A required dependency could not be resolved, or a close targeted an
    /// unknown library.
    #[error("library not found: {0}")]
    LibraryNotFound(String),

    /// Reserved for inference-session consumers of the kernel.
    #[error("session error: {0}")]
    SessionError(String),
}

impl Error {
    pub fn invalid_format(message: impl Into<String>) -> Self {
        Self::InvalidFormat(message.into())
    }
}
