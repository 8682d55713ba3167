//! Error types for vox-meta

/// Result type for vox-meta operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while parsing value types
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    #[error("invalid version '{version}': {reason}")]
    InvalidVersion { version: String, reason: String },

    #[error("invalid identifier '{identifier}': {reason}")]
    InvalidIdentifier { identifier: String, reason: String },
}

impl Error {
    pub fn version(version: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidVersion {
            version: version.into(),
            reason: reason.into(),
        }
    }

    pub fn identifier(identifier: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidIdentifier {
            identifier: identifier.into(),
            reason: reason.into(),
        }
    }
}
