//! Error types for vox-plugin

use std::path::PathBuf;

/// Result type for vox-plugin operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while opening native modules.
///
/// Discovery-time failures (malformed modules, interface mismatches) are
/// swallowed by the locator and only logged; these errors surface from the
/// [`SharedLibrary`](crate::SharedLibrary) primitive itself.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to open module {path}: {message}")]
    OpenFailed { path: PathBuf, message: String },

    #[error("symbol '{symbol}' not found in {path}: {message}")]
    SymbolNotFound {
        path: PathBuf,
        symbol: String,
        message: String,
    },

    #[error("module {path} declares ABI version {found}, expected {expected}")]
    AbiMismatch {
        path: PathBuf,
        found: u32,
        expected: u32,
    },
}
