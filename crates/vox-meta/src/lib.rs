//! Shared value types for the vox runtime.
//!
//! Leaf types used across the plugin locator and the library loader:
//! four-component version numbers, `library[version]/id` identifiers, and
//! localizable display text.

pub mod error;
pub mod identifier;
pub mod text;
pub mod version;

pub use error::{Error, Result};
pub use identifier::{Identifier, is_valid_id};
pub use text::LocalizedText;
pub use version::VersionNumber;
