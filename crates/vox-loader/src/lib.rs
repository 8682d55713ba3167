//! Library loading kernel: manifests, extension lifecycles and the module
//! environment.
//!
//! The kernel turns on-disk library packages into live, reference-counted
//! extension sets:
//!
//! - [`LibraryManifest`] parses and canonicalizes a `library.json` package
//!   descriptor.
//! - [`ExtensionRegistry`] implementations own one `contributes` section
//!   each; the built-in points are [`InferenceRegistry`] and
//!   [`SingerRegistry`].
//! - [`Environment`] orchestrates open and close: duplicate and cycle
//!   detection, recursive dependency resolution through the
//!   [`LibraryCatalog`], and the two-phase extension activation with
//!   rollback.
//!
//! ```no_run
//! use std::sync::Arc;
//! use vox_loader::{Environment, INFERENCE_SPEC_KEY};
//!
//! # fn main() -> vox_loader::Result<()> {
//! let env = Environment::new();
//! env.add_library_path("/opt/voice-libraries");
//!
//! let library = env.open_library("/opt/voice-libraries/some-voice", false)?;
//! if let Some(error) = library.error() {
//!     eprintln!("library is inert: {error}");
//! }
//! for spec in library.extensions(INFERENCE_SPEC_KEY) {
//!     println!("inference: {}", spec.id());
//! }
//! env.close_library(&library)?;
//! # Ok(())
//! # }
//! ```

mod catalog;
mod environment;
mod error;
mod extension;
mod inference;
mod manifest;
mod registry;
mod singer;

pub use catalog::{CatalogEntry, LibraryCatalog};
pub use environment::Environment;
pub use error::{Error, Result};
pub use extension::{ExtensionSpec, ExtensionState, SpecHeader};
pub use inference::{
    INFERENCE_SPEC_KEY, INTERPRETER_IID, InferenceRegistry, InferenceSpec, Interpreter,
    InterpreterPlugin,
};
pub use manifest::{Dependency, LibraryManifest, MANIFEST_FILENAME};
pub use registry::ExtensionRegistry;
pub use singer::{SINGER_SPEC_KEY, SingerRegistry, SingerSpec};
