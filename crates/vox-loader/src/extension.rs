//! Extension spec lifecycle: states, the shared spec header, and the
//! `ExtensionSpec` trait.
//!
//! A library manifest contributes extension specs; each spec moves through
//! the lifecycle `Invalid → Initialized → Ready → Finished → Deleted`. The
//! transitions are driven externally by the
//! [`Environment`](crate::Environment) through the owning registry, never by
//! the spec itself. Only forward transitions exist in the happy path;
//! `Deleted` is always reachable as a best-effort teardown step.

use std::any::Any;
use std::sync::{Arc, OnceLock, Weak};

use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::manifest::LibraryManifest;

/// Lifecycle state of one extension spec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ExtensionState {
    /// Parsed but not activated.
    Invalid,
    /// Provider bindings resolved, static shape validated.
    Initialized,
    /// Second validation pass done with all sibling specs initialized.
    Ready,
    /// Resources bound during activation released; spec still inspectable.
    Finished,
    /// Terminal, irreversible.
    Deleted,
}

/// Common state shared by every extension spec: id, lifecycle state, and
/// the non-owning back-reference to the owning manifest.
pub struct SpecHeader {
    spec_type: &'static str,
    id: String,
    state: Mutex<ExtensionState>,
    library: OnceLock<Weak<LibraryManifest>>,
}

impl SpecHeader {
    pub fn new(spec_type: &'static str, id: impl Into<String>) -> Self {
        Self {
            spec_type,
            id: id.into(),
            state: Mutex::new(ExtensionState::Invalid),
            library: OnceLock::new(),
        }
    }

    pub fn spec_type(&self) -> &'static str {
        self.spec_type
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> ExtensionState {
        *self.state.lock()
    }

    /// The owning manifest, if it is still alive.
    pub fn library(&self) -> Option<Arc<LibraryManifest>> {
        self.library.get().and_then(Weak::upgrade)
    }

    /// Attach the back-reference to the owning manifest. Set exactly once,
    /// while the manifest is constructed.
    pub(crate) fn bind_library(&self, library: Weak<LibraryManifest>) {
        let _ = self.library.set(library);
    }

    pub(crate) fn set_state(&self, state: ExtensionState) {
        *self.state.lock() = state;
    }

    /// Validate a transition request before a registry does the work for it.
    ///
    /// Returns `Ok(true)` when the transition applies (do the work, then
    /// [`set_state`](Self::set_state)), `Ok(false)` when a teardown target is
    /// a no-op for the current state, and an error for an out-of-order
    /// forward request.
    pub(crate) fn check_advance(&self, target: ExtensionState) -> Result<bool> {
        let current = self.state();
        match target {
            ExtensionState::Initialized if current == ExtensionState::Invalid => Ok(true),
            ExtensionState::Ready if current == ExtensionState::Initialized => Ok(true),
            ExtensionState::Initialized | ExtensionState::Ready => {
                Err(Error::invalid_format(format!(
                    "extension '{}': cannot advance from {current:?} to {target:?}",
                    self.id
                )))
            }
            ExtensionState::Finished => Ok(matches!(
                current,
                ExtensionState::Initialized | ExtensionState::Ready
            )),
            ExtensionState::Deleted => Ok(current != ExtensionState::Deleted),
            ExtensionState::Invalid => Err(Error::invalid_format(format!(
                "extension '{}': Invalid is not a transition target",
                self.id
            ))),
        }
    }
}

impl std::fmt::Debug for SpecHeader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpecHeader")
            .field("spec_type", &self.spec_type)
            .field("id", &self.id)
            .field("state", &self.state())
            .finish()
    }
}

/// One parsed, lifecycle-managed contribution inside a library manifest.
pub trait ExtensionSpec: Send + Sync {
    /// The shared header carrying id, state and the manifest back-reference.
    fn header(&self) -> &SpecHeader;

    /// Downcast support for registries and consumers.
    fn as_any(&self) -> &dyn Any;

    /// The extension-point type tag (the registry's spec key).
    fn spec_type(&self) -> &'static str {
        self.header().spec_type()
    }

    /// The extension id, unique within its manifest and type.
    fn id(&self) -> &str {
        self.header().id()
    }

    /// The current lifecycle state.
    fn state(&self) -> ExtensionState {
        self.header().state()
    }

    /// The owning manifest, if still alive.
    fn library(&self) -> Option<Arc<LibraryManifest>> {
        self.header().library()
    }
}

impl std::fmt::Debug for dyn ExtensionSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.header().fmt(f)
    }
}
