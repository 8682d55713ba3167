//! The extension registry contract.
//!
//! One registry exists per extension-point type — a small closed set fixed
//! at build time ([`InferenceRegistry`](crate::InferenceRegistry) and
//! [`SingerRegistry`](crate::SingerRegistry)). A registry knows how to parse
//! its manifest fragments into specs and how to drive one spec through a
//! single lifecycle transition; the ordering of transitions across specs is
//! the [`Environment`](crate::Environment)'s job.

use std::path::Path;
use std::sync::Arc;

use serde_json::Value;

use crate::error::{Error, Result};
use crate::extension::{ExtensionSpec, ExtensionState};

/// Activation logic for one extension-point type.
pub trait ExtensionRegistry: Send + Sync {
    /// The `contributes` key this registry owns (e.g. `"inferences"`).
    fn spec_key(&self) -> &'static str;

    /// Parse one fragment from a manifest's `contributes` section.
    ///
    /// Relative sub-manifest paths are resolved against `base_dir`, the
    /// library directory. The returned spec is in state
    /// [`ExtensionState::Invalid`]. Errors are
    /// [`Error::InvalidFormat`] for missing or mistyped fields and
    /// [`Error::FileNotFound`] for an unreadable sub-manifest.
    fn parse_spec(&self, base_dir: &Path, fragment: &Value) -> Result<Arc<dyn ExtensionSpec>>;

    /// Drive one forward transition of a spec this registry parsed.
    ///
    /// `Finished` and `Deleted` are best-effort teardown targets and must
    /// not fail.
    fn load_spec(&self, spec: &Arc<dyn ExtensionSpec>, target: ExtensionState) -> Result<()>;
}

/// Fragment field helpers shared by the concrete registries.
pub(crate) mod fragment {
    use super::*;

    pub fn as_object<'a>(
        value: &'a Value,
        what: &str,
    ) -> Result<&'a serde_json::Map<String, Value>> {
        value
            .as_object()
            .ok_or_else(|| Error::invalid_format(format!("{what} must be an object")))
    }

    pub fn require_str<'a>(
        object: &'a serde_json::Map<String, Value>,
        field: &str,
        what: &str,
    ) -> Result<&'a str> {
        let value = object
            .get(field)
            .ok_or_else(|| Error::invalid_format(format!("{what}: missing field '{field}'")))?;
        value.as_str().filter(|s| !s.is_empty()).ok_or_else(|| {
            Error::invalid_format(format!("{what}: field '{field}' must be a non-empty string"))
        })
    }

    pub fn optional_str<'a>(
        object: &'a serde_json::Map<String, Value>,
        field: &str,
        what: &str,
    ) -> Result<Option<&'a str>> {
        match object.get(field) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.as_str())),
            Some(_) => Err(Error::invalid_format(format!(
                "{what}: field '{field}' must be a string"
            ))),
        }
    }
}
