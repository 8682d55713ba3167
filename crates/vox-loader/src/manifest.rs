//! Library manifest parsing for `library.json` files.
//!
//! A library is an on-disk package directory whose `library.json` declares
//! identity, version, dependencies and the extensions it contributes:
//!
//! ```json
//! {
//!   "id": "some-voice",
//!   "version": "1.2",
//!   "compatVersion": "1.0",
//!   "vendor": { "_": "Example Vendor" },
//!   "description": "A demonstration voice library",
//!   "url": "https://example.com/some-voice",
//!   "dependencies": ["dsptools[0.4]", { "id": "extras", "required": false }],
//!   "contributes": {
//!     "inferences": [
//!       { "id": "acoustic", "class": "svs.AcousticInference", "path": "acoustic/config.json" }
//!     ],
//!     "singers": [
//!       { "id": "stella", "path": "stella/singer.json" }
//!     ]
//!   }
//! }
//! ```
//!
//! Parsing is registry-driven: the header is deserialized here, and each
//! `contributes` section is handed to the matching
//! [`ExtensionRegistry`](crate::ExtensionRegistry). A manifest that fails to
//! parse produces no object at all; failures in later loading stages are
//! attached to the returned manifest instead.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use serde::Deserialize;

use vox_meta::{Identifier, LocalizedText, VersionNumber, is_valid_id};

use crate::error::{Error, Result};
use crate::extension::ExtensionSpec;
use crate::registry::ExtensionRegistry;

/// Canonical manifest filename inside a library directory.
pub const MANIFEST_FILENAME: &str = "library.json";

/// One dependency declaration of a library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    /// Id of the required library.
    pub id: String,
    /// Requested version; `None` means no constraint.
    pub version: Option<VersionNumber>,
    /// Whether resolution failure fails the whole open.
    pub required: bool,
}

impl std::fmt::Display for Dependency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.version {
            Some(version) => write!(f, "{}[{version}]", self.id),
            None => f.write_str(&self.id),
        }
    }
}

/// Raw serde shape of the manifest header.
#[derive(Debug, Deserialize)]
struct RawManifest {
    id: String,
    version: VersionNumber,
    #[serde(default, rename = "compatVersion")]
    compat_version: Option<VersionNumber>,
    #[serde(default)]
    vendor: LocalizedText,
    #[serde(default)]
    copyright: LocalizedText,
    #[serde(default)]
    description: LocalizedText,
    #[serde(default)]
    url: String,
    #[serde(default)]
    dependencies: Vec<RawDependency>,
    #[serde(default)]
    contributes: serde_json::Map<String, serde_json::Value>,
}

/// A dependency is either a compact `"id[version]"` string or a full object.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawDependency {
    Compact(String),
    Full {
        id: String,
        #[serde(default)]
        version: Option<VersionNumber>,
        #[serde(default = "default_true")]
        required: bool,
    },
}

fn default_true() -> bool {
    true
}

impl RawDependency {
    fn resolve(self) -> Result<Dependency> {
        match self {
            Self::Compact(text) => {
                let identifier: Identifier = text
                    .parse()
                    .map_err(|e| Error::invalid_format(format!("dependency '{text}': {e}")))?;
                let id = identifier.library_name().ok_or_else(|| {
                    Error::invalid_format(format!("dependency '{text}': missing library id"))
                })?;
                if identifier.local_id().is_some() {
                    return Err(Error::invalid_format(format!(
                        "dependency '{text}': must reference a library, not an extension"
                    )));
                }
                Ok(Dependency {
                    id: id.to_string(),
                    version: identifier.version().copied(),
                    required: true,
                })
            }
            Self::Full {
                id,
                version,
                required,
            } => {
                if !is_valid_id(&id) {
                    return Err(Error::invalid_format(format!(
                        "dependency id '{id}' is not a valid identifier"
                    )));
                }
                Ok(Dependency {
                    id,
                    version,
                    required,
                })
            }
        }
    }
}

/// Extensions contributed under one `contributes` key, in declaration order.
pub(crate) struct ContributeSection {
    pub(crate) key: &'static str,
    pub(crate) specs: Vec<Arc<dyn ExtensionSpec>>,
}

/// The parsed, canonicalized representation of one on-disk library.
///
/// Owned behind `Arc`; the `Arc` pointer is the manifest's identity. Specs
/// hold only `Weak` back-references to their manifest, so the ownership
/// graph stays acyclic. A manifest carrying a terminal
/// [`error`](Self::error) is inert but still fully inspectable.
pub struct LibraryManifest {
    path: PathBuf,
    id: String,
    version: VersionNumber,
    compat_version: VersionNumber,
    vendor: LocalizedText,
    copyright: LocalizedText,
    description: LocalizedText,
    url: String,
    dependencies: Vec<Dependency>,
    sections: Vec<ContributeSection>,
    loaded: AtomicBool,
    error: Mutex<Option<Error>>,
}

impl LibraryManifest {
    /// Parse the manifest of the library at `path` (a canonical directory).
    ///
    /// `registries` defines both the recognized `contributes` keys and the
    /// activation declaration order. Any failure discards everything parsed
    /// so far; no manifest object is produced.
    pub(crate) fn parse(
        path: &Path,
        registries: &[Arc<dyn ExtensionRegistry>],
    ) -> Result<Arc<Self>> {
        let manifest_path = path.join(MANIFEST_FILENAME);
        let bytes = std::fs::read(&manifest_path)
            .map_err(|_| Error::FileNotFound(manifest_path.clone()))?;
        let raw: RawManifest = serde_json::from_slice(&bytes).map_err(|e| {
            Error::invalid_format(format!("{}: {e}", manifest_path.display()))
        })?;

        if !is_valid_id(&raw.id) {
            return Err(Error::invalid_format(format!(
                "library id '{}' is not a valid identifier",
                raw.id
            )));
        }

        let dependencies = raw
            .dependencies
            .into_iter()
            .map(RawDependency::resolve)
            .collect::<Result<Vec<_>>>()?;

        let mut contributes = raw.contributes;
        let mut sections = Vec::new();
        for registry in registries {
            let key = registry.spec_key();
            let Some(section) = contributes.remove(key) else {
                continue;
            };
            let fragments = section.as_array().ok_or_else(|| {
                Error::invalid_format(format!("contributes section '{key}' must be an array"))
            })?;

            let mut specs: Vec<Arc<dyn ExtensionSpec>> = Vec::with_capacity(fragments.len());
            for fragment in fragments {
                let spec = registry.parse_spec(path, fragment)?;
                if !is_valid_id(spec.id()) {
                    return Err(Error::invalid_format(format!(
                        "extension id '{}' is not a valid identifier",
                        spec.id()
                    )));
                }
                if specs.iter().any(|s| s.id() == spec.id()) {
                    return Err(Error::invalid_format(format!(
                        "duplicate extension id '{}' in section '{key}'",
                        spec.id()
                    )));
                }
                specs.push(spec);
            }
            sections.push(ContributeSection { key, specs });
        }

        if let Some(unknown) = contributes.keys().next() {
            return Err(Error::invalid_format(format!(
                "unknown contributes section '{unknown}'"
            )));
        }

        let manifest = Arc::new_cyclic(|weak| {
            for section in &sections {
                for spec in &section.specs {
                    spec.header().bind_library(weak.clone());
                }
            }
            Self {
                path: path.to_path_buf(),
                id: raw.id,
                version: raw.version,
                compat_version: raw.compat_version.unwrap_or(raw.version),
                vendor: raw.vendor,
                copyright: raw.copyright,
                description: raw.description,
                url: raw.url,
                dependencies,
                sections,
                loaded: AtomicBool::new(false),
                error: Mutex::new(None),
            }
        });
        Ok(manifest)
    }

    /// Canonical absolute directory path; the on-disk identity key.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn version(&self) -> &VersionNumber {
        &self.version
    }

    /// Oldest version this release remains dependency-compatible with.
    pub fn compat_version(&self) -> &VersionNumber {
        &self.compat_version
    }

    pub fn vendor(&self) -> &LocalizedText {
        &self.vendor
    }

    pub fn copyright(&self) -> &LocalizedText {
        &self.copyright
    }

    pub fn description(&self) -> &LocalizedText {
        &self.description
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn dependencies(&self) -> &[Dependency] {
        &self.dependencies
    }

    /// The contributed specs of one extension type, in declaration order.
    pub fn extensions(&self, spec_key: &str) -> &[Arc<dyn ExtensionSpec>] {
        self.sections
            .iter()
            .find(|section| section.key == spec_key)
            .map(|section| section.specs.as_slice())
            .unwrap_or(&[])
    }

    /// Look up one contributed spec by type and id.
    pub fn extension(&self, spec_key: &str, id: &str) -> Option<&Arc<dyn ExtensionSpec>> {
        self.extensions(spec_key).iter().find(|spec| spec.id() == id)
    }

    /// The total number of contributed specs.
    pub fn extension_count(&self) -> usize {
        self.sections.iter().map(|section| section.specs.len()).sum()
    }

    /// Whether the library completed activation and is published in the
    /// loaded-library table.
    pub fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::Acquire)
    }

    pub(crate) fn set_loaded(&self, loaded: bool) {
        self.loaded.store(loaded, Ordering::Release);
    }

    /// The terminal error recorded on this manifest, if any. A manifest
    /// with an error is inert but remains a valid, inspectable object.
    pub fn error(&self) -> Option<Error> {
        self.error.lock().clone()
    }

    pub fn has_error(&self) -> bool {
        self.error.lock().is_some()
    }

    pub(crate) fn set_error(&self, error: Error) {
        *self.error.lock() = Some(error);
    }
}

impl std::fmt::Debug for LibraryManifest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LibraryManifest")
            .field("id", &self.id)
            .field("version", &self.version)
            .field("path", &self.path)
            .field("loaded", &self.is_loaded())
            .field("error", &*self.error.lock())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_compact_dependency_parses() {
        let dep = RawDependency::Compact("dsptools[0.4]".to_string())
            .resolve()
            .unwrap();
        assert_eq!(dep.id, "dsptools");
        assert_eq!(dep.version, Some(VersionNumber::new(0, 4, 0, 0)));
        assert!(dep.required);
    }

    #[test]
    fn test_compact_dependency_without_version() {
        let dep = RawDependency::Compact("dsptools".to_string())
            .resolve()
            .unwrap();
        assert_eq!(dep.id, "dsptools");
        assert_eq!(dep.version, None);
    }

    #[test]
    fn test_compact_dependency_rejects_extension_reference() {
        let result = RawDependency::Compact("lib[1.0]/ext".to_string()).resolve();
        assert!(matches!(result, Err(Error::InvalidFormat(_))));
    }

    #[test]
    fn test_full_dependency_defaults_required() {
        let raw: RawDependency = serde_json::from_str(r#"{ "id": "extras" }"#).unwrap();
        let dep = raw.resolve().unwrap();
        assert_eq!(dep.id, "extras");
        assert!(dep.required);

        let raw: RawDependency =
            serde_json::from_str(r#"{ "id": "extras", "required": false }"#).unwrap();
        assert!(!raw.resolve().unwrap().required);
    }

    #[test]
    fn test_dependency_display() {
        let with_version = Dependency {
            id: "a".into(),
            version: Some(VersionNumber::new(1, 2, 0, 0)),
            required: true,
        };
        assert_eq!(with_version.to_string(), "a[1.2]");

        let bare = Dependency {
            id: "a".into(),
            version: None,
            required: true,
        };
        assert_eq!(bare.to_string(), "a");
    }
}
