//! The library catalog cache.
//!
//! An ephemeral index of the libraries available under the configured
//! search paths, built from manifest headers only — no dependency
//! resolution, no activation. The environment rebuilds it whenever the
//! search paths change and consults it to find dependency candidates.

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use vox_meta::{VersionNumber, is_valid_id};

use crate::manifest::MANIFEST_FILENAME;

/// One catalogued library version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    /// Library directory path.
    pub path: PathBuf,
    /// Oldest version this release claims compatibility with.
    pub compat_version: VersionNumber,
}

/// The header fields read during a scan; everything else is skipped.
#[derive(Debug, Deserialize)]
struct HeaderProbe {
    id: String,
    version: VersionNumber,
    #[serde(default, rename = "compatVersion")]
    compat_version: Option<VersionNumber>,
}

/// Index of available libraries: id → version → entry.
#[derive(Debug, Default)]
pub struct LibraryCatalog {
    libraries: HashMap<String, BTreeMap<VersionNumber, CatalogEntry>>,
}

impl LibraryCatalog {
    /// Scan the search paths' immediate subdirectories for manifest
    /// headers. Malformed entries are skipped with a warning; for a
    /// duplicate `(id, version)` the first configured path wins.
    pub fn scan(search_paths: &[PathBuf]) -> Self {
        let mut catalog = Self::default();
        for search_path in search_paths {
            let entries = match std::fs::read_dir(search_path) {
                Ok(entries) => entries,
                Err(e) => {
                    tracing::warn!(path = %search_path.display(), error = %e, "search path not readable");
                    continue;
                }
            };
            let mut dirs: Vec<PathBuf> = entries
                .flatten()
                .map(|e| e.path())
                .filter(|p| p.is_dir())
                .collect();
            dirs.sort();
            for dir in dirs {
                catalog.probe(&dir);
            }
        }
        catalog
    }

    fn probe(&mut self, dir: &Path) {
        let manifest_path = dir.join(MANIFEST_FILENAME);
        let Ok(bytes) = std::fs::read(&manifest_path) else {
            return;
        };
        let header: HeaderProbe = match serde_json::from_slice(&bytes) {
            Ok(header) => header,
            Err(e) => {
                tracing::warn!(path = %manifest_path.display(), error = %e, "manifest header skipped");
                return;
            }
        };
        if !is_valid_id(&header.id) {
            tracing::warn!(path = %manifest_path.display(), id = %header.id, "invalid library id skipped");
            return;
        }

        let versions = self.libraries.entry(header.id).or_default();
        versions.entry(header.version).or_insert_with(|| CatalogEntry {
            path: dir.to_path_buf(),
            compat_version: header.compat_version.unwrap_or(header.version),
        });
    }

    /// Candidate library paths for a dependency on `(id, requested)`, in
    /// the order they should be tried.
    ///
    /// A candidate qualifies when its version matches exactly, or when its
    /// version is above the request and its `compat_version` reaches down
    /// to it. The exact match is first, then qualifying versions ascending
    /// from the request — the closest compatible release wins. Without a
    /// requested version every known version qualifies, highest first.
    pub fn candidates(&self, id: &str, requested: Option<&VersionNumber>) -> Vec<PathBuf> {
        let Some(versions) = self.libraries.get(id) else {
            return Vec::new();
        };
        match requested {
            Some(requested) => {
                let mut paths = Vec::new();
                if let Some(entry) = versions.get(requested) {
                    paths.push(entry.path.clone());
                }
                let above = (Bound::Excluded(*requested), Bound::Unbounded);
                for (_, entry) in versions.range(above) {
                    if entry.compat_version <= *requested {
                        paths.push(entry.path.clone());
                    }
                }
                paths
            }
            None => versions.values().rev().map(|e| e.path.clone()).collect(),
        }
    }

    /// The known versions of a library, ascending.
    pub fn versions_of(&self, id: &str) -> Vec<VersionNumber> {
        self.libraries
            .get(id)
            .map(|versions| versions.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Number of distinct library ids.
    pub fn len(&self) -> usize {
        self.libraries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.libraries.is_empty()
    }
}
