//! The module environment: the orchestrator of library open/close.
//!
//! An [`Environment`] owns the plugin locator, the fixed set of extension
//! registries, the search paths and catalog cache, and the loaded-library
//! table. It drives the whole open pipeline: manifest parse, duplicate and
//! cycle detection, recursive dependency resolution, and the two-phase
//! extension activation (`Initialized`, then `Ready`) with rollback.
//!
//! Environments are constructed and passed explicitly; there is no
//! process-wide default instance.
//!
//! # Locking
//!
//! One read/write lock guards all environment state. An open call acquires
//! and releases it once per phase rather than across the whole call —
//! dependency resolution re-enters [`Environment::open_library`] and the
//! lock is not reentrant. The invariants (no duplicate path, no cycle)
//! therefore hold between phases, not across a full call: two threads
//! racing to open the same brand-new path can both pass the duplicate check
//! and activate it. This window is an accepted limitation of the design.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;

use vox_meta::VersionNumber;
use vox_plugin::PluginLocator;

use crate::catalog::LibraryCatalog;
use crate::error::{Error, Result};
use crate::extension::{ExtensionSpec, ExtensionState};
use crate::inference::InferenceRegistry;
use crate::manifest::{Dependency, LibraryManifest};
use crate::registry::ExtensionRegistry;
use crate::singer::SingerRegistry;

/// Identity key of a manifest: the address of its `Arc` allocation.
fn manifest_key(manifest: &Arc<LibraryManifest>) -> usize {
    Arc::as_ptr(manifest) as usize
}

/// One published library: the sole strong owner of its manifest besides
/// caller-held handles.
struct LoadedEntry {
    manifest: Arc<LibraryManifest>,
    refcount: usize,
    /// Dependencies opened for this library, in acquisition order.
    linked: Vec<Arc<LibraryManifest>>,
}

/// The loaded-library table, indexed three ways. The indices are kept
/// consistent by routing every mutation through `insert` and `remove`.
#[derive(Default)]
struct LoadedTable {
    entries: HashMap<usize, LoadedEntry>,
    by_path: HashMap<PathBuf, usize>,
    by_id: HashMap<(String, VersionNumber), usize>,
}

impl LoadedTable {
    fn insert(&mut self, entry: LoadedEntry) {
        let key = manifest_key(&entry.manifest);
        self.by_path
            .insert(entry.manifest.path().to_path_buf(), key);
        self.by_id.insert(
            (entry.manifest.id().to_string(), *entry.manifest.version()),
            key,
        );
        self.entries.insert(key, entry);
    }

    fn remove(&mut self, key: usize) -> Option<LoadedEntry> {
        let entry = self.entries.remove(&key)?;
        self.by_path.remove(entry.manifest.path());
        self.by_id
            .remove(&(entry.manifest.id().to_string(), *entry.manifest.version()));
        Some(entry)
    }

    fn key_by_path(&self, path: &Path) -> Option<usize> {
        self.by_path.get(path).copied()
    }

    fn key_by_id(&self, id: &str, version: &VersionNumber) -> Option<usize> {
        self.by_id.get(&(id.to_string(), *version)).copied()
    }
}

#[derive(Default)]
struct EnvState {
    library_paths: Vec<PathBuf>,
    /// Set when the search paths change; the catalog is rebuilt on the next
    /// dependency resolution.
    paths_dirty: bool,
    catalog: LibraryCatalog,
    /// `(id, versions)` currently being opened somewhere in a resolution
    /// chain; used to reject cycles.
    pending: HashMap<String, HashSet<VersionNumber>>,
    /// Manifests opened in inspect mode or parked after a failed open.
    /// Never reference-counted.
    resources: Vec<Arc<LibraryManifest>>,
    loaded: LoadedTable,
}

impl EnvState {
    fn remove_pending(&mut self, manifest: &LibraryManifest) {
        if let Some(versions) = self.pending.get_mut(manifest.id()) {
            versions.remove(manifest.version());
            if versions.is_empty() {
                self.pending.remove(manifest.id());
            }
        }
    }
}

/// The module environment.
pub struct Environment {
    locator: Arc<PluginLocator>,
    /// Fixed at construction; iteration order defines the activation
    /// declaration order across extension types.
    registries: Vec<Arc<dyn ExtensionRegistry>>,
    state: RwLock<EnvState>,
}

impl Environment {
    /// Create an environment with its own plugin locator and the built-in
    /// registries (inferences, then singers).
    pub fn new() -> Self {
        Self::with_locator(Arc::new(PluginLocator::new()))
    }

    /// Create an environment sharing an existing plugin locator.
    pub fn with_locator(locator: Arc<PluginLocator>) -> Self {
        let registries: Vec<Arc<dyn ExtensionRegistry>> = vec![
            Arc::new(InferenceRegistry::new(locator.clone())),
            Arc::new(SingerRegistry::new()),
        ];
        Self {
            locator,
            registries,
            state: RwLock::new(EnvState::default()),
        }
    }

    /// The provider locator shared with the registries.
    pub fn locator(&self) -> &Arc<PluginLocator> {
        &self.locator
    }

    /// The registry owning a `contributes` key.
    pub fn registry(&self, spec_key: &str) -> Option<&Arc<dyn ExtensionRegistry>> {
        self.registries
            .iter()
            .find(|registry| registry.spec_key() == spec_key)
    }

    /// The configured library search paths.
    pub fn library_paths(&self) -> Vec<PathBuf> {
        self.state.read().library_paths.clone()
    }

    /// Append a library search path, invalidating the catalog cache.
    pub fn add_library_path(&self, path: impl AsRef<Path>) {
        let mut state = self.state.write();
        state.library_paths.push(path.as_ref().to_path_buf());
        state.paths_dirty = true;
    }

    /// Replace the library search paths, invalidating the catalog cache.
    pub fn set_library_paths(&self, paths: Vec<PathBuf>) {
        let mut state = self.state.write();
        state.library_paths = paths;
        state.paths_dirty = true;
    }

    /// Number of libraries currently published in the loaded table.
    pub fn loaded_count(&self) -> usize {
        self.state.read().loaded.entries.len()
    }

    /// Look up a loaded library by id and version.
    pub fn find_loaded(&self, id: &str, version: &VersionNumber) -> Option<Arc<LibraryManifest>> {
        let state = self.state.read();
        let key = state.loaded.key_by_id(id, version)?;
        state.loaded.entries.get(&key).map(|e| e.manifest.clone())
    }

    /// Open the library at `path`.
    ///
    /// With `inspect` set, the manifest is parsed and returned without
    /// dependency resolution or activation — read-only introspection with
    /// no side effects beyond the resource set.
    ///
    /// Failure semantics: an unreadable path or a manifest parse failure is
    /// an `Err` and produces no object. Every later failure — duplicate,
    /// cycle, unresolved dependency, activation error — returns
    /// `Ok(manifest)` with the error attached; callers must check
    /// [`LibraryManifest::error`] before treating the library as
    /// functional.
    pub fn open_library(
        &self,
        path: impl AsRef<Path>,
        inspect: bool,
    ) -> Result<Arc<LibraryManifest>> {
        let path = dunce::canonicalize(path.as_ref())
            .map_err(|_| Error::FileNotFound(path.as_ref().to_path_buf()))?;
        if !path.is_dir() {
            return Err(Error::FileNotFound(path));
        }

        // Fast path: an already-loaded path is re-referenced, not re-parsed.
        if !inspect {
            let mut state = self.state.write();
            if let Some(key) = state.loaded.key_by_path(&path)
                && let Some(entry) = state.loaded.entries.get_mut(&key)
            {
                entry.refcount += 1;
                tracing::debug!(
                    library = %entry.manifest.id(),
                    refcount = entry.refcount,
                    "library re-referenced"
                );
                return Ok(entry.manifest.clone());
            }
        }

        let manifest = LibraryManifest::parse(&path, &self.registries)?;

        if inspect {
            self.state.write().resources.push(manifest.clone());
            return Ok(manifest);
        }

        // Duplicate and cycle detection, then reservation in the pending
        // set for the rest of this call.
        {
            let mut state = self.state.write();
            if let Some(entry) = state
                .loaded
                .key_by_id(manifest.id(), manifest.version())
                .and_then(|key| state.loaded.entries.get_mut(&key))
            {
                if entry.manifest.path() == manifest.path() {
                    // Lost a race against an identical open; reuse it.
                    entry.refcount += 1;
                    return Ok(entry.manifest.clone());
                }
                let error = Error::FileDuplicated {
                    id: manifest.id().to_string(),
                    version: *manifest.version(),
                    existing: entry.manifest.path().to_path_buf(),
                };
                manifest.set_error(error);
                state.resources.push(manifest.clone());
                return Ok(manifest);
            }
            if state
                .pending
                .get(manifest.id())
                .is_some_and(|versions| versions.contains(manifest.version()))
            {
                let error = Error::RecursiveDependency {
                    id: manifest.id().to_string(),
                    version: *manifest.version(),
                };
                manifest.set_error(error);
                state.resources.push(manifest.clone());
                return Ok(manifest);
            }
            state
                .pending
                .entry(manifest.id().to_string())
                .or_default()
                .insert(*manifest.version());

            if state.paths_dirty {
                state.catalog = LibraryCatalog::scan(&state.library_paths);
                state.paths_dirty = false;
            }
        }

        // Dependency resolution; recursion happens with the lock released.
        let mut opened: Vec<Arc<LibraryManifest>> = Vec::new();
        for dependency in manifest.dependencies() {
            match self.resolve_dependency(dependency) {
                Ok(Some(library)) => opened.push(library),
                Ok(None) if dependency.required => {
                    let error = Error::LibraryNotFound(format!(
                        "required dependency '{dependency}' of library '{}'",
                        manifest.id()
                    ));
                    return Ok(self.fail_open(&manifest, error, opened));
                }
                Ok(None) => {
                    tracing::debug!(
                        library = %manifest.id(),
                        dependency = %dependency,
                        "optional dependency unresolved"
                    );
                }
                Err(error) => return Ok(self.fail_open(&manifest, error, opened)),
            }
        }

        // Stage one: every spec to Initialized, in declaration order.
        let specs = self.collect_specs(&manifest);
        for (index, (registry, spec)) in specs.iter().enumerate() {
            if let Err(error) = registry.load_spec(spec, ExtensionState::Initialized) {
                for (registry, spec) in specs[..=index].iter().rev() {
                    let _ = registry.load_spec(spec, ExtensionState::Deleted);
                }
                return Ok(self.fail_open(&manifest, error, opened));
            }
        }

        // Stage two: every spec to Ready. All specs are Initialized here,
        // so a failure tears every one of them down through Finished.
        for (registry, spec) in &specs {
            if let Err(error) = registry.load_spec(spec, ExtensionState::Ready) {
                for (registry, spec) in specs.iter().rev() {
                    let _ = registry.load_spec(spec, ExtensionState::Finished);
                    let _ = registry.load_spec(spec, ExtensionState::Deleted);
                }
                return Ok(self.fail_open(&manifest, error, opened));
            }
        }

        // Publish.
        {
            let mut state = self.state.write();
            state.remove_pending(&manifest);
            manifest.set_loaded(true);
            state.loaded.insert(LoadedEntry {
                manifest: manifest.clone(),
                refcount: 1,
                linked: opened,
            });
        }
        tracing::info!(
            library = %manifest.id(),
            version = %manifest.version(),
            path = %manifest.path().display(),
            "library loaded"
        );
        Ok(manifest)
    }

    /// Release one reference to a library.
    ///
    /// A manifest that only lives in the resource set is simply removed.
    /// Otherwise the refcount drops; at zero the entry is unpublished, its
    /// specs are finished and deleted in reverse declaration order, and the
    /// linked dependencies are closed recursively in reverse acquisition
    /// order. Closing a manifest this environment does not hold fails with
    /// `LibraryNotFound` and mutates nothing.
    pub fn close_library(&self, manifest: &Arc<LibraryManifest>) -> Result<()> {
        let key = manifest_key(manifest);
        let entry = {
            let mut state = self.state.write();
            if let Some(position) = state
                .resources
                .iter()
                .position(|candidate| Arc::ptr_eq(candidate, manifest))
            {
                state.resources.remove(position);
                tracing::debug!(library = %manifest.id(), "inspection manifest released");
                return Ok(());
            }

            let Some(entry) = state.loaded.entries.get_mut(&key) else {
                return Err(Error::LibraryNotFound(manifest.id().to_string()));
            };
            entry.refcount -= 1;
            if entry.refcount > 0 {
                tracing::debug!(
                    library = %manifest.id(),
                    refcount = entry.refcount,
                    "library still referenced"
                );
                return Ok(());
            }
            match state.loaded.remove(key) {
                Some(entry) => entry,
                None => return Ok(()),
            }
        };

        entry.manifest.set_loaded(false);
        for (registry, spec) in self.collect_specs(&entry.manifest).iter().rev() {
            let _ = registry.load_spec(spec, ExtensionState::Finished);
            let _ = registry.load_spec(spec, ExtensionState::Deleted);
        }
        for dependency in entry.linked.iter().rev() {
            if let Err(error) = self.close_library(dependency) {
                tracing::warn!(
                    library = %entry.manifest.id(),
                    dependency = %dependency.id(),
                    error = %error,
                    "linked dependency close failed"
                );
            }
        }
        tracing::info!(
            library = %entry.manifest.id(),
            version = %entry.manifest.version(),
            "library unloaded"
        );
        Ok(())
    }

    /// Try the catalog candidates for one dependency, in priority order.
    ///
    /// `Ok(Some)` carries the opened library; `Ok(None)` means no candidate
    /// succeeded. A candidate that fails because the chain is cyclic
    /// escalates to `Err(RecursiveDependency)` so the cycle is reported at
    /// the call the user made, not as a generic resolution miss.
    fn resolve_dependency(
        &self,
        dependency: &Dependency,
    ) -> Result<Option<Arc<LibraryManifest>>> {
        let candidates = {
            let state = self.state.read();
            state
                .catalog
                .candidates(&dependency.id, dependency.version.as_ref())
        };

        for candidate in candidates {
            match self.open_library(&candidate, false) {
                Ok(library) if library.is_loaded() => return Ok(Some(library)),
                Ok(library) => {
                    let error = library.error();
                    // Discard the inert candidate manifest.
                    let _ = self.close_library(&library);
                    if let Some(error @ Error::RecursiveDependency { .. }) = error {
                        return Err(error);
                    }
                    tracing::debug!(
                        dependency = %dependency,
                        candidate = %candidate.display(),
                        "dependency candidate rejected"
                    );
                }
                Err(error) => {
                    tracing::debug!(
                        dependency = %dependency,
                        candidate = %candidate.display(),
                        error = %error,
                        "dependency candidate unreadable"
                    );
                }
            }
        }
        Ok(None)
    }

    /// Unwind a failed open: close opened dependencies in reverse, release
    /// the pending reservation, attach the error and park the manifest in
    /// the resource set. The inert manifest is still returned to the
    /// caller.
    fn fail_open(
        &self,
        manifest: &Arc<LibraryManifest>,
        error: Error,
        opened: Vec<Arc<LibraryManifest>>,
    ) -> Arc<LibraryManifest> {
        for dependency in opened.iter().rev() {
            if let Err(close_error) = self.close_library(dependency) {
                tracing::warn!(
                    dependency = %dependency.id(),
                    error = %close_error,
                    "dependency close during unwind failed"
                );
            }
        }
        tracing::warn!(
            library = %manifest.id(),
            path = %manifest.path().display(),
            error = %error,
            "library open failed"
        );
        let mut state = self.state.write();
        state.remove_pending(manifest);
        manifest.set_error(error);
        state.resources.push(manifest.clone());
        manifest.clone()
    }

    /// All contributed specs of a manifest paired with their registries, in
    /// activation declaration order: registries in registration order,
    /// fragments in array order within a section.
    fn collect_specs(
        &self,
        manifest: &Arc<LibraryManifest>,
    ) -> Vec<(Arc<dyn ExtensionRegistry>, Arc<dyn ExtensionSpec>)> {
        let mut specs = Vec::with_capacity(manifest.extension_count());
        for registry in &self.registries {
            for spec in manifest.extensions(registry.spec_key()) {
                specs.push((registry.clone(), spec.clone()));
            }
        }
        specs
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("Environment")
            .field("library_paths", &state.library_paths)
            .field("loaded", &state.loaded.entries.len())
            .field("resources", &state.resources.len())
            .finish()
    }
}
