//! The plugin locator: `(interface id, key)` → provider.
//!
//! Providers come from in-process static registrations and from directories
//! scanned for loadable native modules. Scanning is lazy per interface id: a
//! mutation (static registration, path change) marks the interface dirty and
//! the directory walk happens on the next [`PluginLocator::plugin`] lookup
//! for that interface.
//!
//! Registration is first-wins: once a `(interface, key)` slot is filled,
//! later registrants for the same slot are silently discarded, so the first
//! configured source takes priority. Malformed modules — missing entry
//! point, ABI mismatch, interface-id mismatch — are skipped without error
//! and surface later as a failed lookup.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::provider::{ABI_VERSION, DECLARATION_SYMBOL, PluginDeclaration, Provider};
use crate::sharedlib::SharedLibrary;

/// Discovers and owns capability providers.
///
/// Native modules opened during a scan stay open for the locator's full
/// lifetime — a provider object may be referenced by active work — and are
/// released only when the locator is dropped, in no specified order.
#[derive(Default)]
pub struct PluginLocator {
    state: RwLock<LocatorState>,
}

#[derive(Default)]
struct LocatorState {
    /// interface id → key → provider. First registrant wins.
    providers: HashMap<String, HashMap<String, Arc<dyn Provider>>>,
    /// Static registrations not yet merged into `providers`, per interface.
    pending_static: HashMap<String, Vec<Arc<dyn Provider>>>,
    /// Scan directories per interface id, in configured order.
    paths: HashMap<String, Vec<PathBuf>>,
    /// Interface ids whose tables are stale.
    dirty: HashSet<String>,
    /// Module files already probed; never reopened.
    probed: HashSet<PathBuf>,
    /// Open module handles, kept alive until teardown.
    libraries: Vec<SharedLibrary>,
}

impl PluginLocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an in-process provider.
    ///
    /// Takes effect on the next lookup for the provider's interface; if the
    /// `(interface, key)` slot is already filled by then, the registration
    /// is discarded.
    pub fn add_static_plugin(&self, provider: Arc<dyn Provider>) {
        let mut state = self.state.write();
        let iid = provider.interface().to_string();
        state
            .pending_static
            .entry(iid.clone())
            .or_default()
            .push(provider);
        state.dirty.insert(iid);
    }

    /// Append a scan directory for an interface id.
    pub fn add_plugin_path(&self, iid: &str, path: impl AsRef<Path>) {
        let mut state = self.state.write();
        state
            .paths
            .entry(iid.to_string())
            .or_default()
            .push(path.as_ref().to_path_buf());
        state.dirty.insert(iid.to_string());
    }

    /// Replace the scan directories for an interface id.
    pub fn set_plugin_paths(&self, iid: &str, paths: Vec<PathBuf>) {
        let mut state = self.state.write();
        state.paths.insert(iid.to_string(), paths);
        state.dirty.insert(iid.to_string());
    }

    /// The configured scan directories for an interface id.
    pub fn plugin_paths(&self, iid: &str) -> Vec<PathBuf> {
        self.state.read().paths.get(iid).cloned().unwrap_or_default()
    }

    /// Look up the provider registered under `(iid, key)`.
    ///
    /// Performs the lazy rescan for `iid` first if it is dirty.
    pub fn plugin(&self, iid: &str, key: &str) -> Option<Arc<dyn Provider>> {
        {
            let state = self.state.read();
            if !state.dirty.contains(iid) {
                return state.providers.get(iid)?.get(key).cloned();
            }
        }

        let mut state = self.state.write();
        // Another thread may have rescanned between the lock handoff.
        if state.dirty.contains(iid) {
            state.rescan(iid);
        }
        state.providers.get(iid)?.get(key).cloned()
    }

    /// Whether a provider is registered under `(iid, key)`.
    pub fn has_plugin(&self, iid: &str, key: &str) -> bool {
        self.plugin(iid, key).is_some()
    }

    /// The keys currently registered for an interface id, sorted.
    pub fn plugin_keys(&self, iid: &str) -> Vec<String> {
        {
            let state = self.state.read();
            if state.dirty.contains(iid) {
                drop(state);
                let mut state = self.state.write();
                if state.dirty.contains(iid) {
                    state.rescan(iid);
                }
            }
        }
        let state = self.state.read();
        let mut keys: Vec<String> = state
            .providers
            .get(iid)
            .map(|table| table.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        keys
    }
}

impl LocatorState {
    /// Merge pending statics and probe scan directories for one interface.
    fn rescan(&mut self, iid: &str) {
        for provider in self.pending_static.remove(iid).unwrap_or_default() {
            let key = provider.key().to_string();
            let table = self.providers.entry(iid.to_string()).or_default();
            if table.contains_key(&key) {
                tracing::debug!(iid, key, "duplicate static provider discarded");
            } else {
                table.insert(key, provider);
            }
        }

        for dir in self.paths.get(iid).cloned().unwrap_or_default() {
            let mut entries: Vec<PathBuf> = match std::fs::read_dir(&dir) {
                Ok(entries) => entries
                    .flatten()
                    .map(|e| e.path())
                    .filter(|p| SharedLibrary::is_loadable(p))
                    .collect(),
                Err(e) => {
                    tracing::warn!(dir = %dir.display(), error = %e, "plugin path not readable");
                    continue;
                }
            };
            entries.sort();

            for path in entries {
                if !self.probed.insert(path.clone()) {
                    continue;
                }
                self.probe_module(iid, &path);
            }
        }

        self.dirty.remove(iid);
    }

    /// Open one module, resolve its declaration and register its provider.
    ///
    /// Every failure mode here is swallowed; a broken module must not break
    /// discovery for its siblings.
    fn probe_module(&mut self, iid: &str, path: &Path) {
        let library = match SharedLibrary::open(path) {
            Ok(library) => library,
            Err(e) => {
                tracing::debug!(module = %path.display(), error = %e, "module skipped");
                return;
            }
        };

        let declaration = match unsafe { library.get::<*mut PluginDeclaration>(DECLARATION_SYMBOL) }
        {
            Ok(symbol) => unsafe { symbol.read() },
            Err(e) => {
                tracing::debug!(module = %path.display(), error = %e, "no plugin declaration");
                return;
            }
        };

        if declaration.abi_version != ABI_VERSION {
            tracing::warn!(
                module = %path.display(),
                found = declaration.abi_version,
                expected = ABI_VERSION,
                "plugin ABI mismatch, module skipped"
            );
            return;
        }

        let provider: Arc<dyn Provider> = Arc::from((declaration.create)());
        if provider.interface() != iid {
            tracing::debug!(
                module = %path.display(),
                declared = provider.interface(),
                scanned = iid,
                "interface id mismatch, provider discarded"
            );
            // The module stays open; its provider was constructed against it.
            self.libraries.push(library);
            return;
        }

        let key = provider.key().to_string();
        let table = self.providers.entry(iid.to_string()).or_default();
        if table.contains_key(&key) {
            tracing::debug!(iid, key, module = %path.display(), "duplicate provider discarded");
        } else {
            tracing::debug!(iid, key, module = %path.display(), "provider registered");
            table.insert(key, provider);
        }
        self.libraries.push(library);
    }
}

impl std::fmt::Debug for PluginLocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("PluginLocator")
            .field("interfaces", &state.providers.keys().collect::<Vec<_>>())
            .field("open_modules", &state.libraries.len())
            .finish()
    }
}
