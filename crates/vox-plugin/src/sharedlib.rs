//! Thin OS abstraction over dynamic modules.
//!
//! Wraps [`libloading::Library`] with path-carrying errors and the platform
//! file-extension check used during directory scans. A module stays mapped
//! for as long as the wrapper is alive; the locator keeps its wrappers until
//! teardown because provider objects may still be referenced by active work.

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// An open dynamic module.
pub struct SharedLibrary {
    library: libloading::Library,
    path: PathBuf,
}

impl SharedLibrary {
    /// Open the module at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let library = unsafe {
            libloading::Library::new(&path).map_err(|e| Error::OpenFailed {
                path: path.clone(),
                message: e.to_string(),
            })?
        };
        Ok(Self { library, path })
    }

    /// Resolve one exported symbol.
    ///
    /// # Safety
    ///
    /// The caller must supply the correct type for the symbol; see
    /// [`libloading::Library::get`].
    pub unsafe fn get<T>(&self, symbol: &[u8]) -> Result<libloading::Symbol<'_, T>> {
        unsafe {
            self.library.get(symbol).map_err(|e| Error::SymbolNotFound {
                path: self.path.clone(),
                symbol: String::from_utf8_lossy(symbol).into_owned(),
                message: e.to_string(),
            })
        }
    }

    /// The path this module was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether a file looks like a loadable module on this platform.
    pub fn is_loadable(path: &Path) -> bool {
        let ext = path.extension().and_then(|e| e.to_str());
        match std::env::consts::OS {
            "macos" => ext == Some("dylib"),
            "windows" => ext == Some("dll"),
            _ => ext == Some("so"),
        }
    }
}

impl std::fmt::Debug for SharedLibrary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedLibrary")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_missing_module_fails() {
        let err = SharedLibrary::open("/nonexistent/module.so").unwrap_err();
        assert!(matches!(err, Error::OpenFailed { .. }));
    }

    #[test]
    fn test_is_loadable_matches_platform() {
        #[cfg(target_os = "linux")]
        {
            assert!(SharedLibrary::is_loadable(Path::new("mod.so")));
            assert!(!SharedLibrary::is_loadable(Path::new("mod.dylib")));
        }
        #[cfg(target_os = "macos")]
        {
            assert!(SharedLibrary::is_loadable(Path::new("mod.dylib")));
            assert!(!SharedLibrary::is_loadable(Path::new("mod.so")));
        }
        #[cfg(windows)]
        {
            assert!(SharedLibrary::is_loadable(Path::new("mod.dll")));
            assert!(!SharedLibrary::is_loadable(Path::new("mod.so")));
        }
        assert!(!SharedLibrary::is_loadable(Path::new("readme.txt")));
    }
}
