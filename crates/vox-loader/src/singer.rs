//! The singer extension point.
//!
//! A singer contribution describes a voice character: localized display
//! name, presentation assets (avatar, background, demo) and a list of
//! imports naming the extensions it consumes. Asset files are checked at
//! `Initialized`; the `Ready` pass cross-references sibling imports, which
//! is only sound once every extension in the manifest has passed
//! `Initialized`.

use std::any::Any;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;

use vox_meta::{Identifier, LocalizedText};

use crate::error::{Error, Result};
use crate::extension::{ExtensionSpec, ExtensionState, SpecHeader};
use crate::inference::INFERENCE_SPEC_KEY;
use crate::registry::{ExtensionRegistry, fragment};

/// Manifest key of the singer section.
pub const SINGER_SPEC_KEY: &str = "singers";

/// Default sub-manifest filename when the fragment omits `path`.
const DEFAULT_SUB_MANIFEST: &str = "singer.json";

/// Serde shape of the singer sub-manifest.
#[derive(Debug, Deserialize)]
struct SingerSubManifest {
    name: LocalizedText,
    #[serde(default)]
    avatar: Option<String>,
    #[serde(default)]
    background: Option<String>,
    #[serde(default)]
    demo: Option<String>,
    #[serde(default)]
    imports: Vec<String>,
}

/// One singer contribution.
pub struct SingerSpec {
    header: SpecHeader,
    name: LocalizedText,
    avatar: Option<PathBuf>,
    background: Option<PathBuf>,
    demo: Option<PathBuf>,
    imports: Vec<Identifier>,
}

impl SingerSpec {
    pub fn name(&self) -> &LocalizedText {
        &self.name
    }

    /// Absolute path of the avatar image, if declared.
    pub fn avatar(&self) -> Option<&Path> {
        self.avatar.as_deref()
    }

    pub fn background(&self) -> Option<&Path> {
        self.background.as_deref()
    }

    pub fn demo(&self) -> Option<&Path> {
        self.demo.as_deref()
    }

    /// Extensions this singer consumes. Bare ids reference siblings in the
    /// same manifest; library-qualified ids reference other libraries.
    pub fn imports(&self) -> &[Identifier] {
        &self.imports
    }

    fn assets(&self) -> impl Iterator<Item = &Path> {
        [&self.avatar, &self.background, &self.demo]
            .into_iter()
            .flatten()
            .map(PathBuf::as_path)
    }
}

impl ExtensionSpec for SingerSpec {
    fn header(&self) -> &SpecHeader {
        &self.header
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Registry of the `singers` extension point.
#[derive(Default)]
pub struct SingerRegistry;

impl SingerRegistry {
    pub fn new() -> Self {
        Self
    }

    fn downcast<'a>(&self, spec: &'a Arc<dyn ExtensionSpec>) -> Result<&'a SingerSpec> {
        spec.as_any()
            .downcast_ref::<SingerSpec>()
            .ok_or_else(|| Error::invalid_format("spec was not parsed by the singer registry"))
    }

    fn check_assets(&self, singer: &SingerSpec) -> Result<()> {
        for asset in singer.assets() {
            if !asset.is_file() {
                return Err(Error::FileNotFound(asset.to_path_buf()));
            }
        }
        Ok(())
    }

    /// Verify that every bare import names a sibling inference extension.
    ///
    /// Imports qualified with a library id point outside this manifest and
    /// are resolved by consumers, not by the kernel.
    fn check_imports(&self, singer: &SingerSpec) -> Result<()> {
        let Some(manifest) = singer.header.library() else {
            return Ok(());
        };
        for import in &singer.imports {
            if import.has_library() {
                continue;
            }
            let local = import.local_id().unwrap_or_default();
            if manifest.extension(INFERENCE_SPEC_KEY, local).is_none() {
                return Err(Error::LibraryNotFound(format!(
                    "singer '{}' imports unknown sibling extension '{local}'",
                    singer.id()
                )));
            }
        }
        Ok(())
    }
}

impl ExtensionRegistry for SingerRegistry {
    fn spec_key(&self) -> &'static str {
        SINGER_SPEC_KEY
    }

    fn parse_spec(&self, base_dir: &Path, value: &Value) -> Result<Arc<dyn ExtensionSpec>> {
        let object = fragment::as_object(value, "singer fragment")?;
        let id = fragment::require_str(object, "id", "singer fragment")?;
        let rel_path = fragment::optional_str(object, "path", "singer fragment")?
            .unwrap_or(DEFAULT_SUB_MANIFEST);

        let sub_path = base_dir.join(rel_path);
        let bytes =
            std::fs::read(&sub_path).map_err(|_| Error::FileNotFound(sub_path.clone()))?;
        let sub: SingerSubManifest = serde_json::from_slice(&bytes).map_err(|e| {
            Error::invalid_format(format!("{}: {e}", sub_path.display()))
        })?;

        if sub.name.is_empty() {
            return Err(Error::invalid_format(format!(
                "{}: 'name' must not be empty",
                sub_path.display()
            )));
        }

        let sub_dir = sub_path.parent().unwrap_or(base_dir);
        let resolve = |rel: Option<String>| rel.map(|r| sub_dir.join(r));

        let imports = sub
            .imports
            .iter()
            .map(|raw| parse_import(raw))
            .collect::<Result<Vec<_>>>()?;

        Ok(Arc::new(SingerSpec {
            header: SpecHeader::new(SINGER_SPEC_KEY, id),
            name: sub.name,
            avatar: resolve(sub.avatar),
            background: resolve(sub.background),
            demo: resolve(sub.demo),
            imports,
        }))
    }

    fn load_spec(&self, spec: &Arc<dyn ExtensionSpec>, target: ExtensionState) -> Result<()> {
        let singer = self.downcast(spec)?;
        if !singer.header.check_advance(target)? {
            return Ok(());
        }
        match target {
            ExtensionState::Initialized => self.check_assets(singer)?,
            ExtensionState::Ready => self.check_imports(singer)?,
            ExtensionState::Finished | ExtensionState::Deleted => {}
            ExtensionState::Invalid => unreachable!("rejected by check_advance"),
        }
        singer.header.set_state(target);
        Ok(())
    }
}

/// An import is either a bare sibling id or a full `library[version]/id`
/// reference.
fn parse_import(raw: &str) -> Result<Identifier> {
    let result = if raw.contains('/') || raw.contains('[') {
        raw.parse()
    } else {
        Identifier::local(raw)
    };
    result.map_err(|e| Error::invalid_format(format!("import '{raw}': {e}")))
}
