//! [`LibraryBuilder`] for on-disk library package fixtures.
//!
//! Builds a directory tree with a `library.json` manifest, optional
//! inference and singer sub-manifests, and asset placeholder files, ready
//! to be opened through an
//! [`Environment`](vox_loader::Environment).

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value, json};

use vox_loader::MANIFEST_FILENAME;

/// Fluent builder writing one library package directory.
///
/// # Example
///
/// ```rust,no_run
/// use vox_testkit::library::LibraryBuilder;
///
/// let dir = tempfile::tempdir().unwrap();
/// let lib = LibraryBuilder::new("some-voice", "1.2")
///     .compat_version("1.0")
///     .dependency("dsptools[0.4]")
///     .inference("acoustic", "svs.AcousticInference", 1)
///     .singer("stella", &["acoustic"])
///     .write(dir.path());
/// assert!(lib.join("library.json").is_file());
/// ```
pub struct LibraryBuilder {
    id: String,
    version: String,
    compat_version: Option<String>,
    dependencies: Vec<Value>,
    inferences: Vec<Value>,
    singers: Vec<Value>,
    /// Extra files written relative to the library dir.
    files: Vec<(String, String)>,
}

impl LibraryBuilder {
    pub fn new(id: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            version: version.into(),
            compat_version: None,
            dependencies: Vec::new(),
            inferences: Vec::new(),
            singers: Vec::new(),
            files: Vec::new(),
        }
    }

    pub fn compat_version(mut self, version: impl Into<String>) -> Self {
        self.compat_version = Some(version.into());
        self
    }

    /// Add a compact dependency declaration, e.g. `"base[1.0]"`.
    pub fn dependency(mut self, spec: &str) -> Self {
        self.dependencies.push(json!(spec));
        self
    }

    /// Add an optional dependency by id.
    pub fn optional_dependency(mut self, id: &str) -> Self {
        self.dependencies.push(json!({ "id": id, "required": false }));
        self
    }

    /// Contribute an inference extension, writing its sub-manifest at
    /// `<id>.json`.
    pub fn inference(mut self, id: &str, class: &str, level: u32) -> Self {
        let sub_path = format!("{id}.json");
        self.inferences.push(json!({ "id": id, "class": class, "path": sub_path }));
        self.files.push((
            format!("{id}.json"),
            json!({ "name": id, "level": level, "schema": {} }).to_string(),
        ));
        self
    }

    /// Contribute a singer extension importing `imports` by bare sibling id,
    /// writing its sub-manifest at `<id>/singer.json`.
    pub fn singer(mut self, id: &str, imports: &[&str]) -> Self {
        let sub_path = format!("{id}/singer.json");
        self.singers.push(json!({ "id": id, "path": sub_path }));
        self.files.push((
            sub_path,
            json!({ "name": id, "imports": imports }).to_string(),
        ));
        self
    }

    /// Write an extra file relative to the library directory.
    pub fn file(mut self, rel_path: impl Into<String>, content: impl Into<String>) -> Self {
        self.files.push((rel_path.into(), content.into()));
        self
    }

    /// Write the package under `root/<id>-<version>` and return its path.
    pub fn write(self, root: &Path) -> PathBuf {
        let dir_name = format!("{}-{}", self.id, self.version);
        self.write_as(root, &dir_name)
    }

    /// Write the package under `root/<dir_name>` and return its path.
    pub fn write_as(self, root: &Path, dir_name: &str) -> PathBuf {
        let dir = root.join(dir_name);
        fs::create_dir_all(&dir).expect("LibraryBuilder: failed to create library dir");

        let mut manifest = Map::new();
        manifest.insert("id".into(), json!(self.id));
        manifest.insert("version".into(), json!(self.version));
        if let Some(compat) = &self.compat_version {
            manifest.insert("compatVersion".into(), json!(compat));
        }
        if !self.dependencies.is_empty() {
            manifest.insert("dependencies".into(), Value::Array(self.dependencies));
        }
        let mut contributes = Map::new();
        if !self.inferences.is_empty() {
            contributes.insert("inferences".into(), Value::Array(self.inferences));
        }
        if !self.singers.is_empty() {
            contributes.insert("singers".into(), Value::Array(self.singers));
        }
        if !contributes.is_empty() {
            manifest.insert("contributes".into(), Value::Object(contributes));
        }

        fs::write(
            dir.join(MANIFEST_FILENAME),
            serde_json::to_string_pretty(&Value::Object(manifest))
                .expect("LibraryBuilder: manifest serialization failed"),
        )
        .expect("LibraryBuilder: failed to write manifest");

        for (rel_path, content) in self.files {
            let path = dir.join(rel_path);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).expect("LibraryBuilder: failed to create sub dir");
            }
            fs::write(path, content).expect("LibraryBuilder: failed to write file");
        }
        dir
    }
}
