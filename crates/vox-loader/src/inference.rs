//! The inference extension point.
//!
//! An inference contribution names a target interpreter class, a capability
//! level, and schema/configuration objects read from a sub-manifest. At
//! `Initialized` the registry locates a matching [`Interpreter`] provider
//! through the plugin locator and validates the spec against it; the bound
//! interpreter handle is released again at `Finished`.
//!
//! The concrete interpreters themselves (session creation, tensor
//! execution) live outside the kernel; [`Interpreter`] is only their
//! boundary.

use std::any::Any;
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::Value;

use vox_plugin::{PluginLocator, Provider};

use crate::error::{Error, Result};
use crate::extension::{ExtensionSpec, ExtensionState, SpecHeader};
use crate::registry::{ExtensionRegistry, fragment};

/// Interface id interpreter providers register under in the plugin locator.
pub const INTERPRETER_IID: &str = "vox.InferenceInterpreter";

/// Manifest key of the inference section.
pub const INFERENCE_SPEC_KEY: &str = "inferences";

/// Boundary of a concrete inference interpreter.
pub trait Interpreter: Send + Sync {
    /// The class name inference specs select this interpreter by.
    fn class_name(&self) -> &str;

    /// Highest capability level this interpreter implements.
    fn level(&self) -> u32;

    /// Validate a parsed spec's schema and configuration. The message is
    /// reported to the caller as an `InvalidFormat` error.
    fn validate_spec(&self, spec: &InferenceSpec) -> std::result::Result<(), String>;
}

/// Adapter registering an [`Interpreter`] as a locator provider.
pub struct InterpreterPlugin {
    interpreter: Arc<dyn Interpreter>,
}

impl InterpreterPlugin {
    pub fn new(interpreter: Arc<dyn Interpreter>) -> Self {
        Self { interpreter }
    }

    pub fn interpreter(&self) -> &Arc<dyn Interpreter> {
        &self.interpreter
    }
}

impl Provider for InterpreterPlugin {
    fn interface(&self) -> &str {
        INTERPRETER_IID
    }

    fn key(&self) -> &str {
        self.interpreter.class_name()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Serde shape of the inference sub-manifest.
#[derive(Debug, Deserialize)]
struct InferenceSubManifest {
    name: String,
    level: u32,
    #[serde(default)]
    schema: Value,
    #[serde(default)]
    configuration: Value,
}

/// One inference contribution.
pub struct InferenceSpec {
    header: SpecHeader,
    class: String,
    name: String,
    level: u32,
    schema: Value,
    configuration: Value,
    /// Bound at `Initialized`, released at `Finished`/`Deleted`.
    interpreter: Mutex<Option<Arc<dyn Interpreter>>>,
}

impl InferenceSpec {
    /// The interpreter class name this spec targets.
    pub fn class(&self) -> &str {
        &self.class
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared capability level, always ≥ 1.
    pub fn level(&self) -> u32 {
        self.level
    }

    pub fn schema(&self) -> &Value {
        &self.schema
    }

    pub fn configuration(&self) -> &Value {
        &self.configuration
    }

    /// The interpreter bound during activation, while the spec is between
    /// `Initialized` and `Finished`.
    pub fn interpreter(&self) -> Option<Arc<dyn Interpreter>> {
        self.interpreter.lock().clone()
    }
}

impl ExtensionSpec for InferenceSpec {
    fn header(&self) -> &SpecHeader {
        &self.header
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Registry of the `inferences` extension point.
pub struct InferenceRegistry {
    locator: Arc<PluginLocator>,
}

impl InferenceRegistry {
    pub fn new(locator: Arc<PluginLocator>) -> Self {
        Self { locator }
    }

    fn downcast<'a>(&self, spec: &'a Arc<dyn ExtensionSpec>) -> Result<&'a InferenceSpec> {
        spec.as_any()
            .downcast_ref::<InferenceSpec>()
            .ok_or_else(|| Error::invalid_format("spec was not parsed by the inference registry"))
    }

    fn bind_interpreter(&self, spec: &InferenceSpec) -> Result<()> {
        let provider = self
            .locator
            .plugin(INTERPRETER_IID, spec.class())
            .ok_or_else(|| {
                Error::FeatureNotSupported(format!(
                    "no interpreter registered for class '{}'",
                    spec.class()
                ))
            })?;
        let plugin = provider
            .as_any()
            .downcast_ref::<InterpreterPlugin>()
            .ok_or_else(|| {
                Error::FeatureNotSupported(format!(
                    "provider for class '{}' is not an interpreter",
                    spec.class()
                ))
            })?;
        let interpreter = plugin.interpreter().clone();

        if interpreter.level() < spec.level() {
            return Err(Error::FeatureNotSupported(format!(
                "interpreter '{}' implements level {}, spec requires {}",
                spec.class(),
                interpreter.level(),
                spec.level()
            )));
        }
        interpreter
            .validate_spec(spec)
            .map_err(Error::InvalidFormat)?;

        *spec.interpreter.lock() = Some(interpreter);
        Ok(())
    }
}

impl ExtensionRegistry for InferenceRegistry {
    fn spec_key(&self) -> &'static str {
        INFERENCE_SPEC_KEY
    }

    fn parse_spec(&self, base_dir: &Path, value: &Value) -> Result<Arc<dyn ExtensionSpec>> {
        let object = fragment::as_object(value, "inference fragment")?;
        let id = fragment::require_str(object, "id", "inference fragment")?;
        let class = fragment::require_str(object, "class", "inference fragment")?;
        let rel_path = fragment::require_str(object, "path", "inference fragment")?;

        let sub_path = base_dir.join(rel_path);
        let bytes =
            std::fs::read(&sub_path).map_err(|_| Error::FileNotFound(sub_path.clone()))?;
        let sub: InferenceSubManifest = serde_json::from_slice(&bytes).map_err(|e| {
            Error::invalid_format(format!("{}: {e}", sub_path.display()))
        })?;

        if sub.name.is_empty() {
            return Err(Error::invalid_format(format!(
                "{}: 'name' must be a non-empty string",
                sub_path.display()
            )));
        }
        if sub.level < 1 {
            return Err(Error::invalid_format(format!(
                "{}: 'level' must be at least 1",
                sub_path.display()
            )));
        }

        Ok(Arc::new(InferenceSpec {
            header: SpecHeader::new(INFERENCE_SPEC_KEY, id),
            class: class.to_string(),
            name: sub.name,
            level: sub.level,
            schema: sub.schema,
            configuration: sub.configuration,
            interpreter: Mutex::new(None),
        }))
    }

    fn load_spec(&self, spec: &Arc<dyn ExtensionSpec>, target: ExtensionState) -> Result<()> {
        let inference = self.downcast(spec)?;
        if !inference.header.check_advance(target)? {
            return Ok(());
        }
        match target {
            ExtensionState::Initialized => self.bind_interpreter(inference)?,
            ExtensionState::Ready => {}
            ExtensionState::Finished | ExtensionState::Deleted => {
                inference.interpreter.lock().take();
            }
            ExtensionState::Invalid => unreachable!("rejected by check_advance"),
        }
        inference.header.set_state(target);
        Ok(())
    }
}
