//! Stub interpreter providers for locator and environment tests.

use std::sync::Arc;

use vox_loader::{InferenceSpec, Interpreter, InterpreterPlugin};
use vox_plugin::PluginLocator;

/// An interpreter that accepts every spec at or below its level.
pub struct NullInterpreter {
    class: String,
    level: u32,
}

impl NullInterpreter {
    pub fn new(class: impl Into<String>, level: u32) -> Self {
        Self {
            class: class.into(),
            level,
        }
    }
}

impl Interpreter for NullInterpreter {
    fn class_name(&self) -> &str {
        &self.class
    }

    fn level(&self) -> u32 {
        self.level
    }

    fn validate_spec(&self, _spec: &InferenceSpec) -> Result<(), String> {
        Ok(())
    }
}

/// An interpreter that rejects every spec during validation.
pub struct RejectingInterpreter {
    class: String,
    message: String,
}

impl RejectingInterpreter {
    pub fn new(class: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            message: message.into(),
        }
    }
}

impl Interpreter for RejectingInterpreter {
    fn class_name(&self) -> &str {
        &self.class
    }

    fn level(&self) -> u32 {
        u32::MAX
    }

    fn validate_spec(&self, _spec: &InferenceSpec) -> Result<(), String> {
        Err(self.message.clone())
    }
}

/// Register an interpreter with a locator, wrapped as a static provider.
pub fn register(locator: &PluginLocator, interpreter: impl Interpreter + 'static) {
    locator.add_static_plugin(Arc::new(InterpreterPlugin::new(Arc::new(interpreter))));
}
