//! Native capability provider discovery for the vox runtime.
//!
//! A **provider** is a capability implementation addressed by
//! `(interface id, key)` — for example an inference interpreter registered
//! under the interpreter interface with its class name as the key. Providers
//! come from two sources: in-process static registrations, and directories
//! scanned for loadable native modules exposing the conventional
//! [`vox_plugin_declaration`](provider::PluginDeclaration) entry point.
//!
//! The provider tables live independently of the library/manifest system;
//! the loader consumes them through [`PluginLocator::plugin`].

pub mod error;
pub mod locator;
pub mod provider;
pub mod sharedlib;

pub use error::{Error, Result};
pub use locator::PluginLocator;
pub use provider::{ABI_VERSION, DECLARATION_SYMBOL, PluginDeclaration, Provider};
pub use sharedlib::SharedLibrary;
