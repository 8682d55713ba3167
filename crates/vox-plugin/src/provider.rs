//! The provider contract and the native module entry-point convention.

use std::any::Any;

/// ABI version stamped into every plugin declaration. A module built against
/// a different runtime version is skipped at discovery time.
pub const ABI_VERSION: u32 = 1;

/// Conventional exported symbol a loadable module must provide.
pub const DECLARATION_SYMBOL: &[u8] = b"vox_plugin_declaration";

/// A capability implementation addressed by `(interface id, key)`.
///
/// The provider declares its own interface id and key; the locator trusts
/// them. Consumers recover the concrete type through [`Provider::as_any`].
pub trait Provider: Send + Sync {
    /// The interface id this provider implements (e.g. the interpreter
    /// interface of the inference loader).
    fn interface(&self) -> &str;

    /// The key this provider is registered under within its interface.
    fn key(&self) -> &str;

    /// Downcast support for consumers that know the concrete wrapper type.
    fn as_any(&self) -> &dyn Any;
}

/// The value of the exported [`DECLARATION_SYMBOL`] static.
///
/// `create` runs once per module at discovery time; the returned provider
/// lives for the locator's full lifetime.
#[repr(C)]
pub struct PluginDeclaration {
    /// Must equal [`ABI_VERSION`].
    pub abi_version: u32,
    /// Constructs the module's provider object.
    pub create: fn() -> Box<dyn Provider>,
}

/// Emit the exported declaration static for a plugin crate.
///
/// ```ignore
/// vox_plugin_declaration!(MyInterpreterProvider::default);
/// ```
#[macro_export]
macro_rules! vox_plugin_declaration {
    ($create:expr) => {
        #[unsafe(no_mangle)]
        #[allow(non_upper_case_globals)]
        pub static vox_plugin_declaration: $crate::PluginDeclaration =
            $crate::PluginDeclaration {
                abi_version: $crate::ABI_VERSION,
                create: || Box::new($create()),
            };
    };
}
