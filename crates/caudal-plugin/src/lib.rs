//! Caudal Plugin — the ABI through which dynamic plugins provide blocks.
//!
//! A plugin is a process-wide object exposing a version byte, a metadata
//! record, the list of block types it provides, and a factory. The
//! [`declare_plugin!`] macro generates the eagerly-initialised singleton and
//! the `caudal_plugin_make`/`caudal_plugin_free` loader symbols; the plugin
//! owns its instance, never the host.
//!
//! Loading mechanics (dlopen and friends) are out of scope — only the ABI
//! surface is defined here.

pub mod registry;

pub use registry::{BlockFactory, BlockRegistry};

use caudal_graph::Block;
use caudal_settings::SettingsMap;
use thiserror::Error;

/// ABI version understood by this host/plugin generation.
pub const PLUGIN_ABI_VERSION: u8 = 1;

/// Static facts about a plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PluginMetadata {
    /// Plugin display name.
    pub name: &'static str,
    /// Author or vendor.
    pub author: &'static str,
    /// SPDX-style license string.
    pub license: &'static str,
    /// Plugin version string.
    pub version: &'static str,
}

/// Plugin-level failures.
#[derive(Debug, Error)]
pub enum PluginError {
    /// The requested block type is not provided by this plugin.
    #[error("unknown block type: {0}")]
    UnknownBlockType(String),

    /// The plugin was built against an incompatible ABI generation.
    #[error("plugin ABI version {found} does not match host version {expected}")]
    AbiMismatch {
        /// Version byte reported by the plugin.
        found: u8,
        /// Version byte the host understands.
        expected: u8,
    },
}

/// A plugin instance: metadata plus a block registry.
pub struct Plugin {
    metadata: PluginMetadata,
    registry: BlockRegistry,
}

impl Plugin {
    /// A plugin with the given metadata and an empty registry.
    pub fn new(metadata: PluginMetadata) -> Self {
        Self {
            metadata,
            registry: BlockRegistry::new(),
        }
    }

    /// The ABI generation this plugin was built against.
    pub fn abi_version(&self) -> u8 {
        PLUGIN_ABI_VERSION
    }

    /// Static plugin facts.
    pub fn metadata(&self) -> &PluginMetadata {
        &self.metadata
    }

    /// Registers a block factory under `block_type`.
    pub fn register_block_type<S: Into<String>>(&mut self, block_type: S, factory: BlockFactory) {
        self.registry.register(block_type, factory);
    }

    /// Block type names this plugin can instantiate.
    pub fn provided_blocks(&self) -> &[String] {
        self.registry.provided_blocks()
    }

    /// Instantiates a block of `block_type` with `params`.
    ///
    /// Instance naming is automatic (blocks mint their own unique names).
    pub fn create_block(
        &self,
        block_type: &str,
        params: &SettingsMap,
    ) -> Result<Box<dyn Block>, PluginError> {
        self.registry.create(block_type, params)
    }
}

/// Verifies a loaded plugin's version byte against the host's.
pub fn check_abi(plugin: &Plugin) -> Result<(), PluginError> {
    let found = plugin.abi_version();
    if found == PLUGIN_ABI_VERSION {
        Ok(())
    } else {
        Err(PluginError::AbiMismatch {
            found,
            expected: PLUGIN_ABI_VERSION,
        })
    }
}

/// Declares a plugin translation unit.
///
/// Generates the process-wide plugin instance plus the `extern "C"` loader
/// pair. The registration closure receives the fresh plugin and registers
/// its block types.
///
/// ```rust
/// use caudal_plugin::declare_plugin;
/// use caudal_graph::blocks::CopyBlock;
///
/// declare_plugin!(
///     "demo-blocks",
///     "caudal developers",
///     "MIT OR Apache-2.0",
///     "0.1.0",
///     |plugin| {
///         plugin.register_block_type("copy_f32", |_params| {
///             Box::new(CopyBlock::<f32>::new())
///         });
///     }
/// );
///
/// let plugin = unsafe { &*caudal_plugin_make() };
/// assert_eq!(plugin.provided_blocks(), &["copy_f32".to_string()]);
/// ```
#[macro_export]
macro_rules! declare_plugin {
    ($name:expr, $author:expr, $license:expr, $version:expr, $register:expr) => {
        /// The process-wide plugin instance, owned by the plugin itself.
        pub fn caudal_plugin_instance() -> &'static $crate::Plugin {
            static INSTANCE: ::std::sync::OnceLock<$crate::Plugin> = ::std::sync::OnceLock::new();
            INSTANCE.get_or_init(|| {
                let mut plugin = $crate::Plugin::new($crate::PluginMetadata {
                    name: $name,
                    author: $author,
                    license: $license,
                    version: $version,
                });
                let register: fn(&mut $crate::Plugin) = $register;
                register(&mut plugin);
                plugin
            })
        }

        /// Loader entry point: hands the host the plugin instance.
        #[unsafe(no_mangle)]
        pub extern "C" fn caudal_plugin_make() -> *const $crate::Plugin {
            caudal_plugin_instance()
        }

        /// Loader exit point. The instance is static; nothing is freed, but
        /// a foreign pointer here is a wiring bug worth catching loudly.
        #[unsafe(no_mangle)]
        pub extern "C" fn caudal_plugin_free(plugin: *const $crate::Plugin) {
            assert!(
                ::std::ptr::eq(plugin, caudal_plugin_instance()),
                "caudal_plugin_free called with a foreign plugin pointer"
            );
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn abi_version_matches_host() {
        let plugin = Plugin::new(PluginMetadata {
            name: "test",
            author: "nobody",
            license: "MIT",
            version: "0.0.0",
        });
        assert_eq!(plugin.abi_version(), PLUGIN_ABI_VERSION);
        assert!(check_abi(&plugin).is_ok());
    }

    #[test]
    fn metadata_is_preserved() {
        let plugin = Plugin::new(PluginMetadata {
            name: "demo",
            author: "caudal developers",
            license: "MIT OR Apache-2.0",
            version: "0.1.0",
        });
        assert_eq!(plugin.metadata().name, "demo");
        assert_eq!(plugin.metadata().version, "0.1.0");
    }
}
