//! Block factory registry: create blocks by type name at runtime.

use caudal_graph::Block;
use caudal_settings::SettingsMap;

use crate::PluginError;

/// Factory producing a fresh block from construction parameters.
pub type BlockFactory = fn(&SettingsMap) -> Box<dyn Block>;

struct RegistryEntry {
    block_type: String,
    factory: BlockFactory,
}

/// Maps block type names to factories.
///
/// Both the host and plugins carry one; a plugin's registry backs its
/// `provided_blocks`/`create_block` ABI surface.
#[derive(Default)]
pub struct BlockRegistry {
    entries: Vec<RegistryEntry>,
    names: Vec<String>,
}

impl BlockRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `factory` under `block_type`, replacing any previous
    /// registration of the same name.
    pub fn register<S: Into<String>>(&mut self, block_type: S, factory: BlockFactory) {
        let block_type = block_type.into();
        if let Some(entry) = self
            .entries
            .iter_mut()
            .find(|entry| entry.block_type == block_type)
        {
            entry.factory = factory;
            return;
        }
        self.names.push(block_type.clone());
        self.entries.push(RegistryEntry {
            block_type,
            factory,
        });
    }

    /// Registered type names, in registration order.
    pub fn provided_blocks(&self) -> &[String] {
        &self.names
    }

    /// True when `block_type` is registered.
    pub fn knows(&self, block_type: &str) -> bool {
        self.entries
            .iter()
            .any(|entry| entry.block_type == block_type)
    }

    /// Instantiates a block of `block_type`.
    pub fn create(
        &self,
        block_type: &str,
        params: &SettingsMap,
    ) -> Result<Box<dyn Block>, PluginError> {
        self.entries
            .iter()
            .find(|entry| entry.block_type == block_type)
            .map(|entry| (entry.factory)(params))
            .ok_or_else(|| PluginError::UnknownBlockType(block_type.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use caudal_graph::blocks::CopyBlock;

    fn copy_f32(_params: &SettingsMap) -> Box<dyn Block> {
        Box::new(CopyBlock::<f32>::new())
    }

    #[test]
    fn create_by_name() {
        let mut registry = BlockRegistry::new();
        registry.register("copy_f32", copy_f32);
        assert_eq!(registry.provided_blocks(), &["copy_f32".to_string()]);
        assert!(registry.knows("copy_f32"));

        let block = registry.create("copy_f32", &SettingsMap::new()).unwrap();
        assert_eq!(block.name(), "copy");
    }

    #[test]
    fn unknown_type_is_an_error() {
        let registry = BlockRegistry::new();
        assert!(matches!(
            registry.create("nope", &SettingsMap::new()),
            Err(PluginError::UnknownBlockType(_))
        ));
    }

    #[test]
    fn re_registration_replaces_the_factory() {
        fn null_f32(_params: &SettingsMap) -> Box<dyn Block> {
            Box::new(caudal_graph::blocks::NullSink::<f32>::new())
        }
        let mut registry = BlockRegistry::new();
        registry.register("x", copy_f32);
        registry.register("x", null_f32);
        assert_eq!(registry.provided_blocks().len(), 1);
        let block = registry.create("x", &SettingsMap::new()).unwrap();
        assert_eq!(block.name(), "null_sink");
    }
}
