use std::sync::Arc;

use super::Compiler;
use crate::config::CompilerConfig;
use crate::error::CompileError;
use crate::hooks::{Extension, ExtensionSet};
use crate::registry::{OperationRegistry, VirtualKind};

/// Assembles a [`Compiler`] from a registry, configuration and extensions.
pub struct CompilerBuilder {
    registry: OperationRegistry,
    config: CompilerConfig,
    extensions: Vec<Arc<dyn Extension>>,
}

impl CompilerBuilder {
    pub fn new(registry: OperationRegistry) -> Self {
        Self {
            registry,
            config: CompilerConfig::default(),
            extensions: Vec::new(),
        }
    }

    /// Applies the configuration's registry tables and keeps the rest for the
    /// compiler's callers (snapshot path, queue settings).
    pub fn with_config(mut self, config: CompilerConfig) -> Self {
        config.apply(&mut self.registry);
        self.config = config;
        self
    }

    pub fn with_rename(mut self, from: &str, to: &str) -> Self {
        self.registry.add_rename(from, to);
        self
    }

    pub fn with_virtual_node(mut self, node_type: &str, kind: VirtualKind) -> Self {
        self.registry.add_virtual_node(node_type, kind);
        self
    }

    pub fn with_extension(mut self, extension: Arc<dyn Extension>) -> Self {
        self.extensions.push(extension);
        self
    }

    /// Validates the extensions and builds the compiler.
    pub fn build(self) -> Result<Compiler, CompileError> {
        let mut extensions = ExtensionSet::new();
        for extension in self.extensions {
            extensions.register(extension)?;
        }
        Ok(Compiler {
            registry: self.registry,
            config: self.config,
            extensions,
        })
    }
}
