use itertools::Itertools;
use tracing::debug;

use crate::graph::Document;
use crate::group::DefinitionSet;
use crate::registry::{OperationRegistry, sanitize_type_name};

/// State of a single compile or load. Built from a copy of the caller's
/// document, so nothing done here is visible to the caller.
pub(crate) struct CompilerContext<'a> {
    pub document: Document,
    pub missing: Vec<String>,
    registry: &'a OperationRegistry,
}

impl<'a> CompilerContext<'a> {
    pub fn new(document: &Document, registry: &'a OperationRegistry) -> Self {
        Self {
            document: document.clone(),
            missing: Vec::new(),
            registry,
        }
    }

    /// Applies the rename table to every node (group members included), builds
    /// the group definitions and records unknown top-level types. Unknown
    /// types are kept, with their names sanitized.
    pub fn normalize_types(&mut self) -> DefinitionSet<'a> {
        let registry = self.registry;
        let rename = |node_type: &mut String| {
            if let Some(current) = registry.rename(node_type) {
                debug!(from = %node_type, to = current, "Renaming legacy node type");
                *node_type = current.to_string();
            }
        };

        for config in self.document.extra.group_nodes.values_mut() {
            for node in config.nodes.iter_mut() {
                rename(&mut node.node_type);
            }
        }
        for node in self.document.nodes.iter_mut() {
            rename(&mut node.node_type);
        }

        let defs = DefinitionSet::with_groups(registry, &self.document.extra.group_nodes);
        for node in self.document.nodes.iter_mut() {
            if !defs.is_known(&node.node_type) {
                self.missing.push(node.node_type.clone());
                node.node_type = sanitize_type_name(&node.node_type);
            }
        }
        defs
    }

    /// Missing types in first-seen order, each once.
    pub fn missing_types(&self) -> Vec<String> {
        self.missing.iter().unique().cloned().collect()
    }

    /// A hint naming the extensions that could have produced a broken document.
    pub fn extension_hint(names: &[&str]) -> Option<String> {
        if names.is_empty() {
            None
        } else {
            Some(format!("extensions: {}", names.join(", ")))
        }
    }
}
