use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::CompileError;
use crate::registry::{OperationRegistry, VirtualKind};

/// Additions to the registry's built-in tables.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Legacy type name -> current type name.
    #[serde(default)]
    pub renames: BTreeMap<String, String>,
    /// Extra `TYPE` or `TYPE:input_name` entries treated as widgets.
    #[serde(default)]
    pub widget_types: Vec<String>,
    /// Extra editor-only node types.
    #[serde(default)]
    pub virtual_nodes: BTreeMap<String, VirtualKind>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapshotConfig {
    /// Where the compact snapshot of each compiled workflow is written.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueConfig {
    #[serde(default = "default_queue_buffer")]
    pub buffer: usize,
    /// Seed for `control_after_generate = "randomize"`. Unset means entropy.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            buffer: default_queue_buffer(),
            seed: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}

fn default_queue_buffer() -> usize { 16 }
fn default_log_filter() -> String { "kumitate=info,warn".to_string() }

/// Top-level compiler configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompilerConfig {
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub snapshot: SnapshotConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub log: LogConfig,
}

impl CompilerConfig {
    /// Load config from a TOML file.
    pub fn load(path: &Path) -> Result<Self, CompileError> {
        let content = std::fs::read_to_string(path).map_err(|e| CompileError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, CompileError> {
        toml::from_str(content).map_err(|e| CompileError::Config(e.to_string()))
    }

    /// Extends the registry tables with the configured entries.
    pub fn apply(&self, registry: &mut OperationRegistry) {
        for (from, to) in &self.registry.renames {
            registry.add_rename(from, to);
        }
        for widget_type in &self.registry.widget_types {
            registry.add_widget_type(widget_type);
        }
        for (node_type, kind) in &self.registry.virtual_nodes {
            registry.add_virtual_node(node_type, *kind);
        }
    }
}
