use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use super::link::{FlowLink, Link, LinkId};
use super::node::Node;
use crate::error::CompileError;
use crate::group::GroupConfig;

/// A workflow document as stored by the editor.
///
/// The same type carries both the compact (stored) form, where sequencing lives
/// in `flow_links` and per-node `flow_inputs`/`flow_outputs`, and the runtime
/// form, where sequencing is materialized as ordinary `FLOW` slots and links.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_node_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_link_id: Option<LinkId>,
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub links: Vec<Link>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flow_links: Option<Vec<FlowLink>>,
    #[serde(default)]
    pub extra: Extra,
    #[serde(default)]
    pub support_flow_control: bool,
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

/// Document-level extension data. Group node definitions live here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Extra {
    #[serde(
        rename = "groupNodes",
        default,
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub group_nodes: BTreeMap<String, GroupConfig>,
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

impl Document {
    pub fn new(nodes: Vec<Node>, links: Vec<Link>) -> Self {
        let last_link_id = links.iter().map(|l| l.id).max();
        Self {
            nodes,
            links,
            last_link_id,
            ..Default::default()
        }
    }

    /// Parses a document, reporting the position of any syntax or shape error.
    pub fn from_json(json: &str) -> Result<Self, CompileError> {
        serde_json::from_str(json).map_err(|e| CompileError::from_json(&e))
    }

    /// Loads a document (typically a persisted snapshot) from disk.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, CompileError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| CompileError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_json(&content)
    }

    pub fn to_json(&self) -> Result<String, CompileError> {
        serde_json::to_string_pretty(self).map_err(|e| CompileError::invalid(e.to_string()))
    }

    /// Writes the document to disk as pretty JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), CompileError> {
        let path = path.as_ref();
        let json = self.to_json()?;
        fs::write(path, json).map_err(|e| CompileError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    /// First link id strictly greater than every id in use.
    pub fn next_link_id(&self) -> LinkId {
        let used = self
            .links
            .iter()
            .map(|l| l.id)
            .chain(self.flow_links.iter().flatten().map(|l| l.id))
            .max();
        match (used, self.last_link_id) {
            (None, None) => 0,
            (a, b) => a.max(b).map_or(0, |id| id.saturating_add(1)),
        }
    }

    pub fn node(&self, id: &super::NodeId) -> Option<&Node> {
        self.nodes.iter().find(|n| &n.id == id)
    }

    /// True when any part of the document is still in compact form.
    pub fn has_compact_flow(&self) -> bool {
        self.flow_links.is_some()
            || self
                .nodes
                .iter()
                .any(|n| n.flow_inputs.is_some() || n.flow_outputs.is_some())
    }
}
