use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use super::link::LinkId;

/// Slot type tag marking a sequencing slot rather than a data slot.
pub const FLOW: &str = "FLOW";

/// Identifier of a node. Stored documents use integers; expanded group members
/// get composite string ids such as `"12:0"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NodeId {
    Int(i64),
    Str(String),
}

impl NodeId {
    /// Id of the `index`-th member once this node is expanded as a group instance.
    pub fn member(&self, index: usize) -> NodeId {
        NodeId::Str(format!("{}:{}", self, index))
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeId::Int(id) => write!(f, "{}", id),
            NodeId::Str(id) => write!(f, "{}", id),
        }
    }
}

impl From<i64> for NodeId {
    fn from(id: i64) -> Self {
        NodeId::Int(id)
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        NodeId::Str(id.to_string())
    }
}

/// How a node takes part in execution, as stored in the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum NodeMode {
    #[default]
    Normal,
    Muted,
    Bypassed,
}

impl TryFrom<u8> for NodeMode {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(NodeMode::Normal),
            2 => Ok(NodeMode::Muted),
            4 => Ok(NodeMode::Bypassed),
            other => Err(format!("unsupported node mode {}", other)),
        }
    }
}

impl From<NodeMode> for u8 {
    fn from(mode: NodeMode) -> Self {
        match mode {
            NodeMode::Normal => 0,
            NodeMode::Muted => 2,
            NodeMode::Bypassed => 4,
        }
    }
}

/// Effective execution participation of a node, combining its mode with
/// whether its type is an editor-only helper.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Participation {
    Normal,
    Muted,
    Bypassed,
    Virtual,
}

/// Marks an input that was converted from a widget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WidgetRef {
    pub name: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputSlot {
    pub name: String,
    #[serde(rename = "type")]
    pub slot_type: String,
    #[serde(default)]
    pub link: Option<LinkId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub widget: Option<WidgetRef>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl InputSlot {
    pub fn new(name: impl Into<String>, slot_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            slot_type: slot_type.into(),
            link: None,
            widget: None,
            extra: Map::new(),
        }
    }

    pub fn is_flow(&self) -> bool {
        self.slot_type == FLOW
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputSlot {
    pub name: String,
    #[serde(rename = "type")]
    pub slot_type: String,
    #[serde(default)]
    pub links: Option<Vec<LinkId>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slot_index: Option<usize>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl OutputSlot {
    pub fn new(name: impl Into<String>, slot_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            slot_type: slot_type.into(),
            links: None,
            slot_index: None,
            extra: Map::new(),
        }
    }

    pub fn is_flow(&self) -> bool {
        self.slot_type == FLOW
    }

    pub fn link_ids(&self) -> &[LinkId] {
        self.links.as_deref().unwrap_or(&[])
    }

    pub(crate) fn attach(&mut self, link_id: LinkId) {
        self.links.get_or_insert_with(Vec::new).push(link_id);
    }

    pub(crate) fn detach(&mut self, link_id: LinkId) {
        if let Some(links) = self.links.as_mut() {
            links.retain(|id| *id != link_id);
        }
    }
}

fn flow_slot_type() -> String {
    FLOW.to_string()
}

/// A sequencing input in compact (stored) form.
///
/// Stored documents write the predecessor as a one-element list, `[null]` when
/// unconnected. Only the first entry is used.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowInput {
    pub name: String,
    #[serde(rename = "type", default = "flow_slot_type")]
    pub slot_type: String,
    #[serde(default)]
    pub links: Option<Vec<Option<LinkId>>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl FlowInput {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            slot_type: flow_slot_type(),
            links: Some(vec![None]),
            extra: Map::new(),
        }
    }

    pub fn link(&self) -> Option<LinkId> {
        self.links.as_ref()?.first().copied().flatten()
    }
}

/// A sequencing output in compact (stored) form. Holds at most one successor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowOutput {
    pub name: String,
    #[serde(rename = "type", default = "flow_slot_type")]
    pub slot_type: String,
    #[serde(default)]
    pub link: Option<LinkId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slot_index: Option<usize>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl FlowOutput {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            slot_type: flow_slot_type(),
            link: None,
            slot_index: None,
            extra: Map::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default)]
    pub mode: NodeMode,
    #[serde(default)]
    pub inputs: Vec<InputSlot>,
    #[serde(default)]
    pub outputs: Vec<OutputSlot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub widgets_values: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flow_inputs: Option<Vec<FlowInput>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flow_outputs: Option<Vec<FlowOutput>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Node {
    pub fn new(id: impl Into<NodeId>, node_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            node_type: node_type.into(),
            mode: NodeMode::Normal,
            inputs: Vec::new(),
            outputs: Vec::new(),
            widgets_values: None,
            flow_inputs: None,
            flow_outputs: None,
            extra: Map::new(),
        }
    }

    pub fn with_input(mut self, name: &str, slot_type: &str) -> Self {
        self.inputs.push(InputSlot::new(name, slot_type));
        self
    }

    pub fn with_output(mut self, name: &str, slot_type: &str) -> Self {
        let mut slot = OutputSlot::new(name, slot_type);
        slot.slot_index = Some(self.outputs.len());
        self.outputs.push(slot);
        self
    }

    pub fn with_widgets(mut self, values: Vec<Value>) -> Self {
        self.widgets_values = Some(values);
        self
    }

    pub fn with_mode(mut self, mode: NodeMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn flow_input_count(&self) -> usize {
        self.inputs.iter().filter(|slot| slot.is_flow()).count()
    }

    pub fn flow_output_count(&self) -> usize {
        self.outputs.iter().filter(|slot| slot.is_flow()).count()
    }

    /// Link id connected to the given input slot, if any.
    pub fn input_link(&self, slot: usize) -> Option<LinkId> {
        self.inputs.get(slot).and_then(|input| input.link)
    }
}
