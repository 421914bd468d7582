use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::node::{FLOW, NodeId};

pub type LinkId = u64;

/// A connection from an output slot to an input slot.
///
/// Serialized as the compact tuple
/// `[id, origin_id, origin_slot, target_id, target_slot, type]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "LinkRecord", into = "LinkRecord")]
pub struct Link {
    pub id: LinkId,
    pub origin_id: NodeId,
    pub origin_slot: usize,
    pub target_id: NodeId,
    pub target_slot: usize,
    pub link_type: String,
}

impl Link {
    pub fn new(
        id: LinkId,
        origin: (impl Into<NodeId>, usize),
        target: (impl Into<NodeId>, usize),
        link_type: impl Into<String>,
    ) -> Self {
        Self {
            id,
            origin_id: origin.0.into(),
            origin_slot: origin.1,
            target_id: target.0.into(),
            target_slot: target.1,
            link_type: link_type.into(),
        }
    }

    pub fn is_flow(&self) -> bool {
        self.link_type == FLOW
    }
}

#[derive(Serialize, Deserialize)]
struct LinkRecord(LinkId, NodeId, usize, NodeId, usize, String);

impl From<LinkRecord> for Link {
    fn from(LinkRecord(id, origin_id, origin_slot, target_id, target_slot, link_type): LinkRecord) -> Self {
        Self {
            id,
            origin_id,
            origin_slot,
            target_id,
            target_slot,
            link_type,
        }
    }
}

impl From<Link> for LinkRecord {
    fn from(link: Link) -> Self {
        LinkRecord(
            link.id,
            link.origin_id,
            link.origin_slot,
            link.target_id,
            link.target_slot,
            link.link_type,
        )
    }
}

/// A sequencing link in compact form: `[id, origin_id, origin_slot, target_id, target_slot]`,
/// optionally followed by the runtime link type. Slot indices count FLOW slots only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Value>", into = "Vec<Value>")]
pub struct FlowLink {
    pub id: LinkId,
    pub origin_id: NodeId,
    pub origin_slot: usize,
    pub target_id: NodeId,
    pub target_slot: usize,
    /// Fields after the target slot, written back unchanged.
    pub tail: Vec<Value>,
}

impl FlowLink {
    pub fn new(id: LinkId, origin: (impl Into<NodeId>, usize), target: (impl Into<NodeId>, usize)) -> Self {
        Self {
            id,
            origin_id: origin.0.into(),
            origin_slot: origin.1,
            target_id: target.0.into(),
            target_slot: target.1,
            tail: Vec::new(),
        }
    }
}

impl TryFrom<Vec<Value>> for FlowLink {
    type Error = String;

    fn try_from(mut values: Vec<Value>) -> Result<Self, Self::Error> {
        if !(5..=6).contains(&values.len()) {
            return Err(format!("flow link needs 5 or 6 fields, found {}", values.len()));
        }
        let tail = values.split_off(5);
        let index = |v: &Value, field: &str| {
            v.as_u64()
                .ok_or_else(|| format!("flow link {} must be a non-negative integer", field))
        };
        let node = |v: &Value, field: &str| {
            serde_json::from_value::<NodeId>(v.clone())
                .map_err(|_| format!("flow link {} must be a node id", field))
        };
        Ok(FlowLink {
            id: index(&values[0], "id")?,
            origin_id: node(&values[1], "origin")?,
            origin_slot: index(&values[2], "origin slot")? as usize,
            target_id: node(&values[3], "target")?,
            target_slot: index(&values[4], "target slot")? as usize,
            tail,
        })
    }
}

impl From<FlowLink> for Vec<Value> {
    fn from(link: FlowLink) -> Self {
        let mut values = vec![
            Value::from(link.id),
            node_value(link.origin_id),
            Value::from(link.origin_slot),
            node_value(link.target_id),
            Value::from(link.target_slot),
        ];
        values.extend(link.tail);
        values
    }
}

fn node_value(id: NodeId) -> Value {
    match id {
        NodeId::Int(id) => Value::from(id),
        NodeId::Str(id) => Value::from(id),
    }
}

impl From<FlowLink> for Link {
    fn from(link: FlowLink) -> Self {
        Link {
            id: link.id,
            origin_id: link.origin_id,
            origin_slot: link.origin_slot,
            target_id: link.target_id,
            target_slot: link.target_slot,
            link_type: FLOW.to_string(),
        }
    }
}

impl From<Link> for FlowLink {
    fn from(link: Link) -> Self {
        FlowLink {
            id: link.id,
            origin_id: link.origin_id,
            origin_slot: link.origin_slot,
            target_id: link.target_id,
            target_slot: link.target_slot,
            tail: vec![Value::from(link.link_type)],
        }
    }
}
