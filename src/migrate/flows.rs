use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::graph::{Document, FlowLink, NodeId};

/// Successor of a FLOW output: `[node_id, target_slot]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowTarget(pub NodeId, pub usize);

/// Per-node successor table derived from the sequencing links.
///
/// Each node id maps to a list indexed by FLOW output slot, with `null` for
/// slots that have no successor, or to `null` when the node has no outgoing
/// FLOW link at all.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FlowTable(BTreeMap<String, Option<Vec<Option<FlowTarget>>>>);

impl FlowTable {
    /// Builds the table from a compact document. Runtime documents are read
    /// through their `FLOW` typed links instead.
    ///
    /// Links are considered in `(origin_slot, link id)` order and the first
    /// claim on a slot wins.
    pub fn from_document(doc: &Document) -> Self {
        let mut links: Vec<FlowLink> = match &doc.flow_links {
            Some(links) => links.clone(),
            None => doc
                .links
                .iter()
                .filter(|l| l.is_flow())
                .cloned()
                .map(FlowLink::from)
                .collect(),
        };
        links.sort_by_key(|l| (l.origin_slot, l.id));

        let mut table: BTreeMap<String, Option<Vec<Option<FlowTarget>>>> = doc
            .nodes
            .iter()
            .map(|n| (n.id.to_string(), None))
            .collect();

        for link in links {
            let slots = table
                .entry(link.origin_id.to_string())
                .or_default()
                .get_or_insert_with(Vec::new);
            if slots.len() <= link.origin_slot {
                slots.resize(link.origin_slot + 1, None);
            }
            if slots[link.origin_slot].is_none() {
                slots[link.origin_slot] = Some(FlowTarget(link.target_id, link.target_slot));
            }
        }
        FlowTable(table)
    }

    /// Successors of a node, or `None` when it has no FLOW link.
    pub fn successors(&self, node: &NodeId) -> Option<&[Option<FlowTarget>]> {
        self.0.get(&node.to_string())?.as_deref()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Option<Vec<Option<FlowTarget>>>)> {
        self.0.iter()
    }
}
