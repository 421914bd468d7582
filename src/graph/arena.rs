use ahash::AHashMap;

use super::document::Document;
use super::link::{Link, LinkId};
use super::node::{Node, NodeId};

/// Working representation of a runtime document: nodes and links keyed by id,
/// with their document order kept alongside.
///
/// All slot bookkeeping (`input.link`, `output.links`) is updated together with
/// the link table, so a link is either fully attached or absent.
#[derive(Debug, Clone, Default)]
pub struct GraphArena {
    order: Vec<NodeId>,
    nodes: AHashMap<NodeId, Node>,
    link_order: Vec<LinkId>,
    links: AHashMap<LinkId, Link>,
    next_link_id: LinkId,
}

impl GraphArena {
    pub fn from_document(doc: &Document) -> Self {
        let mut arena = GraphArena {
            next_link_id: doc.next_link_id(),
            ..Default::default()
        };
        for node in &doc.nodes {
            arena.order.push(node.id.clone());
            arena.nodes.insert(node.id.clone(), node.clone());
        }
        for link in &doc.links {
            if arena.links.insert(link.id, link.clone()).is_none() {
                arena.link_order.push(link.id);
            }
        }
        arena
    }

    /// Writes the arena back into a document, keeping every document-level
    /// field of `template` that the arena does not own.
    pub fn to_document(&self, template: &Document) -> Document {
        let mut doc = template.clone();
        doc.nodes = self.nodes_in_order().cloned().collect();
        doc.links = self.links_in_order().cloned().collect();
        if self.next_link_id > 0 {
            doc.last_link_id = Some(self.next_link_id - 1);
        }
        doc
    }

    pub fn node(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn node_mut(&mut self, id: &NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id)
    }

    pub fn link(&self, id: LinkId) -> Option<&Link> {
        self.links.get(&id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn node_ids(&self) -> &[NodeId] {
        &self.order
    }

    pub fn nodes_in_order(&self) -> impl Iterator<Item = &Node> {
        self.order.iter().filter_map(|id| self.nodes.get(id))
    }

    pub fn links_in_order(&self) -> impl Iterator<Item = &Link> {
        self.link_order.iter().filter_map(|id| self.links.get(id))
    }

    pub fn position(&self, id: &NodeId) -> Option<usize> {
        self.order.iter().position(|n| n == id)
    }

    /// The link feeding `slot` of `node`, if both exist.
    pub fn incoming(&self, node: &NodeId, slot: usize) -> Option<&Link> {
        let link_id = self.nodes.get(node)?.input_link(slot)?;
        self.links.get(&link_id)
    }

    pub fn allocate_link_id(&mut self) -> LinkId {
        let id = self.next_link_id;
        self.next_link_id = self.next_link_id.saturating_add(1);
        id
    }

    /// Adds a link and attaches it to both endpoint slots. An existing link
    /// with the same id is replaced in place.
    pub fn insert_link(&mut self, link: Link) {
        if let Some(previous) = self.links.get(&link.id).cloned() {
            self.detach(&previous);
        } else {
            self.link_order.push(link.id);
        }
        self.attach(&link);
        self.next_link_id = self.next_link_id.max(link.id.saturating_add(1));
        self.links.insert(link.id, link);
    }

    pub fn remove_link(&mut self, id: LinkId) -> Option<Link> {
        let link = self.links.remove(&id)?;
        self.link_order.retain(|l| *l != id);
        self.detach(&link);
        Some(link)
    }

    /// Inserts nodes at `position` in document order.
    pub fn insert_nodes_at(&mut self, position: usize, nodes: Vec<Node>) {
        let position = position.min(self.order.len());
        let ids: Vec<NodeId> = nodes.iter().map(|n| n.id.clone()).collect();
        self.order.splice(position..position, ids);
        for node in nodes {
            self.nodes.insert(node.id.clone(), node);
        }
    }

    /// Removes a node together with every link still touching it.
    pub fn remove_node(&mut self, id: &NodeId) -> Option<Node> {
        let touching: Vec<LinkId> = self
            .links_in_order()
            .filter(|l| &l.origin_id == id || &l.target_id == id)
            .map(|l| l.id)
            .collect();
        for link_id in touching {
            self.remove_link(link_id);
        }
        self.order.retain(|n| n != id);
        self.nodes.remove(id)
    }

    fn attach(&mut self, link: &Link) {
        if let Some(origin) = self.nodes.get_mut(&link.origin_id) {
            if let Some(output) = origin.outputs.get_mut(link.origin_slot) {
                if !output.link_ids().contains(&link.id) {
                    output.attach(link.id);
                }
            }
        }
        if let Some(target) = self.nodes.get_mut(&link.target_id) {
            if let Some(input) = target.inputs.get_mut(link.target_slot) {
                input.link = Some(link.id);
            }
        }
    }

    fn detach(&mut self, link: &Link) {
        if let Some(origin) = self.nodes.get_mut(&link.origin_id) {
            if let Some(output) = origin.outputs.get_mut(link.origin_slot) {
                output.detach(link.id);
            }
        }
        if let Some(target) = self.nodes.get_mut(&link.target_id) {
            if let Some(input) = target.inputs.get_mut(link.target_slot) {
                if input.link == Some(link.id) {
                    input.link = None;
                }
            }
        }
    }
}
