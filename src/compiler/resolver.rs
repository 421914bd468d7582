use ahash::AHashSet;
use std::iter;

use crate::graph::{GraphArena, Link, NodeId, Participation};
use crate::registry::OperationRegistry;

/// The node and runtime output slot that actually supplies an input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Producer {
    pub node: NodeId,
    pub slot: usize,
}

/// Finds the effective producer of input `slot` of `node`, forwarding through
/// virtual and bypassed nodes.
///
/// - a normal producer is returned as is;
/// - a virtual producer is followed through its input at the same data slot;
/// - a bypassed producer is followed through its first input typed like the
///   consumer's slot, trying the input at the link's origin slot first;
/// - a muted producer leaves the input unconnected.
///
/// Missing links, nodes or slots and any node reached twice also leave the
/// input unconnected.
pub fn resolve_input(
    arena: &GraphArena,
    registry: &OperationRegistry,
    node: &NodeId,
    slot: usize,
) -> Option<Producer> {
    let slot_type = &arena.node(node)?.inputs.get(slot)?.slot_type;
    let mut link: &Link = arena.incoming(node, slot)?;
    let mut visited = AHashSet::new();

    loop {
        let producer = arena.node(&link.origin_id)?;
        if !visited.insert(&producer.id) {
            return None;
        }
        match registry.participation(producer) {
            Participation::Normal => {
                return Some(Producer {
                    node: producer.id.clone(),
                    slot: link.origin_slot,
                });
            }
            Participation::Muted => return None,
            Participation::Virtual => {
                let data_slot = link.origin_slot.checked_sub(producer.flow_output_count())?;
                let input = producer.flow_input_count() + data_slot;
                link = arena.incoming(&producer.id, input)?;
            }
            Participation::Bypassed => {
                let input = iter::once(link.origin_slot)
                    .chain(0..producer.inputs.len())
                    .find(|i| {
                        producer
                            .inputs
                            .get(*i)
                            .is_some_and(|s| !s.is_flow() && &s.slot_type == slot_type)
                    })?;
                link = arena.incoming(&producer.id, input)?;
            }
        }
    }
}
