use ahash::{AHashMap, AHashSet};
use itertools::Itertools;
use std::collections::VecDeque;
use tracing::debug;

use crate::graph::{Document, FlowInput, FlowLink, FlowOutput, NodeId};
use crate::registry::OperationRegistry;

/// Data successors of every node, with pass-through nodes walked through.
/// A successor appears once per link that reaches it.
fn reachable_successors(
    doc: &Document,
    registry: &OperationRegistry,
) -> AHashMap<NodeId, Vec<NodeId>> {
    let pass_through: AHashSet<&NodeId> = doc
        .nodes
        .iter()
        .filter(|n| registry.is_pass_through(&n.node_type))
        .map(|n| &n.id)
        .collect();
    let known: AHashSet<&NodeId> = doc.nodes.iter().map(|n| &n.id).collect();

    let mut targets: AHashMap<&NodeId, Vec<&NodeId>> = AHashMap::new();
    for link in doc.links.iter().filter(|l| !l.is_flow()) {
        if known.contains(&link.origin_id) && known.contains(&link.target_id) {
            targets.entry(&link.origin_id).or_default().push(&link.target_id);
        }
    }

    let mut reach = AHashMap::new();
    for node in doc.nodes.iter().filter(|n| !pass_through.contains(&n.id)) {
        let mut found = Vec::new();
        let mut visited: AHashSet<&NodeId> = AHashSet::new();
        let mut stack: Vec<&NodeId> = targets.get(&node.id).cloned().unwrap_or_default();
        stack.reverse();
        while let Some(target) = stack.pop() {
            if !pass_through.contains(target) {
                found.push(target.clone());
                continue;
            }
            if !visited.insert(target) {
                continue;
            }
            if let Some(next) = targets.get(target) {
                stack.extend(next.iter().rev());
            }
        }
        reach.insert(node.id.clone(), found);
    }
    reach
}

/// Orders the non-pass-through nodes of a document so that every data
/// producer precedes its consumers.
///
/// Kahn's algorithm with a FIFO work-list seeded in document order. Nodes that
/// never reach in-degree zero (they sit on a cycle) follow in document order.
pub fn flow_order(doc: &Document, registry: &OperationRegistry) -> Vec<NodeId> {
    let reach = reachable_successors(doc, registry);
    let candidates: Vec<&NodeId> = doc
        .nodes
        .iter()
        .filter(|n| reach.contains_key(&n.id))
        .map(|n| &n.id)
        .collect();

    let mut in_degree: AHashMap<&NodeId, usize> = candidates.iter().map(|id| (*id, 0)).collect();
    for successors in reach.values() {
        for target in successors {
            if let Some(degree) = in_degree.get_mut(target) {
                *degree += 1;
            }
        }
    }

    let mut queue: VecDeque<&NodeId> = candidates
        .iter()
        .filter(|id| in_degree.get(*id) == Some(&0))
        .copied()
        .collect();
    let mut order = Vec::with_capacity(candidates.len());
    let mut placed: AHashSet<&NodeId> = AHashSet::new();

    while let Some(id) = queue.pop_front() {
        if !placed.insert(id) {
            continue;
        }
        order.push(id.clone());
        for target in reach.get(id).into_iter().flatten() {
            if let Some(degree) = in_degree.get_mut(target) {
                *degree = degree.saturating_sub(1);
                if *degree == 0 {
                    queue.push_back(target);
                }
            }
        }
    }

    if order.len() < candidates.len() {
        debug!(
            unordered = candidates.len() - order.len(),
            "Appending nodes left on data cycles to the flow order"
        );
        order.extend(
            candidates
                .into_iter()
                .filter(|id| !placed.contains(id))
                .cloned(),
        );
    }
    order
}

/// Adds compact sequencing data to a document stored before flow control
/// existed: a `FROM`/`TO` pair on every non-pass-through node and one flow
/// link per consecutive pair of the flow order.
pub(super) fn synthesize_flow(mut doc: Document, registry: &OperationRegistry) -> Document {
    let order = flow_order(&doc, registry);
    let mut next_id = doc.next_link_id();

    for node in doc.nodes.iter_mut() {
        if registry.is_pass_through(&node.node_type) {
            node.flow_inputs = Some(Vec::new());
            node.flow_outputs = Some(Vec::new());
        } else {
            node.flow_inputs = Some(vec![FlowInput::new("FROM")]);
            node.flow_outputs = Some(vec![FlowOutput::new("TO")]);
        }
    }

    let position: AHashMap<NodeId, usize> = doc
        .nodes
        .iter()
        .enumerate()
        .map(|(i, n)| (n.id.clone(), i))
        .collect();

    let mut flow_links = Vec::with_capacity(order.len().saturating_sub(1));
    for (from, to) in order.iter().tuple_windows() {
        let id = next_id;
        next_id = next_id.saturating_add(1);
        if let Some(output) = position
            .get(from)
            .and_then(|i| doc.nodes[*i].flow_outputs.as_mut())
            .and_then(|outputs| outputs.first_mut())
        {
            output.link = Some(id);
        }
        if let Some(input) = position
            .get(to)
            .and_then(|i| doc.nodes[*i].flow_inputs.as_mut())
            .and_then(|inputs| inputs.first_mut())
        {
            input.links = Some(vec![Some(id)]);
        }
        flow_links.push(FlowLink::new(id, (from.clone(), 0), (to.clone(), 0)));
    }

    debug!(
        nodes = order.len(),
        links = flow_links.len(),
        "Synthesized flow links for legacy document"
    );
    if !flow_links.is_empty() {
        doc.last_link_id = Some(next_id - 1);
    }
    doc.flow_links = Some(flow_links);
    doc.support_flow_control = true;
    doc
}
