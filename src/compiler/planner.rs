use ahash::AHashMap;
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use tracing::debug;

use crate::graph::{GraphArena, NodeId};

/// Orders every node of the arena so that each producer, over data and FLOW
/// links alike, comes before its consumers.
///
/// Among ready nodes the one earliest in document order goes first. Nodes on a
/// cycle never become ready and are appended in document order.
pub fn execution_order(arena: &GraphArena) -> Vec<NodeId> {
    let ids = arena.node_ids();
    let position: AHashMap<&NodeId, usize> = ids.iter().enumerate().map(|(i, id)| (id, i)).collect();

    let mut in_degree = vec![0usize; ids.len()];
    let mut successors: Vec<Vec<usize>> = vec![Vec::new(); ids.len()];
    for link in arena.links_in_order() {
        let (Some(&origin), Some(&target)) =
            (position.get(&link.origin_id), position.get(&link.target_id))
        else {
            continue;
        };
        successors[origin].push(target);
        in_degree[target] += 1;
    }

    let mut ready: BinaryHeap<Reverse<usize>> = in_degree
        .iter()
        .enumerate()
        .filter(|(_, degree)| **degree == 0)
        .map(|(i, _)| Reverse(i))
        .collect();
    let mut placed = vec![false; ids.len()];
    let mut order = Vec::with_capacity(ids.len());

    while let Some(Reverse(index)) = ready.pop() {
        placed[index] = true;
        order.push(ids[index].clone());
        for &next in &successors[index] {
            in_degree[next] -= 1;
            if in_degree[next] == 0 {
                ready.push(Reverse(next));
            }
        }
    }

    if order.len() < ids.len() {
        debug!(
            cyclic = ids.len() - order.len(),
            "Appending nodes on cycles to the execution order"
        );
        order.extend(
            ids.iter()
                .zip(placed)
                .filter(|(_, placed)| !placed)
                .map(|(id, _)| id.clone()),
        );
    }
    order
}
