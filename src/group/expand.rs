use ahash::{AHashMap, AHashSet};
use serde_json::{Map, Value};
use std::collections::VecDeque;
use tracing::{debug, warn};

use super::{DefinitionSet, GroupConfig, GroupLink, GroupNodeDef};
use crate::graph::{GraphArena, Link, Node, NodeId, Participation};
use crate::registry::OperationRegistry;
use crate::registry::widgets::{bind_widgets, set_widget_value};

/// Follows pass-through nodes upstream from `(node, slot)` to the first real
/// producer. Returns `None` when the chain ends unconnected or loops.
pub fn resolve_pass_through(
    arena: &GraphArena,
    registry: &OperationRegistry,
    node: &NodeId,
    slot: usize,
) -> Option<(NodeId, usize)> {
    let mut visited = AHashSet::new();
    let mut current = (node.clone(), slot);
    loop {
        let producer = arena.node(&current.0)?;
        if !registry.is_pass_through(&producer.node_type) {
            return Some(current);
        }
        if !visited.insert(current.0.clone()) {
            return None;
        }
        let link = arena.incoming(&current.0, producer.flow_input_count())?;
        current = (link.origin_id.clone(), link.origin_slot);
    }
}

/// Replaces every group instance in the arena with its members, nested groups
/// included. Returns the number of instances expanded.
///
/// Muted and bypassed instances stay as they are. Member types that are
/// neither registered nor virtual are left out and pushed onto `missing`.
pub fn expand_groups(
    arena: &mut GraphArena,
    defs: &DefinitionSet<'_>,
    missing: &mut Vec<String>,
) -> usize {
    let registry = defs.registry();
    let mut queue: VecDeque<(NodeId, Vec<String>)> = arena
        .nodes_in_order()
        .filter(|n| defs.group(&n.node_type).is_some())
        .map(|n| (n.id.clone(), Vec::new()))
        .collect();

    let mut expanded = 0;
    while let Some((instance_id, ancestry)) = queue.pop_front() {
        let Some(instance) = arena.node(&instance_id).cloned() else {
            continue;
        };
        let Some(group) = defs.group(&instance.node_type) else {
            continue;
        };
        if registry.participation(&instance) != Participation::Normal {
            debug!(node = %instance.id, group = %group.name, "Leaving disabled group instance collapsed");
            continue;
        }
        if ancestry.contains(&group.name) {
            warn!(
                node = %instance.id,
                group = %group.name,
                "Group contains itself; leaving instance unexpanded"
            );
            continue;
        }

        let members = expand_instance(arena, defs, &instance, group, missing);
        expanded += 1;

        let mut lineage = ancestry;
        lineage.push(group.name.clone());
        for member in members {
            let nested = arena
                .node(&member)
                .is_some_and(|n| defs.group(&n.node_type).is_some());
            if nested {
                queue.push_back((member, lineage.clone()));
            }
        }
    }
    expanded
}

fn expand_instance(
    arena: &mut GraphArena,
    defs: &DefinitionSet<'_>,
    instance: &Node,
    group: &GroupNodeDef,
    missing: &mut Vec<String>,
) -> Vec<NodeId> {
    let registry = defs.registry();
    let config = &group.config;
    let group_widgets = bind_widgets(instance, &group.def, registry);

    let mut materialized = vec![false; config.nodes.len()];
    let mut members = Vec::with_capacity(config.nodes.len());
    for (index, template) in config.nodes.iter().enumerate() {
        if !defs.is_known(&template.node_type) {
            missing.push(template.node_type.clone());
            continue;
        }
        let mut member = template.clone();
        member.id = instance.id.member(index);
        for input in member.inputs.iter_mut() {
            input.link = None;
        }
        for output in member.outputs.iter_mut() {
            output.links = None;
        }

        if let (Some(inner), Some(names)) =
            (defs.get(&member.node_type), group.slots.widgets.get(&index))
        {
            for (inner_name, group_name) in names {
                let value = group_widgets
                    .iter()
                    .find(|w| &w.name == group_name && !w.value.is_null())
                    .map(|w| w.value.clone());
                if let Some(value) = value {
                    set_widget_value(&mut member, inner, registry, inner_name, value);
                }
            }
        }
        materialized[index] = true;
        members.push(member);
    }
    let is_materialized = |index: usize| materialized.get(index).copied().unwrap_or(false);

    let ids: Vec<NodeId> = members.iter().map(|m| m.id.clone()).collect();
    let position = arena.position(&instance.id).unwrap_or(arena.len());
    arena.insert_nodes_at(position, members);

    for link in &config.links {
        let Some(origin) = link.origin else {
            continue;
        };
        if !is_materialized(origin) || !is_materialized(link.target) {
            continue;
        }
        let origin_id = instance.id.member(origin);
        let link_type = arena
            .node(&origin_id)
            .and_then(|n| n.outputs.get(link.origin_slot))
            .map(|s| s.slot_type.clone())
            .unwrap_or_else(|| "*".to_string());
        let id = arena.allocate_link_id();
        arena.insert_link(Link::new(
            id,
            (origin_id, link.origin_slot),
            (instance.id.member(link.target), link.target_slot),
            link_type,
        ));
    }

    let flow_in = instance.flow_input_count();
    for (slot, input) in instance.inputs.iter().enumerate().skip(flow_in) {
        let Some(link_id) = input.link else {
            continue;
        };
        let Some(mut link) = arena.link(link_id).cloned() else {
            continue;
        };
        match group.slots.input_target(slot - flow_in) {
            Some((member, member_slot)) if is_materialized(member) => {
                link.target_id = instance.id.member(member);
                link.target_slot = member_slot;
                arena.insert_link(link);
            }
            _ => {
                arena.remove_link(link_id);
            }
        }
    }

    let flow_out = instance.flow_output_count();
    for (slot, output) in instance.outputs.iter().enumerate().skip(flow_out) {
        let producer = group
            .slots
            .outputs
            .get(&(slot - flow_out))
            .filter(|r| is_materialized(r.node))
            .and_then(|r| {
                resolve_pass_through(arena, registry, &instance.id.member(r.node), r.slot)
            });
        for link_id in output.link_ids() {
            let Some(mut link) = arena.link(*link_id).cloned() else {
                continue;
            };
            match &producer {
                Some((node, origin_slot)) => {
                    link.origin_id = node.clone();
                    link.origin_slot = *origin_slot;
                    arena.insert_link(link);
                }
                None => {
                    arena.remove_link(*link_id);
                }
            }
        }
    }

    arena.remove_node(&instance.id);
    debug!(node = %instance.id, group = %group.name, members = ids.len(), "Expanded group instance");
    ids
}

/// Rebuilds a group config from the members an expansion left in the arena.
///
/// Only links between members are kept, as in a stored config. Returns `None`
/// when any of the `member_count` members is missing.
pub fn collapse(arena: &GraphArena, instance: &NodeId, member_count: usize) -> Option<GroupConfig> {
    let ids: Vec<NodeId> = (0..member_count).map(|i| instance.member(i)).collect();
    let index: AHashMap<&NodeId, usize> = ids.iter().enumerate().map(|(i, id)| (id, i)).collect();

    let mut nodes = Vec::with_capacity(member_count);
    for (i, id) in ids.iter().enumerate() {
        let mut node = arena.node(id)?.clone();
        node.id = NodeId::Int(i as i64);
        for input in node.inputs.iter_mut() {
            input.link = None;
        }
        for output in node.outputs.iter_mut() {
            output.links = None;
        }
        nodes.push(node);
    }

    let links = arena
        .links_in_order()
        .filter_map(|link| {
            let origin = *index.get(&link.origin_id)?;
            let target = *index.get(&link.target_id)?;
            let mut group_link =
                GroupLink::new(Some(origin), link.origin_slot, target, link.target_slot);
            group_link.tail.push(Value::String(link.link_type.clone()));
            Some(group_link)
        })
        .collect();

    Some(GroupConfig {
        nodes,
        links,
        extra: Map::new(),
    })
}
