use tracing::trace;

use crate::graph::{GraphArena, NodeId};
use crate::group::DefinitionSet;
use crate::registry::VirtualKind;
use crate::registry::widgets::set_widget_value;

/// Lets virtual nodes rewrite the graph before it is serialized. Nodes are
/// visited in `order`; primitives copy their value into every widget input
/// they feed. Returns the number of widgets written.
pub fn apply(arena: &mut GraphArena, defs: &DefinitionSet<'_>, order: &[NodeId]) -> usize {
    let registry = defs.registry();
    let mut written = 0;

    for id in order {
        let Some(node) = arena.node(id) else {
            continue;
        };
        if registry.virtual_kind(&node.node_type) != Some(VirtualKind::Primitive) {
            continue;
        }
        let Some(value) = node
            .widgets_values
            .as_ref()
            .and_then(|values| values.first())
            .cloned()
        else {
            continue;
        };
        let Some(output) = node.outputs.get(node.flow_output_count()) else {
            continue;
        };

        let targets: Vec<(NodeId, usize)> = output
            .link_ids()
            .iter()
            .filter_map(|link_id| arena.link(*link_id))
            .map(|link| (link.target_id.clone(), link.target_slot))
            .collect();

        for (target_id, slot) in targets {
            let Some(target) = arena.node(&target_id) else {
                continue;
            };
            let (Some(def), Some(widget)) = (
                defs.get(&target.node_type),
                target.inputs.get(slot).and_then(|input| input.widget.as_ref()),
            ) else {
                continue;
            };
            let widget_name = widget.name.clone();
            let Some(target) = arena.node_mut(&target_id) else {
                continue;
            };
            if set_widget_value(target, def, registry, &widget_name, value.clone()) {
                trace!(primitive = %id, node = %target_id, widget = %widget_name, "Applied primitive value");
                written += 1;
            }
        }
    }
    written
}
