use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use super::resolver::resolve_input;
use crate::graph::{GraphArena, NodeId, Participation};
use crate::group::DefinitionSet;
use crate::registry::widgets::bind_widgets;

/// An instruction input: a literal widget value or `[producer_id, output_slot]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InputValue {
    Link(String, usize),
    Literal(Value),
}

/// One node as the execution engine receives it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
    pub class_type: String,
    pub inputs: BTreeMap<String, InputValue>,
    pub is_input_linked: BTreeMap<String, bool>,
}

/// Instruction map keyed by node id.
pub type Prompt = BTreeMap<String, Instruction>;

/// Emits an instruction for every normal node in `order`.
///
/// Widget values come first, then every data input with a resolvable producer
/// overrides them with a link. Links to nodes that were not emitted are
/// pruned afterwards.
pub fn serialize(arena: &GraphArena, defs: &DefinitionSet<'_>, order: &[NodeId]) -> Prompt {
    let registry = defs.registry();
    let mut output = Prompt::new();

    for id in order {
        let Some(node) = arena.node(id) else {
            continue;
        };
        if registry.participation(node) != Participation::Normal {
            continue;
        }

        let mut instruction = Instruction {
            class_type: node.node_type.clone(),
            inputs: BTreeMap::new(),
            is_input_linked: BTreeMap::new(),
        };

        if let Some(def) = defs.get(&node.node_type) {
            for widget in bind_widgets(node, def, registry) {
                if widget.serialize {
                    instruction
                        .inputs
                        .insert(widget.name.clone(), InputValue::Literal(widget.value));
                    instruction.is_input_linked.insert(widget.name, false);
                }
            }
        }

        for (slot, input) in node.inputs.iter().enumerate() {
            if input.is_flow() || input.link.is_none() {
                continue;
            }
            let Some(producer) = resolve_input(arena, registry, &node.id, slot) else {
                continue;
            };
            let flow_outputs = arena
                .node(&producer.node)
                .map_or(0, |p| p.flow_output_count());
            instruction.inputs.insert(
                input.name.clone(),
                InputValue::Link(
                    producer.node.to_string(),
                    producer.slot.saturating_sub(flow_outputs),
                ),
            );
            instruction.is_input_linked.insert(input.name.clone(), true);
        }

        output.insert(node.id.to_string(), instruction);
    }

    prune_dangling(&mut output);
    output
}

/// Removes link inputs whose producer has no instruction of its own.
fn prune_dangling(output: &mut Prompt) {
    let emitted: Vec<String> = output.keys().cloned().collect();
    for instruction in output.values_mut() {
        let dangling: Vec<String> = instruction
            .inputs
            .iter()
            .filter_map(|(name, value)| match value {
                InputValue::Link(producer, _) if emitted.binary_search(producer).is_err() => {
                    Some(name.clone())
                }
                _ => None,
            })
            .collect();
        for name in dangling {
            instruction.inputs.remove(&name);
            instruction.is_input_linked.remove(&name);
        }
    }
}
