use ahash::{AHashMap, AHashSet};
use tracing::warn;

use crate::error::CompileError;
use crate::graph::{
    Document, FLOW, FlowInput, FlowLink, FlowOutput, InputSlot, Link, LinkId, NodeId, OutputSlot,
};

/// Number of FLOW inputs and outputs carried by each node.
type FlowCounts = AHashMap<NodeId, (usize, usize)>;

/// Turns compact sequencing data into ordinary `FLOW` slots and links.
///
/// FLOW slots are prepended to each node and every data link is shifted by the
/// number of slots inserted ahead of its endpoints. Documents without compact
/// data are returned unchanged.
pub(super) fn materialize(mut doc: Document) -> Result<Document, CompileError> {
    if !doc.has_compact_flow() {
        return Ok(doc);
    }

    let mut counts = FlowCounts::new();
    for node in doc.nodes.iter_mut() {
        let flow_inputs = node.flow_inputs.take().unwrap_or_default();
        let flow_outputs = node.flow_outputs.take().unwrap_or_default();
        if (!flow_inputs.is_empty() || !flow_outputs.is_empty())
            && (node.flow_input_count() > 0 || node.flow_output_count() > 0)
        {
            return Err(CompileError::invalid(format!(
                "node {} carries both compact and materialized FLOW slots",
                node.id
            )));
        }

        let (n_in, n_out) = (flow_inputs.len(), flow_outputs.len());
        counts.insert(node.id.clone(), (n_in, n_out));
        for output in node.outputs.iter_mut() {
            output.slot_index = output.slot_index.map(|i| i.saturating_add(n_out));
        }
        // Predecessors are wired from `flow_links` below.
        let inputs = flow_inputs.into_iter().map(|slot| {
            let mut input = InputSlot::new(slot.name, FLOW);
            input.extra = slot.extra;
            input
        });
        node.inputs.splice(0..0, inputs);
        let outputs = flow_outputs.into_iter().enumerate().map(|(i, slot)| {
            let mut output = OutputSlot::new(slot.name, FLOW);
            output.slot_index = Some(i);
            output.extra = slot.extra;
            output
        });
        node.outputs.splice(0..0, outputs);
    }

    for link in doc.links.iter_mut() {
        let (_, out_shift) = counts.get(&link.origin_id).copied().unwrap_or_default();
        let (in_shift, _) = counts.get(&link.target_id).copied().unwrap_or_default();
        link.origin_slot = link.origin_slot.saturating_add(out_shift);
        link.target_slot = link.target_slot.saturating_add(in_shift);
    }

    let mut used: AHashSet<LinkId> = doc.links.iter().map(|l| l.id).collect();
    let mut next_id = doc.next_link_id();
    let position: AHashMap<NodeId, usize> = doc
        .nodes
        .iter()
        .enumerate()
        .map(|(i, n)| (n.id.clone(), i))
        .collect();

    for flow in doc.flow_links.take().unwrap_or_default() {
        let (Some(&origin), Some(&target)) =
            (position.get(&flow.origin_id), position.get(&flow.target_id))
        else {
            return Err(CompileError::invalid(format!(
                "flow link {} connects unknown nodes {} -> {}",
                flow.id, flow.origin_id, flow.target_id
            )));
        };
        let (_, origin_flow) = counts[&flow.origin_id];
        let (target_flow, _) = counts[&flow.target_id];
        if flow.origin_slot >= origin_flow || flow.target_slot >= target_flow {
            return Err(CompileError::invalid(format!(
                "flow link {} refers to a missing FLOW slot",
                flow.id
            )));
        }
        if !doc.nodes[origin].outputs[flow.origin_slot].link_ids().is_empty() {
            warn!(
                link = flow.id,
                node = %flow.origin_id,
                "Dropping flow link on an output that already has a successor"
            );
            continue;
        }
        if doc.nodes[target].inputs[flow.target_slot].link.is_some() {
            warn!(
                link = flow.id,
                node = %flow.target_id,
                "Dropping flow link on an input that already has a predecessor"
            );
            continue;
        }

        let id = if used.contains(&flow.id) {
            let fresh = next_id;
            next_id = next_id.saturating_add(1);
            fresh
        } else {
            next_id = next_id.max(flow.id.saturating_add(1));
            flow.id
        };
        used.insert(id);

        doc.nodes[origin].outputs[flow.origin_slot].attach(id);
        doc.nodes[target].inputs[flow.target_slot].link = Some(id);
        let mut link: Link = flow.into();
        link.id = id;
        doc.links.push(link);
    }

    if next_id > 0 {
        doc.last_link_id = Some(doc.last_link_id.unwrap_or(0).max(next_id - 1));
    }
    doc.support_flow_control = true;
    Ok(doc)
}

/// Moves `FLOW` slots and links of a runtime document back into compact form.
pub(super) fn strip(mut doc: Document) -> Result<Document, CompileError> {
    let mut counts = FlowCounts::new();
    for node in doc.nodes.iter_mut() {
        let n_in = node.inputs.iter().take_while(|s| s.is_flow()).count();
        let n_out = node.outputs.iter().take_while(|s| s.is_flow()).count();
        if n_in != node.flow_input_count() || n_out != node.flow_output_count() {
            return Err(CompileError::invalid(format!(
                "FLOW slots of node {} do not precede its data slots",
                node.id
            )));
        }
        counts.insert(node.id.clone(), (n_in, n_out));

        let flow_inputs = node
            .inputs
            .drain(..n_in)
            .map(|slot| FlowInput {
                name: slot.name,
                slot_type: slot.slot_type,
                links: Some(vec![slot.link]),
                extra: slot.extra,
            })
            .collect();
        let flow_outputs = node
            .outputs
            .drain(..n_out)
            .map(|slot| FlowOutput {
                link: slot.link_ids().first().copied(),
                name: slot.name,
                slot_type: slot.slot_type,
                slot_index: slot.slot_index,
                extra: slot.extra,
            })
            .collect();
        for output in node.outputs.iter_mut() {
            output.slot_index = output.slot_index.map(|i| i.saturating_sub(n_out));
        }
        node.flow_inputs = Some(flow_inputs);
        node.flow_outputs = Some(flow_outputs);
    }

    let (flows, mut data): (Vec<Link>, Vec<Link>) =
        doc.links.drain(..).partition(|link| link.is_flow());
    for link in data.iter_mut() {
        let (_, out_shift) = counts.get(&link.origin_id).copied().unwrap_or_default();
        let (in_shift, _) = counts.get(&link.target_id).copied().unwrap_or_default();
        link.origin_slot = link.origin_slot.saturating_sub(out_shift);
        link.target_slot = link.target_slot.saturating_sub(in_shift);
    }

    doc.links = data;
    doc.flow_links = Some(flows.into_iter().map(FlowLink::from).collect());
    doc.support_flow_control = true;
    Ok(doc)
}
