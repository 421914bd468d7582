//! Tests for group node definitions and their expansion at compile time.
mod common;
use common::*;
use kumitate::graph::NodeId;
use kumitate::group::{
    DefinitionSet, GroupConfig, GroupLink, SlotRef, build_node_def, collapse, expand_groups,
};
use kumitate::prelude::*;
use serde_json::json;
use std::collections::BTreeMap;

fn blurry_config() -> GroupConfig {
    serde_json::from_value(create_group_config()).expect("group config should parse")
}

#[test]
fn test_group_definition_exposes_unconnected_slots() {
    let registry = create_registry();
    let defs = DefinitionSet::new(&registry);

    let group = build_node_def(&blurry_config(), "blurry", &defs);

    assert_eq!(group.node_type, "workflow/blurry");
    assert_eq!(group.def.category, "group nodes/workflow");
    let input_names: Vec<&String> = group.def.input.required.keys().collect();
    assert_eq!(input_names, vec!["0:image", "0:radius", "1:amount"]);
    assert_eq!(group.def.output, vec![json!("IMAGE")]);
    assert_eq!(group.def.output_name, vec!["1:sharpened"]);

    let mut expected_inputs = BTreeMap::new();
    expected_inputs.insert(0, BTreeMap::from([(0, 0)]));
    assert_eq!(group.slots.inputs, expected_inputs);
    assert_eq!(group.slots.outputs, BTreeMap::from([(0, SlotRef { node: 1, slot: 0 })]));
    assert_eq!(group.slots.widgets[&0]["radius"], "0:radius");
    assert_eq!(group.slots.widgets[&1]["amount"], "1:amount");
}

#[test]
fn test_group_links_parse_with_external_origin() {
    let link: GroupLink = serde_json::from_value(json!([null, 0, 1, 0, "IMAGE"])).unwrap();
    assert_eq!(link.origin, None);
    assert_eq!(link.target, 1);
    assert_eq!(link.tail, vec![json!("IMAGE")]);
    assert_eq!(serde_json::to_value(&link).unwrap(), json!([null, 0, 1, 0, "IMAGE"]));

    assert!(serde_json::from_value::<GroupLink>(json!([0, 0, 1])).is_err());
}

#[test]
fn test_group_config_without_flow_shifts_slots() {
    let config: GroupConfig = serde_json::from_value(json!({
        "nodes": [
            { "id": 1, "type": "LoadImage",
              "outputs": [
                  { "name": "TO", "type": "FLOW", "links": [5], "slot_index": 0 },
                  { "name": "IMAGE", "type": "IMAGE", "links": [6], "slot_index": 1 }
              ] },
            { "id": 2, "type": "Blur",
              "inputs": [
                  { "name": "FROM", "type": "FLOW", "link": 5 },
                  { "name": "image", "type": "IMAGE", "link": 6 }
              ] }
        ],
        "links": [[0, 0, 1, 0, 5, "FLOW"], [0, 1, 1, 1, 6, "IMAGE"]]
    }))
    .unwrap();

    let stripped = config.without_flow();
    assert_eq!(stripped.nodes[0].outputs.len(), 1);
    assert_eq!(stripped.nodes[0].outputs[0].slot_index, Some(0));
    assert_eq!(stripped.nodes[1].inputs.len(), 1);
    assert_eq!(stripped.links.len(), 1);
    assert_eq!(
        (stripped.links[0].origin_slot, stripped.links[0].target_slot),
        (0, 0)
    );
}

#[test]
fn test_compile_expands_group_instance() {
    let compiler = Compiler::new(create_registry());
    let compiled = compile(&compiler, &create_group_document());

    let ids: Vec<&String> = compiled.output.keys().collect();
    assert_eq!(ids, vec!["1", "10:0", "10:1", "3"]);

    let blur = &compiled.output["10:0"];
    assert_eq!(blur.class_type, "Blur");
    assert_eq!(blur.inputs["image"], link_input("1", 0));
    assert_eq!(blur.inputs["radius"], InputValue::Literal(json!(7)));
    assert!(blur.is_input_linked["image"]);
    assert!(!blur.is_input_linked["radius"]);

    let sharpen = &compiled.output["10:1"];
    assert_eq!(sharpen.inputs["image"], link_input("10:0", 0));
    assert_eq!(sharpen.inputs["amount"], InputValue::Literal(json!(0.5)));

    assert_eq!(compiled.output["3"].inputs["images"], link_input("10:1", 0));
    assert!(compiled.missing_types.is_empty());
}

#[test]
fn test_snapshot_keeps_group_instance_collapsed() {
    let compiler = Compiler::new(create_registry());
    let compiled = compile(&compiler, &create_group_document());

    let instance = compiled.workflow.node(&NodeId::Int(10)).unwrap();
    assert_eq!(instance.node_type, "workflow/blurry");
    assert!(compiled.workflow.extra.group_nodes.contains_key("blurry"));
    assert!(compiled.flows.successors(&NodeId::Int(10)).is_some());
}

#[test]
fn test_nested_groups_expand_recursively() {
    let mut doc = wire(
        vec![
            Node::new(20, "workflow/outer")
                .with_output("1:1:sharpened", "IMAGE")
                .with_widgets(vec![json!("b.png"), json!(9), json!(0.25)]),
            save_image(3),
        ],
        &[(1, 20, 0, 3, 0, "IMAGE")],
    );
    doc.extra.group_nodes.insert("blurry".to_string(), blurry_config());
    doc.extra.group_nodes.insert(
        "outer".to_string(),
        serde_json::from_value(json!({
            "nodes": [
                { "id": 1, "type": "LoadImage",
                  "outputs": [{ "name": "IMAGE", "type": "IMAGE", "links": [1], "slot_index": 0 }],
                  "widgets_values": ["a.png"] },
                { "id": 2, "type": "workflow/blurry",
                  "inputs": [{ "name": "0:image", "type": "IMAGE", "link": 1 }],
                  "outputs": [{ "name": "1:sharpened", "type": "IMAGE", "links": [], "slot_index": 0 }],
                  "widgets_values": [1, 0.1] }
            ],
            "links": [[0, 0, 1, 0, 1, "IMAGE"]]
        }))
        .unwrap(),
    );

    let compiler = Compiler::new(create_registry());
    let compiled = compile(&compiler, &doc);

    let ids: Vec<&String> = compiled.output.keys().collect();
    assert_eq!(ids, vec!["20:0", "20:1:0", "20:1:1", "3"]);
    assert_eq!(compiled.output["20:0"].inputs["image"], InputValue::Literal(json!("b.png")));
    assert_eq!(compiled.output["20:1:0"].inputs["image"], link_input("20:0", 0));
    assert_eq!(compiled.output["20:1:0"].inputs["radius"], InputValue::Literal(json!(9)));
    assert_eq!(compiled.output["20:1:1"].inputs["amount"], InputValue::Literal(json!(0.25)));
    assert_eq!(compiled.output["3"].inputs["images"], link_input("20:1:1", 0));
}

#[test]
fn test_self_containing_group_is_left_unexpanded() {
    let mut doc = wire(
        vec![load_image(1), Node::new(30, "workflow/loop").with_input("0:image", "IMAGE")],
        &[(1, 1, 0, 30, 0, "IMAGE")],
    );
    doc.extra.group_nodes.insert(
        "loop".to_string(),
        serde_json::from_value(json!({
            "nodes": [
                { "id": 1, "type": "Blur",
                  "inputs": [{ "name": "image", "type": "IMAGE", "link": null }],
                  "outputs": [{ "name": "IMAGE", "type": "IMAGE", "links": [], "slot_index": 0 }],
                  "widgets_values": [2] },
                { "id": 2, "type": "workflow/loop" }
            ],
            "links": []
        }))
        .unwrap(),
    );

    let compiler = Compiler::new(create_registry());
    let compiled = compile(&compiler, &doc);

    assert_eq!(compiled.output["30:0"].class_type, "Blur");
    assert_eq!(compiled.output["30:0"].inputs["image"], link_input("1", 0));
    assert_eq!(compiled.output["30:1"].class_type, "workflow/loop");
    assert!(!compiled.output.contains_key("30:1:0"));
}

#[test]
fn test_boundary_reroutes_are_typed_and_walked_through() {
    let config: GroupConfig = serde_json::from_value(json!({
        "nodes": [
            { "id": 5, "type": "Reroute",
              "inputs": [{ "name": "", "type": "*", "link": null }],
              "outputs": [{ "name": "", "type": "IMAGE", "links": [1], "slot_index": 0 }] },
            { "id": 6, "type": "Blur",
              "inputs": [{ "name": "image", "type": "IMAGE", "link": 1 }],
              "outputs": [{ "name": "IMAGE", "type": "IMAGE", "links": [2], "slot_index": 0 }],
              "widgets_values": [1] },
            { "id": 7, "type": "Reroute",
              "inputs": [{ "name": "", "type": "*", "link": 2 }],
              "outputs": [{ "name": "", "type": "IMAGE", "links": [], "slot_index": 0 }] }
        ],
        "links": [[0, 0, 1, 0, 1, "IMAGE"], [1, 0, 2, 0, 2, "IMAGE"]]
    }))
    .unwrap();

    let registry = create_registry();
    let group = build_node_def(&config, "routed", &DefinitionSet::new(&registry));
    let input_names: Vec<&String> = group.def.input.required.keys().collect();
    assert_eq!(input_names, vec!["0:IMAGE", "1:radius"]);
    assert_eq!(group.def.output_name, vec!["2:IMAGE"]);
    assert_eq!(group.slots.outputs[&0], SlotRef { node: 2, slot: 0 });

    let instance = Node::new(40, "workflow/routed")
        .with_input("0:IMAGE", "IMAGE")
        .with_output("2:IMAGE", "IMAGE")
        .with_widgets(vec![json!(5)]);
    let mut doc = wire(
        vec![load_image(1), instance, save_image(3)],
        &[(1, 1, 0, 40, 0, "IMAGE"), (2, 40, 0, 3, 0, "IMAGE")],
    );
    doc.extra.group_nodes.insert("routed".to_string(), config);

    let compiled = compile(&Compiler::new(registry.clone()), &doc);

    let ids: Vec<&String> = compiled.output.keys().collect();
    assert_eq!(ids, vec!["1", "3", "40:1"]);
    assert_eq!(compiled.output["40:1"].inputs["image"], link_input("1", 0));
    assert_eq!(compiled.output["40:1"].inputs["radius"], InputValue::Literal(json!(5)));
    assert_eq!(compiled.output["3"].inputs["images"], link_input("40:1", 0));
}

#[test]
fn test_unknown_member_type_is_reported_once_expanded() {
    let mut doc = create_group_document();
    let config = doc.extra.group_nodes.get_mut("blurry").unwrap();
    config.nodes.push(Node::new(9, "Mystery"));

    let compiler = Compiler::new(create_registry());
    let compiled = compile(&compiler, &doc);

    assert_eq!(compiled.missing_types, vec!["Mystery".to_string()]);
    assert!(!compiled.output.contains_key("10:2"));
    assert!(compiled.output.contains_key("10:1"));
}

#[test]
fn test_muted_instance_is_not_expanded() {
    let mut doc = create_group_document();
    doc.nodes[1].mode = NodeMode::Muted;

    let compiler = Compiler::new(create_registry());
    let compiled = compile(&compiler, &doc);

    let ids: Vec<&String> = compiled.output.keys().collect();
    assert_eq!(ids, vec!["1", "3"]);
    assert!(!compiled.output["3"].inputs.contains_key("images"));
}

#[test]
fn test_bypassed_instance_forwards_its_input() {
    let mut doc = create_group_document();
    doc.nodes[1].mode = NodeMode::Bypassed;

    let compiler = Compiler::new(create_registry());
    let compiled = compile(&compiler, &doc);

    assert_eq!(compiled.output.len(), 2);
    assert_eq!(compiled.output["3"].inputs["images"], link_input("1", 0));
}

#[test]
fn test_collapse_rebuilds_equivalent_definition() {
    let registry = create_registry();
    let doc = migrate::expand(create_group_document(), &registry).unwrap();
    let defs = DefinitionSet::with_groups(&registry, &doc.extra.group_nodes);
    let original = defs.group("workflow/blurry").unwrap().clone();

    let mut arena = GraphArena::from_document(&doc);
    let mut missing = Vec::new();
    assert_eq!(expand_groups(&mut arena, &defs, &mut missing), 1);
    assert!(missing.is_empty());
    assert!(arena.node(&NodeId::Int(10)).is_none());

    let collapsed = collapse(&arena, &NodeId::Int(10), 2).expect("all members present");
    assert_eq!(collapsed.nodes.len(), 2);
    assert_eq!(collapsed.links.len(), 1);
    assert_eq!(collapsed.nodes[0].widgets_values, Some(vec![json!(7)]));

    let rebuilt = build_node_def(&collapsed, "blurry", &defs);
    assert_eq!(rebuilt.def, original.def);
    assert_eq!(rebuilt.slots, original.slots);

    assert!(collapse(&arena, &NodeId::Int(10), 3).is_none());
}

#[test]
fn test_load_lists_group_definitions() {
    let compiler = Compiler::new(create_registry());
    let loaded = tokio_test::block_on(compiler.load(&create_group_document())).unwrap();

    assert_eq!(loaded.group_defs.len(), 1);
    assert_eq!(loaded.group_defs[0].node_type, "workflow/blurry");
    // Loading keeps instances collapsed and brings the document into runtime form.
    let instance = loaded.document.node(&NodeId::Int(10)).unwrap();
    assert_eq!(instance.flow_input_count(), 1);
    assert!(loaded.document.support_flow_control);
}
