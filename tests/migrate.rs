//! Tests for the legacy migrator, the compact/runtime codec and the flow table.
mod common;
use common::*;
use kumitate::error::CompileError;
use kumitate::graph::{FLOW, FlowLink, NodeId};
use kumitate::migrate::{FlowTarget, flow_order};
use kumitate::prelude::*;
use serde_json::json;

#[test]
fn test_linear_legacy_document_gets_two_flow_links() {
    let registry = create_registry();
    let doc = create_linear_document();

    let runtime = migrate::expand(doc, &registry).expect("expand should succeed");

    let flows: Vec<_> = runtime.links.iter().filter(|l| l.is_flow()).collect();
    assert_eq!(flows.len(), 2);
    assert_eq!(flows[0].origin_id, NodeId::Int(1));
    assert_eq!(flows[0].target_id, NodeId::Int(2));
    assert_eq!(flows[1].origin_id, NodeId::Int(2));
    assert_eq!(flows[1].target_id, NodeId::Int(3));
    // Fresh ids are allocated above the existing data links.
    assert!(flows.iter().all(|l| l.id > 2));
    assert!(runtime.support_flow_control);
    assert!(runtime.flow_links.is_none());

    // FLOW slots come first and data links are shifted behind them.
    let blur = runtime.node(&NodeId::Int(2)).unwrap();
    assert_eq!(blur.inputs[0].slot_type, FLOW);
    assert_eq!(blur.inputs[1].name, "image");
    assert_eq!(blur.outputs[0].slot_type, FLOW);
    assert_eq!(blur.outputs[1].slot_index, Some(1));
    let data = runtime.links.iter().find(|l| l.id == 1).unwrap();
    assert_eq!((data.origin_slot, data.target_slot), (1, 1));
    assert_eq!(blur.inputs[1].link, Some(1));
}

#[test]
fn test_linear_document_compacts_back_losslessly() {
    let registry = create_registry();
    let original = create_linear_document();

    let runtime = migrate::expand(original.clone(), &registry).unwrap();
    let compact = migrate::compact(runtime).unwrap();

    assert_eq!(compact.links, original.links);
    for (stored, before) in compact.nodes.iter().zip(&original.nodes) {
        assert_eq!(stored.inputs, before.inputs);
        assert_eq!(stored.outputs, before.outputs);
        assert_eq!(stored.widgets_values, before.widgets_values);
    }
    let flow_links = compact.flow_links.as_ref().unwrap();
    assert_eq!(flow_links.len(), 2);
    assert_eq!(compact.nodes[0].flow_outputs.as_ref().unwrap()[0].name, "TO");
    assert_eq!(compact.nodes[1].flow_inputs.as_ref().unwrap()[0].name, "FROM");
}

#[test]
fn test_compact_expand_round_trip_is_exact() {
    let registry = create_registry();
    let compact = migrate::compact(migrate::expand(create_linear_document(), &registry).unwrap()).unwrap();

    let again = migrate::compact(migrate::expand(compact.clone(), &registry).unwrap()).unwrap();
    assert_eq!(again, compact);
}

#[test]
fn test_reexpanding_preserves_flow_links() {
    let registry = create_registry();
    let runtime = migrate::expand(create_linear_document(), &registry).unwrap();
    let reexpanded =
        migrate::expand(migrate::compact(runtime.clone()).unwrap(), &registry).unwrap();

    let flow_pairs = |doc: &Document| -> Vec<(NodeId, NodeId)> {
        doc.links
            .iter()
            .filter(|l| l.is_flow())
            .map(|l| (l.origin_id.clone(), l.target_id.clone()))
            .collect()
    };
    assert_eq!(flow_pairs(&reexpanded), flow_pairs(&runtime));
}

#[test]
fn test_expand_is_noop_on_runtime_document() {
    let registry = create_registry();
    let runtime = migrate::expand(create_linear_document(), &registry).unwrap();
    let again = migrate::expand(runtime.clone(), &registry).unwrap();
    assert_eq!(again, runtime);
}

#[test]
fn test_compact_is_idempotent() {
    let registry = create_registry();
    let runtime = migrate::expand(create_linear_document(), &registry).unwrap();
    let once = migrate::compact(runtime).unwrap();
    let twice = migrate::compact(once.clone()).unwrap();
    assert_eq!(once, twice);
}

#[test]
fn test_flow_order_is_topological() {
    let registry = create_registry();
    // Declared out of order: SaveImage(3) <- Blur(2) <- LoadImage(1), plus a
    // second branch LoadImage(4) -> Sharpen(5) -> SaveImage(3)'s sibling.
    let doc = wire(
        vec![save_image(3), blur(2, 1), sharpen(5, 0.2), load_image(1), load_image(4), save_image(6)],
        &[
            (1, 1, 0, 2, 0, "IMAGE"),
            (2, 2, 0, 3, 0, "IMAGE"),
            (3, 4, 0, 5, 0, "IMAGE"),
            (4, 5, 0, 6, 0, "IMAGE"),
        ],
    );

    let order = flow_order(&doc, &registry);
    assert_eq!(order.len(), 6);
    let position = |id: i64| order.iter().position(|n| *n == NodeId::Int(id)).unwrap();
    for link in &doc.links {
        let (NodeId::Int(from), NodeId::Int(to)) = (&link.origin_id, &link.target_id) else {
            panic!("integer ids expected");
        };
        assert!(position(*from) < position(*to), "{} must precede {}", from, to);
    }
    // Ready nodes are taken in document order.
    assert_eq!(order[0], NodeId::Int(1));
    assert_eq!(order[1], NodeId::Int(4));
}

#[test]
fn test_flow_order_walks_through_reroutes() {
    let registry = create_registry();
    let doc = wire(
        vec![save_image(3), reroute(9), load_image(1)],
        &[(1, 1, 0, 9, 0, "IMAGE"), (2, 9, 0, 3, 0, "IMAGE")],
    );

    let order = flow_order(&doc, &registry);
    assert_eq!(order, vec![NodeId::Int(1), NodeId::Int(3)]);

    let runtime = migrate::expand(doc, &registry).unwrap();
    let reroute = runtime.node(&NodeId::Int(9)).unwrap();
    assert_eq!(reroute.flow_input_count(), 0);
    assert_eq!(reroute.flow_output_count(), 0);
    let flow = runtime.links.iter().find(|l| l.is_flow()).unwrap();
    assert_eq!((flow.origin_id.clone(), flow.target_id.clone()), (NodeId::Int(1), NodeId::Int(3)));
}

#[test]
fn test_flow_order_terminates_on_reroute_cycle() {
    let registry = create_registry();
    let doc = wire(
        vec![load_image(1), reroute(8), reroute(9)],
        &[(1, 8, 0, 9, 0, "*"), (2, 9, 0, 8, 0, "*")],
    );
    let order = flow_order(&doc, &registry);
    assert_eq!(order, vec![NodeId::Int(1)]);
}

#[test]
fn test_flow_order_appends_data_cycles() {
    let registry = create_registry();
    let doc = wire(
        vec![blur(1, 1), blur(2, 1), load_image(3)],
        &[(1, 1, 0, 2, 0, "IMAGE"), (2, 2, 0, 1, 0, "IMAGE")],
    );
    let order = flow_order(&doc, &registry);
    assert_eq!(order, vec![NodeId::Int(3), NodeId::Int(1), NodeId::Int(2)]);
}

#[test]
fn test_second_flow_link_on_same_output_is_dropped() {
    let registry = create_registry();
    let mut compact =
        migrate::compact(migrate::expand(create_linear_document(), &registry).unwrap()).unwrap();
    compact
        .flow_links
        .as_mut()
        .unwrap()
        .push(FlowLink::new(50, (NodeId::Int(1), 0), (NodeId::Int(3), 0)));

    let runtime = migrate::expand(compact, &registry).unwrap();
    assert_eq!(runtime.links.iter().filter(|l| l.is_flow()).count(), 2);
    assert!(runtime.links.iter().all(|l| l.id != 50));
}

#[test]
fn test_flow_link_to_unknown_node_is_invalid() {
    let registry = create_registry();
    let mut compact =
        migrate::compact(migrate::expand(create_linear_document(), &registry).unwrap()).unwrap();
    compact.flow_links.as_mut().unwrap()[0].target_id = NodeId::Int(99);

    match migrate::expand(compact, &registry) {
        Err(CompileError::InvalidDocument { message, .. }) => assert!(message.contains("99")),
        other => panic!("Expected InvalidDocument, got {:?}", other),
    }
}

#[test]
fn test_flow_table_tie_break_and_gaps() {
    let registry = create_registry();
    let mut compact =
        migrate::compact(migrate::expand(create_linear_document(), &registry).unwrap()).unwrap();
    // A competing claim on node 1's only FLOW output with a lower id, and a
    // claim on a higher slot that leaves slot 1 empty.
    let flow_links = compact.flow_links.as_mut().unwrap();
    flow_links.push(FlowLink::new(0, (NodeId::Int(1), 0), (NodeId::Int(3), 0)));
    flow_links.push(FlowLink::new(40, (NodeId::Int(1), 2), (NodeId::Int(2), 0)));

    let table = FlowTable::from_document(&compact);
    let successors = table.successors(&NodeId::Int(1)).unwrap();
    assert_eq!(successors.len(), 3);
    assert_eq!(successors[0], Some(FlowTarget(NodeId::Int(3), 0)));
    assert_eq!(successors[1], None);
    assert_eq!(successors[2], Some(FlowTarget(NodeId::Int(2), 0)));
    assert!(table.successors(&NodeId::Int(3)).is_none());
}

#[test]
fn test_flow_table_serializes_nulls() {
    let registry = create_registry();
    let compact =
        migrate::compact(migrate::expand(create_linear_document(), &registry).unwrap()).unwrap();
    let table = FlowTable::from_document(&compact);
    let json = serde_json::to_value(&table).unwrap();
    assert_eq!(json["1"], serde_json::json!([[2, 0]]));
    assert_eq!(json["2"], serde_json::json!([[3, 0]]));
    assert!(json["3"].is_null());
}

#[test]
fn test_malformed_document_reports_position() {
    let result = Document::from_json("{\n  \"nodes\": [\n    {\"id\": 1,, }\n  ]\n}");
    match result {
        Err(CompileError::MalformedDocument { line, .. }) => assert_eq!(line, 3),
        other => panic!("Expected MalformedDocument, got {:?}", other),
    }
}

#[test]
fn test_unsupported_mode_is_malformed() {
    let json = r#"{"nodes": [{"id": 1, "type": "Blur", "mode": 3}], "links": []}"#;
    assert!(matches!(
        Document::from_json(json),
        Err(CompileError::MalformedDocument { .. })
    ));
}

#[test]
fn test_document_round_trips_through_json_with_unknown_fields() {
    let json = r#"{
        "last_node_id": 2, "last_link_id": 1,
        "nodes": [
            {"id": 1, "type": "LoadImage", "mode": 0, "pos": [10, 20],
             "outputs": [{"name": "IMAGE", "type": "IMAGE", "links": [1], "slot_index": 0}],
             "widgets_values": ["a.png"]},
            {"id": 2, "type": "SaveImage", "mode": 4,
             "inputs": [{"name": "images", "type": "IMAGE", "link": 1}]}
        ],
        "links": [[1, 1, 0, 2, 0, "IMAGE"]],
        "groups": [], "config": {}, "extra": {"ds": {"scale": 1}}, "version": 0.4
    }"#;
    let doc = Document::from_json(json).unwrap();
    assert_eq!(doc.nodes[1].mode, NodeMode::Bypassed);
    assert_eq!(doc.nodes[0].extra["pos"], serde_json::json!([10, 20]));
    assert!(doc.rest.contains_key("version"));
    assert!(doc.extra.rest.contains_key("ds"));

    let reparsed = Document::from_json(&doc.to_json().unwrap()).unwrap();
    assert_eq!(reparsed, doc);
}

#[test]
fn test_stored_document_parses() {
    let stored = create_stored_document();
    let doc = Document::from_json(&stored.to_string()).expect("stored document should parse");

    let flow_inputs = |i: usize| doc.nodes[i].flow_inputs.as_ref().unwrap();
    assert_eq!(flow_inputs(0)[0].links, Some(vec![None]));
    assert_eq!(flow_inputs(0)[0].link(), None);
    assert_eq!(flow_inputs(1)[0].link(), Some(3));
    assert_eq!(flow_inputs(1)[0].extra["shape"], json!(5));

    let flow_links = doc.flow_links.as_ref().unwrap();
    assert_eq!(flow_links.len(), 2);
    assert_eq!(flow_links[0].target_id, NodeId::Int(2));
    assert_eq!(flow_links[0].tail, vec![json!("FLOW")]);
}

#[test]
fn test_stored_document_round_trips_exactly() {
    let registry = create_registry();
    let stored = create_stored_document();
    let doc = Document::from_json(&stored.to_string()).unwrap();

    let runtime = migrate::expand(doc, &registry).unwrap();
    let compact = migrate::compact(runtime).unwrap();

    assert_eq!(serde_json::to_value(&compact).unwrap(), stored);
}

#[test]
fn test_stored_flow_slots_keep_display_fields_at_runtime() {
    let registry = create_registry();
    let doc = Document::from_json(&create_stored_document().to_string()).unwrap();

    let runtime = migrate::expand(doc, &registry).unwrap();

    let blur = runtime.node(&NodeId::Int(2)).unwrap();
    assert_eq!(blur.inputs[0].slot_type, FLOW);
    assert_eq!(blur.inputs[0].link, Some(3));
    assert_eq!(blur.inputs[0].extra["shape"], json!(5));
    assert_eq!(blur.outputs[0].slot_index, Some(0));
    assert_eq!(blur.outputs[0].extra["shape"], json!(5));
    assert_eq!(blur.outputs[1].extra["shape"], json!(3));
    let flow_ids: Vec<u64> = runtime.links.iter().filter(|l| l.is_flow()).map(|l| l.id).collect();
    assert_eq!(flow_ids, vec![3, 4]);
    assert_eq!(runtime.last_link_id, Some(4));
}

#[test]
fn test_flow_links_accept_five_or_six_fields() {
    let short: FlowLink = serde_json::from_value(json!([7, 1, 0, 2, 0])).unwrap();
    assert!(short.tail.is_empty());
    assert_eq!(serde_json::to_value(&short).unwrap(), json!([7, 1, 0, 2, 0]));

    let typed: FlowLink = serde_json::from_value(json!([7, "4:1", 0, 2, 1, "FLOW"])).unwrap();
    assert_eq!(typed.origin_id, NodeId::from("4:1"));
    assert_eq!(typed.target_slot, 1);
    assert_eq!(serde_json::to_value(&typed).unwrap(), json!([7, "4:1", 0, 2, 1, "FLOW"]));

    let json = r#"{"nodes": [], "flow_links": [[7, 1, 0, 2, 0, "FLOW", 9]]}"#;
    assert!(matches!(
        Document::from_json(json),
        Err(CompileError::MalformedDocument { .. })
    ));
}

#[test]
fn test_compacted_legacy_document_uses_stored_shape() {
    let registry = create_registry();
    let compact =
        migrate::compact(migrate::expand(create_linear_document(), &registry).unwrap()).unwrap();
    let json = serde_json::to_value(&compact).unwrap();

    assert_eq!(
        json["nodes"][0]["flow_inputs"][0],
        json!({ "name": "FROM", "type": "FLOW", "links": [null] })
    );
    assert_eq!(json["nodes"][2]["flow_outputs"][0]["link"], json!(null));
    assert_eq!(json["flow_links"][0][5], json!("FLOW"));
}
