//! Common test utilities for building registries and workflow documents.
use kumitate::graph::{GraphArena, InputSlot, LinkId, WidgetRef};
use kumitate::prelude::*;
use serde_json::{Value, json};

/// A small registry covering the operation shapes the tests need.
#[allow(dead_code)]
pub fn create_registry() -> OperationRegistry {
    let object_info = json!({
        "LoadImage": {
            "input": { "required": { "image": [["a.png", "b.png"], {}] } },
            "output": ["IMAGE"],
            "output_name": ["IMAGE"],
            "output_is_list": [false],
            "category": "image"
        },
        "Blur": {
            "input": { "required": {
                "image": ["IMAGE"],
                "radius": ["INT", { "default": 1, "min": 0, "max": 31 }]
            } },
            "output": ["IMAGE"],
            "output_name": ["IMAGE"],
            "category": "image/filters"
        },
        "Sharpen": {
            "input": { "required": {
                "image": ["IMAGE"],
                "amount": ["FLOAT", { "default": 0.5 }]
            } },
            "output": ["IMAGE"],
            "output_name": ["sharpened"],
            "category": "image/filters"
        },
        "SaveImage": {
            "input": { "required": {
                "images": ["IMAGE"],
                "filename_prefix": ["STRING", { "default": "out" }]
            } },
            "output": [],
            "output_node": true,
            "category": "image"
        },
        "KSampler": {
            "input": { "required": {
                "model": ["MODEL"],
                "seed": ["INT", { "default": 0, "min": 0, "max": 1000 }],
                "steps": ["INT", { "default": 20 }]
            } },
            "output": ["LATENT"],
            "category": "sampling"
        }
    });
    OperationRegistry::from_json(&object_info.to_string()).expect("registry should parse")
}

#[allow(dead_code)]
pub fn load_image(id: i64) -> Node {
    Node::new(id, "LoadImage")
        .with_output("IMAGE", "IMAGE")
        .with_widgets(vec![json!("a.png")])
}

#[allow(dead_code)]
pub fn blur(id: i64, radius: i64) -> Node {
    Node::new(id, "Blur")
        .with_input("image", "IMAGE")
        .with_output("IMAGE", "IMAGE")
        .with_widgets(vec![json!(radius)])
}

#[allow(dead_code)]
pub fn sharpen(id: i64, amount: f64) -> Node {
    Node::new(id, "Sharpen")
        .with_input("image", "IMAGE")
        .with_output("sharpened", "IMAGE")
        .with_widgets(vec![json!(amount)])
}

#[allow(dead_code)]
pub fn save_image(id: i64) -> Node {
    Node::new(id, "SaveImage")
        .with_input("images", "IMAGE")
        .with_widgets(vec![json!("out")])
}

#[allow(dead_code)]
pub fn reroute(id: i64) -> Node {
    Node::new(id, "Reroute")
        .with_input("", "*")
        .with_output("", "*")
}

/// Turns an input into a converted widget input.
#[allow(dead_code)]
pub fn widget_input(name: &str, slot_type: &str) -> InputSlot {
    let mut input = InputSlot::new(name, slot_type);
    input.widget = Some(WidgetRef {
        name: name.to_string(),
        extra: Default::default(),
    });
    input
}

/// Builds a document from nodes and `(id, origin, origin_slot, target, target_slot, type)`
/// links, keeping slot bookkeeping consistent.
#[allow(dead_code)]
pub fn wire(nodes: Vec<Node>, links: &[(LinkId, i64, usize, i64, usize, &str)]) -> Document {
    let template = Document::new(nodes, Vec::new());
    let mut arena = GraphArena::from_document(&template);
    for (id, origin, origin_slot, target, target_slot, link_type) in links {
        arena.insert_link(Link::new(
            *id,
            (*origin, *origin_slot),
            (*target, *target_slot),
            *link_type,
        ));
    }
    arena.to_document(&template)
}

/// Legacy document: LoadImage(1) -> Blur(2) -> SaveImage(3).
#[allow(dead_code)]
pub fn create_linear_document() -> Document {
    wire(
        vec![load_image(1), blur(2, 3), save_image(3)],
        &[(1, 1, 0, 2, 0, "IMAGE"), (2, 2, 0, 3, 0, "IMAGE")],
    )
}

/// Group `blurry`: Blur(0) -> Sharpen(1), Blur's image supplied from outside.
#[allow(dead_code)]
pub fn create_group_config() -> Value {
    json!({
        "nodes": [
            {
                "id": 7, "type": "Blur", "mode": 0,
                "inputs": [{ "name": "image", "type": "IMAGE", "link": null }],
                "outputs": [{ "name": "IMAGE", "type": "IMAGE", "links": [], "slot_index": 0 }],
                "widgets_values": [1]
            },
            {
                "id": 8, "type": "Sharpen", "mode": 0,
                "inputs": [{ "name": "image", "type": "IMAGE", "link": 4 }],
                "outputs": [{ "name": "sharpened", "type": "IMAGE", "links": null, "slot_index": 0 }],
                "widgets_values": [0.1]
            }
        ],
        "links": [[0, 0, 1, 0, 7, "IMAGE"]]
    })
}

/// LoadImage(1) -> `workflow/blurry` instance(10) -> SaveImage(3).
#[allow(dead_code)]
pub fn create_group_document() -> Document {
    let instance = Node::new(10, "workflow/blurry")
        .with_input("0:image", "IMAGE")
        .with_output("1:sharpened", "IMAGE")
        .with_widgets(vec![json!(7), json!(0.5)]);
    let mut doc = wire(
        vec![load_image(1), instance, save_image(3)],
        &[(1, 1, 0, 10, 0, "IMAGE"), (2, 10, 0, 3, 0, "IMAGE")],
    );
    doc.extra.group_nodes.insert(
        "blurry".to_string(),
        serde_json::from_value(create_group_config()).expect("group config should parse"),
    );
    doc
}

#[allow(dead_code)]
pub fn compile(compiler: &Compiler, doc: &Document) -> CompiledPrompt {
    tokio_test::block_on(compiler.compile(doc)).expect("compilation should succeed")
}

#[allow(dead_code)]
pub fn link_input(producer: &str, slot: usize) -> InputValue {
    InputValue::Link(producer.to_string(), slot)
}

/// LoadImage(1) -> Blur(2) -> SaveImage(3) exactly as the editor saves it:
/// typed flow slots with display fields, `[null]` for an unconnected `FROM`
/// and flow links that keep their `"FLOW"` type.
#[allow(dead_code)]
pub fn create_stored_document() -> Value {
    let from = |link: Value| json!({ "name": "FROM", "type": "FLOW", "shape": 5, "links": [link] });
    let to = |link: Value| {
        json!({ "name": "TO", "type": "FLOW", "slot_index": 0, "shape": 5, "link": link })
    };
    json!({
        "last_node_id": 3,
        "last_link_id": 4,
        "nodes": [
            {
                "id": 1, "type": "LoadImage", "pos": [0, 0], "size": [315, 314],
                "flags": {}, "order": 0, "mode": 0,
                "inputs": [],
                "outputs": [{ "name": "IMAGE", "type": "IMAGE", "links": [1], "shape": 3, "slot_index": 0 }],
                "properties": { "Node name for S&R": "LoadImage" },
                "widgets_values": ["a.png"],
                "flow_inputs": [from(Value::Null)],
                "flow_outputs": [to(json!(3))]
            },
            {
                "id": 2, "type": "Blur", "pos": [400, 0], "size": [315, 60],
                "flags": {}, "order": 1, "mode": 0,
                "inputs": [{ "name": "image", "type": "IMAGE", "link": 1 }],
                "outputs": [{ "name": "IMAGE", "type": "IMAGE", "links": [2], "shape": 3, "slot_index": 0 }],
                "properties": {},
                "widgets_values": [3],
                "flow_inputs": [from(json!(3))],
                "flow_outputs": [to(json!(4))]
            },
            {
                "id": 3, "type": "SaveImage", "pos": [800, 0], "size": [315, 270],
                "flags": {}, "order": 2, "mode": 0,
                "inputs": [{ "name": "images", "type": "IMAGE", "link": 2 }],
                "outputs": [],
                "properties": {},
                "widgets_values": ["out"],
                "flow_inputs": [from(json!(4))],
                "flow_outputs": [to(Value::Null)]
            }
        ],
        "links": [[1, 1, 0, 2, 0, "IMAGE"], [2, 2, 0, 3, 0, "IMAGE"]],
        "flow_links": [[3, 1, 0, 2, 0, "FLOW"], [4, 2, 0, 3, 0, "FLOW"]],
        "groups": [],
        "config": {},
        "extra": { "ds": { "scale": 1.0, "offset": [0, 0] } },
        "version": 0.4,
        "support_flow_control": true
    })
}
