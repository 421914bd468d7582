//! The operation registry: what every node type accepts and produces.
//!
//! The registry is built from the engine's `object_info` document and is
//! read-only once a [`Compiler`](crate::compiler::Compiler) holds it.

use ahash::{AHashMap, AHashSet};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::path::Path;

use crate::error::CompileError;
use crate::graph::{Node, NodeMode, Participation};

pub mod widgets;

pub use widgets::{SeedControl, Widget, WidgetSpec};

/// Declared inputs of an operation, each keyed by name in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InputSpec {
    #[serde(default)]
    pub required: Map<String, Value>,
    #[serde(default)]
    pub optional: Map<String, Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One entry of the operation registry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperationDef {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub input: InputSpec,
    #[serde(default)]
    pub output: Vec<Value>,
    #[serde(default)]
    pub output_name: Vec<String>,
    #[serde(default)]
    pub output_is_list: Vec<bool>,
    #[serde(default)]
    pub output_node: bool,
    #[serde(default)]
    pub flow_inputs: Vec<(String, String)>,
    #[serde(default)]
    pub flow_outputs: Vec<(String, String)>,
}

/// A single declared input, flattened out of [`InputSpec`].
#[derive(Debug, Clone, PartialEq)]
pub struct InputDef {
    pub name: String,
    /// The declared type; `COMBO` for list-valued declarations.
    pub input_type: String,
    pub choices: Option<Vec<Value>>,
    pub options: Map<String, Value>,
    pub required: bool,
}

impl InputDef {
    fn parse(name: &str, spec: &Value, required: bool) -> Self {
        let (type_spec, options) = match spec {
            Value::Array(parts) => (
                parts.first().cloned().unwrap_or(Value::Null),
                parts
                    .get(1)
                    .and_then(Value::as_object)
                    .cloned()
                    .unwrap_or_default(),
            ),
            other => (other.clone(), Map::new()),
        };
        let (input_type, choices) = match type_spec {
            Value::Array(choices) => ("COMBO".to_string(), Some(choices)),
            Value::String(t) => (t, None),
            _ => ("*".to_string(), None),
        };
        InputDef {
            name: name.to_string(),
            input_type,
            choices,
            options,
            required,
        }
    }

    pub fn force_input(&self) -> bool {
        self.options.get("forceInput").and_then(Value::as_bool) == Some(true)
    }

    pub fn option_i64(&self, key: &str) -> Option<i64> {
        self.options.get(key).and_then(Value::as_i64)
    }
}

impl OperationDef {
    /// Creates an empty definition with the given name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_input(mut self, name: &str, spec: Value) -> Self {
        self.input.required.insert(name.to_string(), spec);
        self
    }

    pub fn with_optional_input(mut self, name: &str, spec: Value) -> Self {
        self.input.optional.insert(name.to_string(), spec);
        self
    }

    pub fn with_output(mut self, output_type: &str, name: &str) -> Self {
        self.output.push(Value::String(output_type.to_string()));
        self.output_name.push(name.to_string());
        self.output_is_list.push(false);
        self
    }

    /// Declared inputs, required first, each group in declaration order.
    pub fn inputs(&self) -> Vec<InputDef> {
        self.input
            .required
            .iter()
            .map(|(name, spec)| InputDef::parse(name, spec, true))
            .chain(
                self.input
                    .optional
                    .iter()
                    .map(|(name, spec)| InputDef::parse(name, spec, false)),
            )
            .collect()
    }

    pub fn input_def(&self, name: &str) -> Option<InputDef> {
        if let Some(spec) = self.input.required.get(name) {
            return Some(InputDef::parse(name, spec, true));
        }
        self.input
            .optional
            .get(name)
            .map(|spec| InputDef::parse(name, spec, false))
    }

    pub fn output_type(&self, index: usize) -> Option<String> {
        self.output.get(index).map(|t| match t {
            Value::String(t) => t.clone(),
            Value::Array(_) => "COMBO".to_string(),
            _ => "*".to_string(),
        })
    }

    /// Display label of an output: its declared name, falling back to its type.
    pub fn output_label(&self, index: usize) -> Option<String> {
        self.output_name
            .get(index)
            .filter(|name| !name.is_empty())
            .cloned()
            .or_else(|| self.output_type(index))
    }
}

/// Editor-only node kinds that never reach the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VirtualKind {
    /// Forwards its single input unchanged (`Reroute`).
    PassThrough,
    /// Supplies a value to the widgets it is connected to.
    Primitive,
    /// Comments and notes.
    Annotation,
}

pub const REROUTE: &str = "Reroute";
pub const PRIMITIVE: &str = "PrimitiveNode";

const DEFAULT_RENAMES: &[(&str, &str)] = &[
    ("T2IAdapterLoader", "ControlNetLoader"),
    ("ConditioningAverage ", "ConditioningAverage"),
    ("SDV_img2vid_Conditioning", "SVD_img2vid_Conditioning"),
];

const DEFAULT_WIDGET_TYPES: &[&str] = &[
    "INT",
    "FLOAT",
    "STRING",
    "BOOLEAN",
    "COMBO",
    "INT:seed",
    "INT:noise_seed",
    "IMAGEUPLOAD",
];

const DEFAULT_VIRTUAL_NODES: &[(&str, VirtualKind)] = &[
    (REROUTE, VirtualKind::PassThrough),
    (PRIMITIVE, VirtualKind::Primitive),
    ("Note", VirtualKind::Annotation),
    ("MarkdownNote", VirtualKind::Annotation),
];

/// Maps node types to their [`OperationDef`]s, plus the tables used to
/// interpret node types: renames, widget types and virtual node kinds.
#[derive(Debug, Clone)]
pub struct OperationRegistry {
    operations: AHashMap<String, OperationDef>,
    renames: AHashMap<String, String>,
    widget_types: AHashSet<String>,
    virtual_nodes: AHashMap<String, VirtualKind>,
}

impl Default for OperationRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl OperationRegistry {
    /// An empty registry with the default rename, widget and virtual node tables.
    pub fn new() -> Self {
        let mut registry = OperationRegistry {
            operations: AHashMap::new(),
            renames: AHashMap::new(),
            widget_types: AHashSet::new(),
            virtual_nodes: AHashMap::new(),
        };
        register_defaults(&mut registry);
        registry
    }

    /// Parses an `object_info` document (`{type: OperationDef}`).
    pub fn from_json(json: &str) -> Result<Self, CompileError> {
        let defs: Map<String, Value> =
            serde_json::from_str(json).map_err(|e| CompileError::RegistryParse(e.to_string()))?;
        let mut registry = Self::new();
        for (name, value) in defs {
            let mut def: OperationDef = serde_json::from_value(value)
                .map_err(|e| CompileError::RegistryParse(format!("{}: {}", name, e)))?;
            if def.name.is_empty() {
                def.name = name.clone();
            }
            registry.operations.insert(name, def);
        }
        Ok(registry)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, CompileError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| CompileError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_json(&content)
    }

    pub fn insert(&mut self, def: OperationDef) {
        self.operations.insert(def.name.clone(), def);
    }

    pub fn with_operation(mut self, def: OperationDef) -> Self {
        self.insert(def);
        self
    }

    pub fn get(&self, node_type: &str) -> Option<&OperationDef> {
        self.operations.get(node_type)
    }

    pub fn contains(&self, node_type: &str) -> bool {
        self.operations.contains_key(node_type)
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn add_rename(&mut self, from: &str, to: &str) {
        self.renames.insert(from.to_string(), to.to_string());
    }

    pub fn add_widget_type(&mut self, widget_type: &str) {
        self.widget_types.insert(widget_type.to_string());
    }

    pub fn add_virtual_node(&mut self, node_type: &str, kind: VirtualKind) {
        self.virtual_nodes.insert(node_type.to_string(), kind);
    }

    /// The current name of a type that was renamed.
    pub fn rename(&self, node_type: &str) -> Option<&str> {
        self.renames.get(node_type).map(String::as_str)
    }

    pub fn virtual_kind(&self, node_type: &str) -> Option<VirtualKind> {
        self.virtual_nodes.get(node_type).copied()
    }

    pub fn is_pass_through(&self, node_type: &str) -> bool {
        self.virtual_kind(node_type) == Some(VirtualKind::PassThrough)
    }

    /// Whether a type is known, either as an operation or as a virtual node.
    pub fn is_known(&self, node_type: &str) -> bool {
        self.contains(node_type) || self.virtual_nodes.contains_key(node_type)
    }

    pub fn participation(&self, node: &Node) -> Participation {
        if self.virtual_nodes.contains_key(&node.node_type) {
            return Participation::Virtual;
        }
        match node.mode {
            NodeMode::Normal => Participation::Normal,
            NodeMode::Muted => Participation::Muted,
            NodeMode::Bypassed => Participation::Bypassed,
        }
    }

    /// An input is a widget when its type is a list, or when `TYPE:name` or
    /// `TYPE` is a widget type. `forceInput` inputs never are.
    pub fn is_widget(&self, input: &InputDef) -> bool {
        if input.force_input() {
            return false;
        }
        input.choices.is_some()
            || self
                .widget_types
                .contains(&format!("{}:{}", input.input_type, input.name))
            || self.widget_types.contains(&input.input_type)
    }
}

fn register_defaults(registry: &mut OperationRegistry) {
    for (from, to) in DEFAULT_RENAMES {
        registry.add_rename(from, to);
    }
    for widget_type in DEFAULT_WIDGET_TYPES {
        registry.add_widget_type(widget_type);
    }
    for (node_type, kind) in DEFAULT_VIRTUAL_NODES {
        registry.add_virtual_node(node_type, *kind);
    }
}

/// Strips characters that must never appear in a node type shown to the user.
pub fn sanitize_type_name(name: &str) -> String {
    name.chars()
        .filter(|c| !matches!(c, '&' | '<' | '>' | '"' | '\'' | '`' | '='))
        .collect()
}
