//! Group nodes: user-defined macro nodes stored in `extra.groupNodes`.
//!
//! A group is registered as a single operation (`workflow/<name>`) whose
//! inputs, widgets and outputs are the unconnected parts of its members. At
//! compile time each instance is replaced by its members again.

use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use tracing::debug;

use crate::graph::{FLOW, Node};
use crate::registry::{OperationDef, OperationRegistry};

mod expand;

pub use expand::{collapse, expand_groups, resolve_pass_through};

/// Type prefix under which groups are registered.
pub const GROUP_TYPE_PREFIX: &str = "workflow/";

const GROUP_CATEGORY: &str = "group nodes/workflow";

/// A link inside a group: `[origin_index|null, origin_slot, target_index, target_slot, ...]`.
///
/// Indices refer to the group's `nodes`. A null origin marks a link that came
/// from outside the copied nodes. Trailing fields are kept verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Value>", into = "Vec<Value>")]
pub struct GroupLink {
    pub origin: Option<usize>,
    pub origin_slot: usize,
    pub target: usize,
    pub target_slot: usize,
    pub tail: Vec<Value>,
}

impl GroupLink {
    pub fn new(origin: Option<usize>, origin_slot: usize, target: usize, target_slot: usize) -> Self {
        Self {
            origin,
            origin_slot,
            target,
            target_slot,
            tail: Vec::new(),
        }
    }

    fn is_flow(&self) -> bool {
        self.tail.iter().any(|v| v.as_str() == Some(FLOW))
    }
}

impl TryFrom<Vec<Value>> for GroupLink {
    type Error = String;

    fn try_from(mut values: Vec<Value>) -> Result<Self, Self::Error> {
        if values.len() < 4 {
            return Err(format!(
                "group link needs at least 4 fields, found {}",
                values.len()
            ));
        }
        let tail = values.split_off(4);
        let index = |v: &Value, field: &str| {
            v.as_u64()
                .map(|n| n as usize)
                .ok_or_else(|| format!("group link {} must be a non-negative integer", field))
        };
        let origin = match &values[0] {
            Value::Null => None,
            v => Some(index(v, "origin")?),
        };
        Ok(GroupLink {
            origin,
            origin_slot: index(&values[1], "origin slot")?,
            target: index(&values[2], "target")?,
            target_slot: index(&values[3], "target slot")?,
            tail,
        })
    }
}

impl From<GroupLink> for Vec<Value> {
    fn from(link: GroupLink) -> Self {
        let mut values = vec![
            link.origin.map_or(Value::Null, Value::from),
            Value::from(link.origin_slot),
            Value::from(link.target),
            Value::from(link.target_slot),
        ];
        values.extend(link.tail);
        values
    }
}

/// The stored definition of a group: the copied member nodes and their links.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupConfig {
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub links: Vec<GroupLink>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl GroupConfig {
    /// Removes FLOW slots from members and FLOW links from the link list,
    /// shifting the remaining slot indices so they count data slots only.
    pub fn without_flow(&self) -> GroupConfig {
        let mut config = self.clone();
        let mut shifts = Vec::with_capacity(config.nodes.len());
        for node in config.nodes.iter_mut() {
            let n_in = node.inputs.iter().take_while(|s| s.is_flow()).count();
            let n_out = node.outputs.iter().take_while(|s| s.is_flow()).count();
            node.inputs.drain(..n_in);
            node.outputs.drain(..n_out);
            for output in node.outputs.iter_mut() {
                output.slot_index = output.slot_index.map(|i| i.saturating_sub(n_out));
            }
            node.flow_inputs = None;
            node.flow_outputs = None;
            shifts.push((n_in, n_out));
        }

        config.links = config
            .links
            .into_iter()
            .filter(|link| !link.is_flow())
            .filter_map(|mut link| {
                if let Some(origin) = link.origin {
                    let (_, n_out) = shifts.get(origin).copied().unwrap_or_default();
                    link.origin_slot = link.origin_slot.checked_sub(n_out)?;
                }
                let (n_in, _) = shifts.get(link.target).copied().unwrap_or_default();
                link.target_slot = link.target_slot.checked_sub(n_in)?;
                Some(link)
            })
            .collect();
        config
    }
}

/// Internal links of a config keyed by endpoint, for quick lookup.
pub(crate) struct ConfigLinks<'a> {
    pub to: AHashMap<(usize, usize), &'a GroupLink>,
    pub from: AHashMap<(usize, usize), &'a GroupLink>,
}

impl<'a> ConfigLinks<'a> {
    pub fn new(config: &'a GroupConfig) -> Self {
        let mut to = AHashMap::new();
        let mut from = AHashMap::new();
        for link in &config.links {
            let Some(origin) = link.origin else {
                continue;
            };
            from.insert((origin, link.origin_slot), link);
            to.insert((link.target, link.target_slot), link);
        }
        Self { to, from }
    }

    fn has_to(&self, node: usize) -> bool {
        self.to.keys().any(|(n, _)| *n == node)
    }

    fn has_from(&self, node: usize) -> bool {
        self.from.keys().any(|(n, _)| *n == node)
    }

    fn first_to(&self, node: usize) -> Option<&'a GroupLink> {
        self.to
            .iter()
            .filter(|((n, _), _)| *n == node)
            .min_by_key(|((_, slot), _)| *slot)
            .map(|(_, link)| *link)
    }

    fn first_from(&self, node: usize) -> Option<&'a GroupLink> {
        self.from
            .iter()
            .filter(|((n, _), _)| *n == node)
            .min_by_key(|((_, slot), _)| *slot)
            .map(|(_, link)| *link)
    }
}

/// A member output exposed by the group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotRef {
    pub node: usize,
    pub slot: usize,
}

/// How the group's own slots map onto its members.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupSlots {
    /// member index -> (member data input slot -> group input index)
    pub inputs: BTreeMap<usize, BTreeMap<usize, usize>>,
    /// member index -> (member widget name -> group widget name)
    pub widgets: BTreeMap<usize, BTreeMap<String, String>>,
    /// group output index -> member output
    pub outputs: BTreeMap<usize, SlotRef>,
}

impl GroupSlots {
    /// The member input fed by group input `index`.
    pub fn input_target(&self, index: usize) -> Option<(usize, usize)> {
        self.inputs.iter().find_map(|(member, slots)| {
            slots
                .iter()
                .find(|(_, external)| **external == index)
                .map(|(slot, _)| (*member, *slot))
        })
    }
}

/// A group registered as an operation.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupNodeDef {
    pub name: String,
    pub node_type: String,
    pub def: OperationDef,
    pub slots: GroupSlots,
    /// The config the definition was built from, FLOW slots removed.
    pub config: GroupConfig,
}

/// Every operation definition visible to a compile: the registry plus the
/// groups of the document being compiled.
#[derive(Debug, Clone)]
pub struct DefinitionSet<'a> {
    registry: &'a OperationRegistry,
    groups: AHashMap<String, GroupNodeDef>,
}

impl<'a> DefinitionSet<'a> {
    pub fn new(registry: &'a OperationRegistry) -> Self {
        Self {
            registry,
            groups: AHashMap::new(),
        }
    }

    /// Builds the definitions of every group in `configs`.
    ///
    /// Groups may contain other groups, so definitions are built in passes:
    /// a group whose nested group types are not defined yet waits for the
    /// next pass. Whatever is still waiting when a pass makes no progress is
    /// built with those members skipped.
    pub fn with_groups(
        registry: &'a OperationRegistry,
        configs: &BTreeMap<String, GroupConfig>,
    ) -> Self {
        let mut set = Self::new(registry);
        let mut pending: Vec<(&String, &GroupConfig)> = configs.iter().collect();
        loop {
            let (ready, waiting): (Vec<_>, Vec<_>) =
                pending.into_iter().partition(|(_, config)| {
                    config.nodes.iter().all(|n| {
                        !n.node_type.starts_with(GROUP_TYPE_PREFIX) || set.get(&n.node_type).is_some()
                    })
                });
            let progressed = !ready.is_empty();
            for (name, config) in ready {
                set.insert(build_node_def(config, name, &set));
            }
            pending = waiting;
            if pending.is_empty() {
                break;
            }
            if !progressed {
                for (name, config) in pending {
                    set.insert(build_node_def(config, name, &set));
                }
                break;
            }
        }
        set
    }

    pub fn insert(&mut self, group: GroupNodeDef) {
        self.groups.insert(group.node_type.clone(), group);
    }

    pub fn registry(&self) -> &'a OperationRegistry {
        self.registry
    }

    pub fn get(&self, node_type: &str) -> Option<&OperationDef> {
        self.registry
            .get(node_type)
            .or_else(|| self.groups.get(node_type).map(|g| &g.def))
    }

    pub fn group(&self, node_type: &str) -> Option<&GroupNodeDef> {
        self.groups.get(node_type)
    }

    pub fn is_known(&self, node_type: &str) -> bool {
        self.registry.is_known(node_type) || self.groups.contains_key(node_type)
    }

    /// Group definitions sorted by type.
    pub fn groups(&self) -> Vec<&GroupNodeDef> {
        let mut groups: Vec<_> = self.groups.values().collect();
        groups.sort_by(|a, b| a.node_type.cmp(&b.node_type));
        groups
    }
}

/// One-in/one-out definition for a reroute on the group boundary, typed
/// after the slot it connects to.
fn boundary_reroute_def(
    config: &GroupConfig,
    index: usize,
    links: &ConfigLinks<'_>,
) -> Option<OperationDef> {
    let to_inside = links.has_from(index);
    let from_inside = links.has_to(index);
    if to_inside && from_inside {
        return None;
    }
    let reroute_type = if to_inside {
        links.first_from(index).and_then(|link| {
            config
                .nodes
                .get(link.target)?
                .inputs
                .get(link.target_slot)
                .map(|s| s.slot_type.clone())
        })
    } else {
        links.first_to(index).and_then(|link| {
            config
                .nodes
                .get(link.origin?)?
                .outputs
                .get(link.origin_slot)
                .map(|s| s.slot_type.clone())
        })
    }
    .unwrap_or_else(|| "*".to_string());

    Some(
        OperationDef::named(config.nodes[index].node_type.clone())
            .with_input(&reroute_type, json!([reroute_type, {}]))
            .with_output(&reroute_type, ""),
    )
}

/// Describes a group as a single operation.
///
/// Member inputs that are widgets become group widgets named
/// `"<member index>:<input name>"`. Link inputs not fed from inside the group
/// become group inputs with the same naming, and member outputs not consumed
/// inside become group outputs named after the output (or its type).
pub fn build_node_def(config: &GroupConfig, name: &str, defs: &DefinitionSet<'_>) -> GroupNodeDef {
    let config = config.without_flow();
    let links = ConfigLinks::new(&config);
    let registry = defs.registry();
    let mut slots = GroupSlots::default();
    let mut def = OperationDef {
        name: name.to_string(),
        display_name: Some(name.to_string()),
        category: GROUP_CATEGORY.to_string(),
        flow_inputs: vec![("FROM".to_string(), FLOW.to_string())],
        flow_outputs: vec![("TO".to_string(), FLOW.to_string())],
        ..Default::default()
    };

    debug!(group = name, members = config.nodes.len(), "Building group node");

    let mut input_count = 0;
    for (index, node) in config.nodes.iter().enumerate() {
        let inner = match defs.get(&node.node_type) {
            Some(inner) => inner.clone(),
            None if registry.is_pass_through(&node.node_type) => {
                match boundary_reroute_def(&config, index, &links) {
                    Some(reroute) => reroute,
                    None => continue,
                }
            }
            None => continue,
        };

        let mut link_slot = 0;
        for input in inner.inputs() {
            let slot_name = format!("{}:{}", index, input.name);
            if registry.is_widget(&input) {
                slots
                    .widgets
                    .entry(index)
                    .or_default()
                    .insert(input.name.clone(), slot_name.clone());
            } else {
                if links.to.contains_key(&(index, link_slot)) {
                    link_slot += 1;
                    continue;
                }
                slots
                    .inputs
                    .entry(index)
                    .or_default()
                    .insert(link_slot, input_count);
                link_slot += 1;
                input_count += 1;
            }

            let mut spec = inner
                .input
                .required
                .get(&input.name)
                .or_else(|| inner.input.optional.get(&input.name))
                .cloned()
                .unwrap_or(Value::Null);
            if matches!(input.name.as_str(), "seed" | "noise_seed") {
                spec = seed_spec(spec);
            }
            def.input.required.insert(slot_name, spec);
        }

        for output in 0..inner.output.len() {
            if links.from.contains_key(&(index, output)) {
                continue;
            }
            slots.outputs.insert(
                def.output.len(),
                SlotRef {
                    node: index,
                    slot: output,
                },
            );
            def.output.push(inner.output[output].clone());
            def.output_is_list
                .push(inner.output_is_list.get(output).copied().unwrap_or(false));
            def.output_name.push(format!(
                "{}:{}",
                index,
                inner.output_label(output).unwrap_or_default()
            ));
        }
    }

    GroupNodeDef {
        name: name.to_string(),
        node_type: format!("{}{}", GROUP_TYPE_PREFIX, name),
        def,
        slots,
        config,
    }
}

/// Marks a seed input so the group exposes its `control_after_generate` widget.
fn seed_spec(spec: Value) -> Value {
    let mut parts = match spec {
        Value::Array(parts) => parts,
        other => vec![other],
    };
    let mut options = Map::new();
    options.insert("control_after_generate".to_string(), Value::Bool(true));
    if let Some(Value::Object(existing)) = parts.get(1) {
        options.extend(existing.clone());
    }
    if parts.len() < 2 {
        parts.resize(2, Value::Null);
    }
    parts[1] = Value::Object(options);
    Value::Array(parts)
}
