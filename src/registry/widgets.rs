use rand::Rng;
use serde_json::Value;

use super::{InputDef, OperationDef, OperationRegistry};
use crate::graph::Node;

/// Name of the companion widget that controls how a seed changes between runs.
pub const CONTROL_AFTER_GENERATE: &str = "control_after_generate";

/// Upper bound used when randomizing a seed without an explicit `max`.
const MAX_RANDOM_SEED: i64 = 1_125_899_906_842_624;

/// Position of a widget in a node's `widgets_values`.
#[derive(Debug, Clone, PartialEq)]
pub struct WidgetSpec {
    pub name: String,
    /// Whether the widget's value is sent to the engine.
    pub serialize: bool,
    pub input: Option<InputDef>,
}

/// A widget bound to its stored value.
#[derive(Debug, Clone, PartialEq)]
pub struct Widget {
    pub name: String,
    pub value: Value,
    pub serialize: bool,
}

fn is_seed(input: &InputDef) -> bool {
    input.input_type == "INT"
        && (matches!(input.name.as_str(), "seed" | "noise_seed")
            || input.options.get(CONTROL_AFTER_GENERATE).and_then(Value::as_bool) == Some(true))
}

/// Widgets of an operation in the order their values are stored.
pub fn widget_layout(def: &OperationDef, registry: &OperationRegistry) -> Vec<WidgetSpec> {
    let mut layout = Vec::new();
    for input in def.inputs() {
        if !registry.is_widget(&input) {
            continue;
        }
        let seed = is_seed(&input);
        layout.push(WidgetSpec {
            name: input.name.clone(),
            serialize: true,
            input: Some(input),
        });
        if seed {
            layout.push(WidgetSpec {
                name: CONTROL_AFTER_GENERATE.to_string(),
                serialize: false,
                input: None,
            });
        }
    }
    layout
}

/// Pairs each widget of `def` with the node's stored value (null when absent).
pub fn bind_widgets(node: &Node, def: &OperationDef, registry: &OperationRegistry) -> Vec<Widget> {
    let values = node.widgets_values.as_deref().unwrap_or(&[]);
    widget_layout(def, registry)
        .into_iter()
        .enumerate()
        .map(|(index, spec)| Widget {
            name: spec.name,
            value: values.get(index).cloned().unwrap_or(Value::Null),
            serialize: spec.serialize,
        })
        .collect()
}

/// Stores `value` in the named widget. Returns false when the node has no such widget.
pub fn set_widget_value(
    node: &mut Node,
    def: &OperationDef,
    registry: &OperationRegistry,
    name: &str,
    value: Value,
) -> bool {
    let Some(index) = widget_layout(def, registry)
        .iter()
        .position(|spec| spec.name == name)
    else {
        return false;
    };
    let values = node.widgets_values.get_or_insert_with(Vec::new);
    if values.len() <= index {
        values.resize(index + 1, Value::Null);
    }
    values[index] = value;
    true
}

/// What happens to a seed after a prompt using it was queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SeedControl {
    #[default]
    Fixed,
    Increment,
    Decrement,
    Randomize,
}

impl SeedControl {
    /// Reads a stored control value. Older documents store a boolean.
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Bool(true) => SeedControl::Randomize,
            Value::String(s) => match s.as_str() {
                "increment" => SeedControl::Increment,
                "decrement" => SeedControl::Decrement,
                "randomize" => SeedControl::Randomize,
                _ => SeedControl::Fixed,
            },
            _ => SeedControl::Fixed,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SeedControl::Fixed => "fixed",
            SeedControl::Increment => "increment",
            SeedControl::Decrement => "decrement",
            SeedControl::Randomize => "randomize",
        }
    }

    pub fn apply<R: Rng + ?Sized>(&self, current: i64, min: i64, max: i64, rng: &mut R) -> i64 {
        let max = max.max(min);
        match self {
            SeedControl::Fixed => current,
            SeedControl::Increment => current.saturating_add(1).min(max),
            SeedControl::Decrement => current.saturating_sub(1).max(min),
            SeedControl::Randomize => rng.random_range(min..=max),
        }
    }
}

/// Applies every `control_after_generate` widget of the node to the seed widget
/// it follows. Returns whether any value changed.
pub fn advance_seed_controls<R: Rng + ?Sized>(
    node: &mut Node,
    def: &OperationDef,
    registry: &OperationRegistry,
    rng: &mut R,
) -> bool {
    let layout = widget_layout(def, registry);
    let Some(values) = node.widgets_values.as_mut() else {
        return false;
    };
    let mut changed = false;
    for (index, spec) in layout.iter().enumerate().skip(1) {
        if spec.name != CONTROL_AFTER_GENERATE {
            continue;
        }
        let seed_index = index - 1;
        let (Some(control), Some(current)) = (values.get(index), values.get(seed_index)) else {
            continue;
        };
        let control = SeedControl::from_value(control);
        let Some(current) = current.as_i64() else {
            continue;
        };
        let input = layout[seed_index].input.as_ref();
        let min = input.and_then(|i| i.option_i64("min")).unwrap_or(0);
        let max = input
            .and_then(|i| i.option_i64("max"))
            .unwrap_or(MAX_RANDOM_SEED)
            .min(MAX_RANDOM_SEED);
        let next = control.apply(current, min, max, rng);
        if next != current {
            values[seed_index] = Value::from(next);
            changed = true;
        }
    }
    changed
}
