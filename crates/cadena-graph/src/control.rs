//! The control-surface bridge.
//!
//! Exposes one parameter per control input port, named `<node>:<port>` (or
//! just `<port>` for anonymous nodes), in `control_port` order. Writes are
//! plain stores into the ports' resident cells; the audio thread picks them
//! up at its next block.

use cadena_core::HintFlags;
use serde::Serialize;
use serde_json::Value;

use crate::graph::{Graph, PortKind};

/// How a parameter's float cell should be presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    /// `<= 0.0` is false, anything else true.
    Boolean,
    /// Whole-numbered; a zero-width range means the value is fixed.
    Integer,
    Float,
}

/// One discoverable parameter.
#[derive(Debug, Clone)]
pub struct ParamInfo {
    /// Full parameter name (`<node>:<port>`).
    pub name: String,
    pub ty: ParamType,
    /// Default value, with any SAMPLE_RATE hint already applied.
    pub default: f32,
    /// Range lower bound, SAMPLE_RATE hint applied.
    pub min: f32,
    /// Range upper bound, SAMPLE_RATE hint applied.
    pub max: f32,
}

/// A parameter's current value, typed per its hints.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i32),
    Float(f32),
}

impl ParamValue {
    /// The value coerced back to the cell representation.
    pub fn as_f32(&self) -> f32 {
        match self {
            Self::Bool(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            Self::Int(i) => *i as f32,
            Self::Float(f) => *f,
        }
    }
}

/// Describes every exposed parameter, in `control_port` order.
pub fn params(graph: &Graph) -> Vec<ParamInfo> {
    let rate = graph.sample_rate() as f32;
    graph
        .control_ports
        .iter()
        .map(|&id| {
            let node = &graph.nodes[id.node];
            let spec = node.desc.port_spec(node.ports(id.kind)[id.idx].desc_port);
            let (min, max) = if spec.hint.contains(HintFlags::SAMPLE_RATE) {
                (spec.min * rate, spec.max * rate)
            } else {
                (spec.min, spec.max)
            };
            let ty = if spec.hint.contains(HintFlags::BOOLEAN) {
                ParamType::Boolean
            } else if spec.hint.contains(HintFlags::INTEGER) {
                ParamType::Integer
            } else {
                ParamType::Float
            };
            ParamInfo {
                name: graph.control_name(id),
                ty,
                default: node.desc.control_default(id.idx),
                min,
                max,
            }
        })
        .collect()
}

/// Sets one parameter by full name.
///
/// `None` resets the port to its default. Names without a `node:` part are
/// resolved against the first node. Unknown names are ignored. Returns 1
/// when the stored value changed, 0 otherwise.
pub fn set(graph: &Graph, name: &str, value: Option<f32>) -> usize {
    match graph.find_port(0, name, PortKind::ControlIn) {
        Some(id) => graph.set_control(id, value) as usize,
        None => 0,
    }
}

/// Reads every parameter's current value, in `control_port` order.
pub fn snapshot(graph: &Graph) -> Vec<(String, ParamValue)> {
    graph
        .control_ports
        .iter()
        .map(|&id| {
            let node = &graph.nodes[id.node];
            let port = &node.ports(id.kind)[id.idx];
            let spec = node.desc.port_spec(port.desc_port);
            let v = port.control.get();
            let value = if spec.hint.contains(HintFlags::BOOLEAN) {
                ParamValue::Bool(v > 0.0)
            } else if spec.hint.contains(HintFlags::INTEGER) {
                ParamValue::Int(v as i32)
            } else {
                ParamValue::Float(v)
            };
            (graph.control_name(id), value)
        })
        .collect()
}

/// The snapshot as a JSON object, in parameter order.
pub fn snapshot_json(graph: &Graph) -> Value {
    let mut map = serde_json::Map::new();
    for (name, value) in snapshot(graph) {
        map.insert(name, serde_json::to_value(value).unwrap_or(Value::Null));
    }
    Value::Object(map)
}

/// Applies an inbound property object via [`set`].
///
/// Numbers and booleans are coerced to the cell representation; any other
/// value type resets the parameter to its default. Returns the number of
/// parameters whose value changed.
pub fn apply(graph: &Graph, props: &Value) -> usize {
    let Some(object) = props.as_object() else {
        return 0;
    };
    let mut changed = 0;
    for (name, value) in object {
        let v = match value {
            Value::Number(n) => n.as_f64().map(|f| f as f32),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        };
        changed += set(graph, name, v);
    }
    changed
}
