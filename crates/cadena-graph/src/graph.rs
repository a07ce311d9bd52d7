//! The executable graph: nodes, ports, links, schedule and mux tables.
//!
//! Everything lives in arenas with stable indices: the graph owns the node
//! and link arenas, ports hold their owning node's index, and links are
//! referenced from both endpoint ports by arena index. Nothing here is
//! resized after compilation, so the addresses of control cells and
//! intermediate buffers handed to filters stay valid for the graph's
//! lifetime.
//!
//! The audio thread reads the schedule, the mux tables and the control
//! cells; every mutation happens on the control thread, before the graph is
//! published or while the streams are paused.

use std::sync::Arc;

use cadena_core::{ControlCell, Filter};
use cadena_registry::Descriptor;
use tracing::info;

/// The four port classes of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortKind {
    AudioIn,
    AudioOut,
    ControlIn,
    ControlOut,
}

/// Identifies one port: owning node arena index, class, index within class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PortId {
    pub node: usize,
    pub kind: PortKind,
    pub idx: usize,
}

/// One port of a node.
pub(crate) struct Port {
    /// Index of this port in the descriptor's full port list.
    pub desc_port: u32,
    /// Links attached to this port (arena indices).
    pub links: Vec<usize>,
    /// Channel index this port is exposed at, if any.
    pub external: Option<u32>,
    /// Resident scalar for control ports; unused for audio ports.
    pub control: ControlCell,
    /// Per-instance intermediate buffers; audio outputs only, allocated at
    /// schedule time for linked ports.
    pub buffers: Vec<Box<[f32]>>,
}

impl Port {
    pub fn new(desc_port: u32) -> Self {
        Self {
            desc_port,
            links: Vec::new(),
            external: None,
            control: ControlCell::default(),
            buffers: Vec::new(),
        }
    }
}

/// One vertex of the graph.
pub(crate) struct Node {
    pub name: String,
    // Declared before `desc`: instances must drop while the descriptor
    // (and the plugin library behind it) is still alive.
    pub instances: Vec<Box<dyn Filter>>,
    pub desc: Arc<Descriptor>,
    /// Raw config text passed to each instantiation.
    pub config: Option<String>,
    pub audio_in: Vec<Port>,
    pub audio_out: Vec<Port>,
    pub control_in: Vec<Port>,
    pub control_out: Vec<Port>,
    /// Unsatisfied incoming links; drops to zero as upstream nodes schedule.
    pub n_deps: u32,
    pub visited: bool,
}

impl Node {
    pub fn ports(&self, kind: PortKind) -> &[Port] {
        match kind {
            PortKind::AudioIn => &self.audio_in,
            PortKind::AudioOut => &self.audio_out,
            PortKind::ControlIn => &self.control_in,
            PortKind::ControlOut => &self.control_out,
        }
    }

    pub fn ports_mut(&mut self, kind: PortKind) -> &mut Vec<Port> {
        match kind {
            PortKind::AudioIn => &mut self.audio_in,
            PortKind::AudioOut => &mut self.audio_out,
            PortKind::ControlIn => &mut self.control_in,
            PortKind::ControlOut => &mut self.control_out,
        }
    }

    /// The descriptor-level name of a port.
    pub fn port_name(&self, kind: PortKind, idx: usize) -> &str {
        &self.desc.port_spec(self.ports(kind)[idx].desc_port).name
    }
}

/// One directed audio connection between two ports.
pub(crate) struct Link {
    pub output: PortId,
    pub input: PortId,
}

/// One schedule slot: run instance `instance` of node `node`.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ScheduleEntry {
    pub node: usize,
    pub instance: usize,
}

/// One external channel binding: which instance port a stream channel
/// connects to each block.
#[derive(Debug, Clone, Copy)]
pub(crate) struct MuxPort {
    pub node: usize,
    pub instance: usize,
    /// Descriptor port index to connect.
    pub port: u32,
}

/// A compiled, executable filter graph.
///
/// Built by [`compile`](crate::compile::compile); immutable afterwards
/// except for control-cell values and the per-block port wiring the runtime
/// performs.
impl std::fmt::Debug for Graph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Graph").finish_non_exhaustive()
    }
}

pub struct Graph {
    pub(crate) nodes: Vec<Node>,
    pub(crate) links: Vec<Link>,
    pub(crate) schedule: Vec<ScheduleEntry>,
    pub(crate) input_mux: Vec<Option<MuxPort>>,
    pub(crate) output_mux: Vec<Option<MuxPort>>,
    /// Every control input port of every node, in schedule order.
    pub(crate) control_ports: Vec<PortId>,
    pub(crate) n_instances: usize,
    pub(crate) sample_rate: u32,
}

impl Graph {
    /// The replication factor N.
    pub fn replication(&self) -> usize {
        self.n_instances
    }

    /// Number of entries in the execution schedule.
    pub fn schedule_len(&self) -> usize {
        self.schedule.len()
    }

    /// Number of stream channels the graph consumes.
    pub fn channels_in(&self) -> usize {
        self.input_mux.len()
    }

    /// Number of stream channels the graph produces.
    pub fn channels_out(&self) -> usize {
        self.output_mux.len()
    }

    /// Number of exposed control ports.
    pub fn control_count(&self) -> usize {
        self.control_ports.len()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Deactivates and re-activates every instance.
    ///
    /// Only valid while the streams are paused: the audio thread must not be
    /// mid-block.
    pub fn reset(&mut self) {
        for node in &mut self.nodes {
            for instance in &mut node.instances {
                instance.deactivate();
                instance.activate();
            }
        }
    }

    pub(crate) fn find_node(&self, name: &str) -> Option<usize> {
        self.nodes.iter().position(|n| n.name == name)
    }

    /// Resolves a port reference of the given class.
    ///
    /// Accepted syntax: `node:port`, `node:index`, `port`, `index`. Without
    /// a `:` the port is looked up in `default_node`. A trailing token that
    /// parses as a decimal integer below the class's port count is an
    /// index; anything else matches by port name.
    pub(crate) fn find_port(
        &self,
        default_node: usize,
        reference: &str,
        kind: PortKind,
    ) -> Option<PortId> {
        let (node, port_name) = match reference.split_once(':') {
            Some((node_name, port_name)) => (self.find_node(node_name)?, port_name),
            None => (default_node, reference),
        };
        let ports = self.nodes[node].ports(kind);

        if let Ok(idx) = port_name.parse::<u32>() {
            if (idx as usize) < ports.len() {
                return Some(PortId {
                    node,
                    kind,
                    idx: idx as usize,
                });
            }
        }
        let desc = &self.nodes[node].desc;
        ports
            .iter()
            .position(|p| desc.port_spec(p.desc_port).name == port_name)
            .map(|idx| PortId { node, kind, idx })
    }

    /// The full `node:port` name of a control port (bare port name for
    /// anonymous nodes).
    pub(crate) fn control_name(&self, id: PortId) -> String {
        let node = &self.nodes[id.node];
        let port_name = node.port_name(id.kind, id.idx);
        if node.name.is_empty() {
            port_name.to_owned()
        } else {
            format!("{}:{}", node.name, port_name)
        }
    }

    /// Writes a control input port's value, or its default when `value` is
    /// `None`. Returns `true` if the stored value changed.
    pub(crate) fn set_control(&self, id: PortId, value: Option<f32>) -> bool {
        debug_assert_eq!(id.kind, PortKind::ControlIn);
        let node = &self.nodes[id.node];
        let port = &node.ports(id.kind)[id.idx];
        let new = value.unwrap_or_else(|| node.desc.control_default(id.idx));
        let old = port.control.get();
        port.control.set(new);
        info!(
            port = id.idx,
            name = %self.control_name(id),
            from = old,
            to = new,
            "control update"
        );
        old != new
    }
}
