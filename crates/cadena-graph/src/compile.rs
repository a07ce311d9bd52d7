//! The graph compiler: description in, executable graph out.
//!
//! Compilation runs in five phases:
//!
//! 1. **Materialize** every node: resolve its descriptor through the plugin
//!    registry, build its four port arrays, apply control overrides.
//! 2. **Resolve links** between audio ports; an audio input takes at most
//!    one link.
//! 3. **Replicate**: derive the replication factor N from the stream
//!    channel counts, create N instances per node, pre-wire every port
//!    (scratch buffers for audio, resident cells for controls), activate.
//! 4. **Expose** external ports by building the input and output mux
//!    tables.
//! 5. **Schedule**: topological order by repeated zero-in-degree selection,
//!    wiring intermediate buffers as nodes are emitted.
//!
//! Failure at any point after instance creation rolls everything back: the
//! partially built graph is dropped, and dropping an instance deactivates
//! and cleans it up. No partial graph is ever published.

use std::ptr;

use cadena_core::{
    discard, silence, DescriptorFlags, Filter, FilterDescriptor, MAX_BLOCK, MAX_INSTANCES,
};
use cadena_registry::{PluginRegistry, PluginType};
use tracing::{debug, info, warn};

use crate::config::{GraphSpec, NodeSpec};
use crate::error::GraphError;
use crate::graph::{Graph, Link, MuxPort, Node, Port, PortId, PortKind, ScheduleEntry};

/// The stream-side description compilation works against.
///
/// A channel count of zero means "derive from the graph": the capture side
/// then gets one channel per external input, the playback side one per
/// external output.
#[derive(Debug, Clone, Copy)]
pub struct StreamConfig {
    pub sample_rate: u32,
    pub capture_channels: u32,
    pub playback_channels: u32,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            capture_channels: 0,
            playback_channels: 0,
        }
    }
}

/// Compiles a graph description into an executable [`Graph`].
pub fn compile(
    spec: &GraphSpec,
    registry: &mut PluginRegistry,
    stream: &StreamConfig,
) -> Result<Graph, GraphError> {
    let mut graph = Graph {
        nodes: Vec::with_capacity(spec.nodes.len()),
        links: Vec::new(),
        schedule: Vec::new(),
        input_mux: Vec::new(),
        output_mux: Vec::new(),
        control_ports: Vec::new(),
        n_instances: 0,
        sample_rate: stream.sample_rate,
    };

    for node_spec in &spec.nodes {
        materialize_node(&mut graph, node_spec, registry)?;
    }
    if graph.nodes.is_empty() {
        return Err(GraphError::Description("graph has no nodes".into()));
    }

    resolve_links(&mut graph, spec)?;
    let n = replicate(&mut graph, spec, stream)?;
    expose_ports(&mut graph, spec, n)?;
    schedule(&mut graph, n)?;

    Ok(graph)
}

/// P1 — resolve the descriptor and build the node's port arrays.
fn materialize_node(
    graph: &mut Graph,
    spec: &NodeSpec,
    registry: &mut PluginRegistry,
) -> Result<(), GraphError> {
    let kind = PluginType::from_tag(&spec.kind)
        .ok_or_else(|| GraphError::Description(format!("unknown filter type '{}'", spec.kind)))?;
    let plugin = match kind {
        PluginType::Builtin => "builtin".to_owned(),
        _ => spec.plugin.clone().ok_or_else(|| {
            GraphError::Description(format!(
                "node '{}' of type {} needs a plugin",
                spec.name,
                kind.as_str()
            ))
        })?,
    };
    info!(kind = kind.as_str(), plugin = %plugin, label = %spec.label, "loading filter");
    let desc = registry.descriptor(kind, &plugin, &spec.label)?;

    let audio_in = desc.audio_in().iter().map(|&p| Port::new(p)).collect();
    let audio_out = desc.audio_out().iter().map(|&p| Port::new(p)).collect();
    let control_in = desc
        .control_in()
        .iter()
        .enumerate()
        .map(|(i, &p)| {
            let port = Port::new(p);
            port.control.set(desc.control_default(i));
            port
        })
        .collect();
    let control_out = desc.control_out().iter().map(|&p| Port::new(p)).collect();

    graph.nodes.push(Node {
        name: spec.name.clone(),
        instances: Vec::new(),
        desc,
        config: spec.config.as_ref().map(|v| v.to_string()),
        audio_in,
        audio_out,
        control_in,
        control_out,
        n_deps: 0,
        visited: false,
    });

    // Control overrides refer to this node unless they carry a `node:` part.
    let this = graph.nodes.len() - 1;
    if let Some(control) = &spec.control {
        for (key, value) in control {
            let Some(v) = value.as_f64() else {
                warn!(control = %key, "control expects a number, ignoring");
                continue;
            };
            match graph.find_port(this, key, PortKind::ControlIn) {
                Some(id) => {
                    graph.set_control(id, Some(v as f32));
                }
                None => warn!(control = %key, node = %spec.name, "unknown control, ignoring"),
            }
        }
    }
    Ok(())
}

/// P2 — connect audio ports; at most one link into any input.
fn resolve_links(graph: &mut Graph, spec: &GraphSpec) -> Result<(), GraphError> {
    let first = 0;
    let last = graph.nodes.len() - 1;

    for link in &spec.links {
        let output = graph
            .find_port(last, &link.output, PortKind::AudioOut)
            .ok_or_else(|| GraphError::UnknownPort(link.output.clone()))?;
        let input = graph
            .find_port(first, &link.input, PortKind::AudioIn)
            .ok_or_else(|| GraphError::UnknownPort(link.input.clone()))?;

        if !graph.nodes[input.node].audio_in[input.idx].links.is_empty() {
            return Err(GraphError::PortInUse(link.input.clone()));
        }

        info!(
            output = %format!("{}:{}", graph.nodes[output.node].name, graph.nodes[output.node].port_name(output.kind, output.idx)),
            input = %format!("{}:{}", graph.nodes[input.node].name, graph.nodes[input.node].port_name(input.kind, input.idx)),
            "linking"
        );

        let id = graph.links.len();
        graph.links.push(Link { output, input });
        graph.nodes[output.node].audio_out[output.idx].links.push(id);
        graph.nodes[input.node].audio_in[input.idx].links.push(id);
        graph.nodes[input.node].n_deps += 1;
    }
    Ok(())
}

/// P3 — derive the replication factor and create the instances.
fn replicate(
    graph: &mut Graph,
    spec: &GraphSpec,
    stream: &StreamConfig,
) -> Result<u32, GraphError> {
    let first = 0;
    let last = graph.nodes.len() - 1;

    let n_in = spec
        .inputs
        .as_ref()
        .map(|v| v.len() as u32)
        .unwrap_or(graph.nodes[first].audio_in.len() as u32);
    let n_out = spec
        .outputs
        .as_ref()
        .map(|v| v.len() as u32)
        .unwrap_or(graph.nodes[last].audio_out.len() as u32);
    if n_in == 0 {
        return Err(GraphError::NoExternalPorts("input"));
    }
    if n_out == 0 {
        return Err(GraphError::NoExternalPorts("output"));
    }

    let capture = if stream.capture_channels == 0 {
        n_in
    } else {
        stream.capture_channels
    };
    let playback = if stream.playback_channels == 0 {
        n_out
    } else {
        stream.playback_channels
    };

    let mut n = capture / n_in;
    if n != playback / n_out {
        return Err(GraphError::ChannelMismatch {
            capture,
            inputs: n_in,
            playback,
            outputs: n_out,
        });
    }
    if n > MAX_INSTANCES as u32 {
        return Err(GraphError::TooManyInstances(n, MAX_INSTANCES as u32));
    }
    if n == 0 {
        warn!(
            capture,
            inputs = n_in,
            playback,
            outputs = n_out,
            "not enough channels to cover the graph, some ports stay unconnected"
        );
        n = 1;
    }
    info!(instances = n, inputs = n_in, outputs = n_out, "replicating graph");
    graph.n_instances = n as usize;

    for node_idx in 0..graph.nodes.len() {
        let desc = graph.nodes[node_idx].desc.clone();
        let raw = desc.raw().clone();
        let config = graph.nodes[node_idx].config.clone();

        // Filters that tolerate null pointers skip their unconnected ports
        // themselves; everything else gets the shared scratch buffers.
        let (sd, dd) = if raw.flags().contains(DescriptorFlags::SUPPORTS_NULL_DATA) {
            (ptr::null_mut(), ptr::null_mut())
        } else {
            (silence(), discard())
        };

        for i in 0..n {
            debug!(label = desc.label(), instance = i, "instantiating");
            let mut instance = raw
                .instantiate(stream.sample_rate, i, config.as_deref())
                .map_err(|e| GraphError::Instantiate {
                    label: desc.label().to_owned(),
                    reason: e.to_string(),
                })?;

            let node = &graph.nodes[node_idx];
            unsafe {
                for port in &node.audio_in {
                    instance.connect_port(port.desc_port, sd);
                }
                for port in &node.audio_out {
                    instance.connect_port(port.desc_port, dd);
                }
                for port in &node.control_in {
                    instance.connect_port(port.desc_port, port.control.as_ptr());
                }
                for port in &node.control_out {
                    instance.connect_port(port.desc_port, port.control.as_ptr());
                }
            }
            instance.activate();
            graph.nodes[node_idx].instances.push(instance);
        }
    }
    Ok(n)
}

/// P4 — build the input and output mux tables.
fn expose_ports(graph: &mut Graph, spec: &GraphSpec, n: u32) -> Result<(), GraphError> {
    let first = 0;
    let last = graph.nodes.len() - 1;

    for i in 0..n as usize {
        match &spec.inputs {
            None => {
                for idx in 0..graph.nodes[first].audio_in.len() {
                    let port = graph.nodes[first].audio_in[idx].desc_port;
                    graph.input_mux.push(Some(MuxPort {
                        node: first,
                        instance: i,
                        port,
                    }));
                }
            }
            Some(refs) => {
                for reference in refs {
                    let channel = graph.input_mux.len() as u32;
                    let entry = match reference {
                        None => None,
                        Some(name) => {
                            Some(bind_external(graph, first, name, PortKind::AudioIn, i, channel)?)
                        }
                    };
                    graph.input_mux.push(entry);
                }
            }
        }
        match &spec.outputs {
            None => {
                for idx in 0..graph.nodes[last].audio_out.len() {
                    let port = graph.nodes[last].audio_out[idx].desc_port;
                    graph.output_mux.push(Some(MuxPort {
                        node: last,
                        instance: i,
                        port,
                    }));
                }
            }
            Some(refs) => {
                for reference in refs {
                    let channel = graph.output_mux.len() as u32;
                    let entry = match reference {
                        None => None,
                        Some(name) => {
                            Some(bind_external(graph, last, name, PortKind::AudioOut, i, channel)?)
                        }
                    };
                    graph.output_mux.push(entry);
                }
            }
        }
    }
    Ok(())
}

/// Resolves one explicit external port reference and claims the port.
fn bind_external(
    graph: &mut Graph,
    default_node: usize,
    name: &str,
    kind: PortKind,
    instance: usize,
    channel: u32,
) -> Result<MuxPort, GraphError> {
    let id = graph
        .find_port(default_node, name, kind)
        .ok_or_else(|| GraphError::UnknownPort(name.to_owned()))?;
    let port = &graph.nodes[id.node].ports(kind)[id.idx];
    // The conflict checks only make sense once, on the first replica.
    if instance == 0 {
        if port.external.is_some() || !port.links.is_empty() {
            return Err(GraphError::PortInUse(name.to_owned()));
        }
        graph.nodes[id.node].ports_mut(kind)[id.idx].external = Some(channel);
    }
    let port = &graph.nodes[id.node].ports(kind)[id.idx];
    debug!(name, channel, "exposing port");
    Ok(MuxPort {
        node: id.node,
        instance,
        port: port.desc_port,
    })
}

/// P5 — topological scheduling and intermediate-buffer wiring.
fn schedule(graph: &mut Graph, n: u32) -> Result<(), GraphError> {
    let n = n as usize;
    loop {
        // Kahn's algorithm; the insertion-order scan makes ties
        // deterministic.
        let Some(node_idx) = graph
            .nodes
            .iter()
            .position(|node| node.n_deps == 0 && !node.visited)
        else {
            break;
        };
        graph.nodes[node_idx].visited = true;

        // Point this node's inputs at the upstream buffers. Upstream nodes
        // are already scheduled, so their buffers exist.
        for port_idx in 0..graph.nodes[node_idx].audio_in.len() {
            let desc_port = graph.nodes[node_idx].audio_in[port_idx].desc_port;
            let link_ids = graph.nodes[node_idx].audio_in[port_idx].links.clone();
            for link in link_ids {
                let peer = graph.links[link].output;
                let ptrs: Vec<*mut f32> = graph.nodes[peer.node].audio_out[peer.idx]
                    .buffers
                    .iter()
                    .map(|b| b.as_ptr() as *mut f32)
                    .collect();
                for (i, &ptr) in ptrs.iter().enumerate() {
                    unsafe {
                        graph.nodes[node_idx].instances[i].connect_port(desc_port, ptr);
                    }
                }
            }
        }

        for i in 0..n {
            graph.schedule.push(ScheduleEntry {
                node: node_idx,
                instance: i,
            });
        }

        // Allocate and wire this node's outgoing buffers, then release the
        // downstream in-degrees (once per link).
        for port_idx in 0..graph.nodes[node_idx].audio_out.len() {
            if graph.nodes[node_idx].audio_out[port_idx].links.is_empty() {
                continue;
            }
            if graph.nodes[node_idx].audio_out[port_idx].buffers.is_empty() {
                graph.nodes[node_idx].audio_out[port_idx].buffers = (0..n)
                    .map(|_| vec![0.0_f32; MAX_BLOCK].into_boxed_slice())
                    .collect();
            }
            let desc_port = graph.nodes[node_idx].audio_out[port_idx].desc_port;
            let ptrs: Vec<*mut f32> = graph.nodes[node_idx].audio_out[port_idx]
                .buffers
                .iter()
                .map(|b| b.as_ptr() as *mut f32)
                .collect();
            for (i, &ptr) in ptrs.iter().enumerate() {
                unsafe {
                    graph.nodes[node_idx].instances[i].connect_port(desc_port, ptr);
                }
            }
            let link_ids = graph.nodes[node_idx].audio_out[port_idx].links.clone();
            for link in link_ids {
                let downstream = graph.links[link].input.node;
                graph.nodes[downstream].n_deps -= 1;
            }
        }

        for idx in 0..graph.nodes[node_idx].control_in.len() {
            graph.control_ports.push(PortId {
                node: node_idx,
                kind: PortKind::ControlIn,
                idx,
            });
        }
    }

    if graph.nodes.iter().any(|node| !node.visited) {
        return Err(GraphError::Cycle);
    }
    Ok(())
}
