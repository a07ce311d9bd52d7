//! Graph compiler, runtime and control surface for the cadena filter-chain
//! engine.
//!
//! A filter chain sits between a capture stream and a playback stream and
//! runs an arbitrary dataflow graph of filters over each block of samples.
//! This crate turns a declarative description of that graph — nodes, links,
//! exposed ports — into an executable [`Graph`] and drives it:
//!
//! - [`config::GraphSpec`] models the description; both strict JSON and the
//!   relaxed dialect (unquoted keys, `=`, optional commas, `#` comments)
//!   are accepted.
//! - [`compile`](compile::compile) resolves descriptors through the plugin
//!   registry, replicates the graph to match the stream channel counts,
//!   wires every port, and produces a topologically ordered schedule.
//! - [`runtime::run_block`] executes one block on the audio thread with
//!   zero allocations.
//! - [`control`] exposes every control port as a named parameter with
//!   lock-free live updates.
//! - [`FilterChain`] bundles the above behind the facade a host module
//!   embeds.
//!
//! # Example
//!
//! ```
//! use cadena_graph::{ChannelData, FilterChain, StreamConfig};
//! use cadena_registry::PluginRegistry;
//!
//! let description = r#"{
//!     nodes = [
//!         { type = builtin label = bq_lowpass name = lp control = { Freq = 2000.0 } }
//!     ]
//! }"#;
//!
//! let mut registry = PluginRegistry::new(48000);
//! let mut chain = FilterChain::new(description, &mut registry, &StreamConfig {
//!     sample_rate: 48000,
//!     capture_channels: 2,
//!     playback_channels: 2,
//! }).unwrap();
//!
//! let mut left_in = [0.0_f32; 256];
//! let mut right_in = [0.0_f32; 256];
//! let mut left_out = [0.0_f32; 256];
//! let mut right_out = [0.0_f32; 256];
//! let mut input = [ChannelData::new(&mut left_in), ChannelData::new(&mut right_in)];
//! let mut output = [ChannelData::new(&mut left_out), ChannelData::new(&mut right_out)];
//! chain.process_block(Some(&mut input), Some(&mut output));
//! ```

pub mod compile;
pub mod config;
pub mod control;
mod chain;
mod error;
mod graph;
mod relax;
pub mod runtime;

pub use chain::{BlockOutcome, FilterChain};
pub use compile::{compile, StreamConfig};
pub use config::{GraphSpec, LinkSpec, NodeSpec};
pub use control::{ParamInfo, ParamType, ParamValue};
pub use error::GraphError;
pub use graph::{Graph, PortKind};
pub use runtime::{run_block, ChannelData};
