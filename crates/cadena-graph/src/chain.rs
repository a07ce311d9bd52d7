//! The filter-chain facade.
//!
//! [`FilterChain`] ties one compiled graph to the pair of streams the host
//! provides: it compiles a description against the streams' rate and
//! channel counts, runs blocks as the capture side delivers them, resets
//! the graph when the streams pause, and exposes the control surface.
//!
//! The stream transport itself lives with the host; the chain only sees
//! dequeued buffers as [`ChannelData`] and reports a skipped block when
//! either side has none to offer.

use serde_json::Value;
use tracing::debug;

use cadena_registry::PluginRegistry;

use crate::compile::{compile, StreamConfig};
use crate::config::GraphSpec;
use crate::control::{self, ParamInfo, ParamValue};
use crate::error::GraphError;
use crate::graph::Graph;
use crate::runtime::{run_block, ChannelData};

/// What one runtime invocation did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockOutcome {
    /// A block of this many frames was produced.
    Processed(usize),
    /// A stream buffer was unavailable; nothing ran, no state changed.
    Skipped,
}

/// A compiled graph bound to a capture/playback stream pair.
pub struct FilterChain {
    graph: Graph,
}

impl std::fmt::Debug for FilterChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterChain").finish_non_exhaustive()
    }
}

impl FilterChain {
    /// Parses `description` and compiles it against `stream`.
    pub fn new(
        description: &str,
        registry: &mut PluginRegistry,
        stream: &StreamConfig,
    ) -> Result<Self, GraphError> {
        let spec = GraphSpec::parse(description)?;
        Self::from_spec(&spec, registry, stream)
    }

    /// Compiles an already-parsed description.
    pub fn from_spec(
        spec: &GraphSpec,
        registry: &mut PluginRegistry,
        stream: &StreamConfig,
    ) -> Result<Self, GraphError> {
        Ok(Self {
            graph: compile(spec, registry, stream)?,
        })
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Channels the capture stream should carry.
    pub fn capture_channels(&self) -> usize {
        self.graph.channels_in()
    }

    /// Channels the playback stream should carry.
    pub fn playback_channels(&self) -> usize {
        self.graph.channels_out()
    }

    /// Runs one block, or skips it when a stream side came up empty.
    pub fn process_block(
        &mut self,
        input: Option<&mut [ChannelData]>,
        output: Option<&mut [ChannelData]>,
    ) -> BlockOutcome {
        match (input, output) {
            (Some(input), Some(output)) => {
                BlockOutcome::Processed(run_block(&mut self.graph, input, output))
            }
            _ => {
                debug!("out of stream buffers, skipping block");
                BlockOutcome::Skipped
            }
        }
    }

    /// Deactivates and re-activates every instance.
    ///
    /// Call while the streams are paused; pending filter state (delay
    /// lines, convolution tails) is dropped.
    pub fn reset(&mut self) {
        self.graph.reset();
    }

    /// The discoverable parameter list.
    pub fn params(&self) -> Vec<ParamInfo> {
        control::params(&self.graph)
    }

    /// Sets one parameter; `None` restores its default.
    pub fn set_param(&self, name: &str, value: Option<f32>) -> usize {
        control::set(&self.graph, name, value)
    }

    /// Current values of every parameter.
    pub fn snapshot(&self) -> Vec<(String, ParamValue)> {
        control::snapshot(&self.graph)
    }

    /// Applies an inbound property object.
    ///
    /// Returns the fresh snapshot when anything changed, so the host can
    /// push the update back to stream observers.
    pub fn apply_params(&self, props: &Value) -> Option<Value> {
        if control::apply(&self.graph, props) > 0 {
            Some(control::snapshot_json(&self.graph))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn chain(description: &str, capture: u32, playback: u32) -> FilterChain {
        let mut registry = PluginRegistry::new(48000);
        FilterChain::new(
            description,
            &mut registry,
            &StreamConfig {
                sample_rate: 48000,
                capture_channels: capture,
                playback_channels: playback,
            },
        )
        .unwrap()
    }

    #[test]
    fn missing_buffers_skip_the_block() {
        let mut chain = chain(r#"{ nodes = [ { type = builtin label = copy } ] }"#, 1, 1);
        let mut out_buf = [0.0_f32; 4];
        let mut output = [ChannelData::new(&mut out_buf)];
        assert_eq!(chain.process_block(None, Some(&mut output)), BlockOutcome::Skipped);
        let mut in_buf = [0.0_f32; 4];
        let mut input = [ChannelData::new(&mut in_buf)];
        assert_eq!(chain.process_block(Some(&mut input), None), BlockOutcome::Skipped);
    }

    #[test]
    fn apply_params_returns_snapshot_only_on_change() {
        let chain = chain(
            r#"{ nodes = [ { type = builtin label = bq_peaking name = eq } ] }"#,
            1,
            1,
        );
        let snap = chain.apply_params(&json!({ "eq:Freq": 1000.0 })).unwrap();
        assert_eq!(snap["eq:Freq"], json!(1000.0));
        // Unchanged reapply: nothing to push back.
        assert!(chain.apply_params(&json!({ "eq:Freq": 1000.0 })).is_none());
    }

    #[test]
    fn reset_clears_filter_state() {
        let mut chain = chain(
            r#"{
                nodes = [ {
                    type = builtin label = delay name = d
                    config = { "max-delay" = 1.0 }
                    control = { "Delay (s)" = 0.25 }
                } ]
            }"#,
            1,
            1,
        );
        let mut in_buf = [1.0_f32; 8];
        let mut out_buf = [0.0_f32; 8];
        let mut input = [ChannelData::new(&mut in_buf)];
        let mut output = [ChannelData::new(&mut out_buf)];
        chain.process_block(Some(&mut input), Some(&mut output));

        chain.reset();
        // After a reset the delay history is silence again.
        let mut in2 = [0.0_f32; 8];
        let mut out2 = [5.0_f32; 8];
        let mut input = [ChannelData::new(&mut in2)];
        let mut output = [ChannelData::new(&mut out2)];
        chain.process_block(Some(&mut input), Some(&mut output));
        assert_eq!(output[0].samples(), &[0.0; 8]);
    }
}
