//! Typed model of the graph description.
//!
//! The description names the nodes to build, the links between their audio
//! ports, and which ports the graph exposes as stream channels:
//!
//! ```text
//! {
//!     nodes = [
//!         { type = builtin label = mixer name = mix control = { "Gain 1" = 0.5 } }
//!     ]
//!     links   = [ { output = "eq:Out" input = "mix:In 1" } ]
//!     inputs  = [ "mix:In 1" "mix:In 2" ]
//!     outputs = [ "mix:Out" null ]
//! }
//! ```
//!
//! Both the relaxed dialect above and strict JSON are accepted; see
//! [`relax`](crate::relax). Unknown keys are ignored so descriptions can
//! carry host-specific annotations.

use serde::Deserialize;

use crate::error::GraphError;
use crate::relax;

/// A whole graph description.
#[derive(Debug, Clone, Deserialize)]
pub struct GraphSpec {
    /// The processing nodes, in declaration order. Order matters: the first
    /// node is the default input side, the last the default output side.
    pub nodes: Vec<NodeSpec>,
    /// Audio links between node ports.
    #[serde(default)]
    pub links: Vec<LinkSpec>,
    /// Externally exposed input ports; `null` drops that channel. When
    /// absent, all audio inputs of the first node are exposed.
    #[serde(default)]
    pub inputs: Option<Vec<Option<String>>>,
    /// Externally exposed output ports; `null` silences that channel. When
    /// absent, all audio outputs of the last node are exposed.
    #[serde(default)]
    pub outputs: Option<Vec<Option<String>>>,
}

/// One node of the graph.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeSpec {
    /// Plugin format tag: `builtin`, `ladspa` or `lv2`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Name used to refer to this node from links, exposures and controls.
    #[serde(default)]
    pub name: String,
    /// Format-specific plugin identifier; forced to `builtin` for builtins.
    #[serde(default)]
    pub plugin: Option<String>,
    /// Filter label inside the plugin.
    pub label: String,
    /// Opaque configuration passed through to the filter.
    #[serde(default)]
    pub config: Option<serde_json::Value>,
    /// Initial control values by port name or index.
    #[serde(default)]
    pub control: Option<serde_json::Map<String, serde_json::Value>>,
}

/// One directed audio connection.
#[derive(Debug, Clone, Deserialize)]
pub struct LinkSpec {
    /// Source: an audio output port reference.
    pub output: String,
    /// Destination: an audio input port reference.
    pub input: String,
}

impl GraphSpec {
    /// Parses a description in the relaxed dialect or strict JSON.
    pub fn parse(text: &str) -> Result<Self, GraphError> {
        let strict = relax::normalize(text)?;
        serde_json::from_str(&strict).map_err(|e| GraphError::Description(e.to_string()))
    }
}
