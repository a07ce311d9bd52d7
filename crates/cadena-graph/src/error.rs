//! Errors from graph compilation.

use cadena_registry::LoadError;
use thiserror::Error;

/// Failure to compile a graph description.
///
/// Everything here is a control-thread error; the audio path never reports
/// errors synchronously. Any failure rolls the partially built graph back —
/// instances already created are released before the error is returned.
#[derive(Debug, Error)]
pub enum GraphError {
    /// The description itself is malformed: bad syntax, a missing required
    /// field, or an unknown type tag.
    #[error("invalid graph description: {0}")]
    Description(String),

    /// A plugin or label could not be resolved.
    #[error(transparent)]
    Load(#[from] LoadError),

    /// A port reference did not resolve against any node.
    #[error("unknown port '{0}'")]
    UnknownPort(String),

    /// The referenced port is already linked or already exposed.
    #[error("port '{0}' is already in use, use a mixer or copy filter")]
    PortInUse(String),

    /// The graph exposes no ports on one side.
    #[error("graph has no {0} ports")]
    NoExternalPorts(&'static str),

    /// The stream channel counts do not divide evenly over the graph's
    /// external ports.
    #[error(
        "invalid channels: the capture stream has {capture} channels and the filter has \
         {inputs} inputs, the playback stream has {playback} channels and the filter has \
         {outputs} outputs; capture {capture} / input {inputs} != playback {playback} / \
         output {outputs}"
    )]
    ChannelMismatch {
        /// Capture stream channel count.
        capture: u32,
        /// Graph external input count.
        inputs: u32,
        /// Playback stream channel count.
        playback: u32,
        /// Graph external output count.
        outputs: u32,
    },

    /// The replication factor exceeds the engine's instance limit.
    #[error("too many instances: {0} exceeds the limit of {1}")]
    TooManyInstances(u32, u32),

    /// The links form a cycle.
    #[error("cycle detected in filter graph")]
    Cycle,

    /// A filter refused to instantiate.
    #[error("cannot instantiate '{label}': {reason}")]
    Instantiate {
        /// Label of the failing filter.
        label: String,
        /// The filter's own failure message.
        reason: String,
    },
}
