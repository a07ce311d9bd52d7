//! Errors from plugin loading and descriptor resolution.

use thiserror::Error;

/// Failure to resolve a plugin or one of its descriptors.
#[derive(Debug, Error)]
pub enum LoadError {
    /// The type tag names a format this build cannot load.
    #[error("unsupported plugin type: {kind}")]
    UnsupportedType {
        /// The offending type tag.
        kind: String,
    },

    /// The plugin file could not be located.
    #[error("plugin '{path}' not found")]
    NotFound {
        /// The path that was searched for.
        path: String,
    },

    /// The plugin was found but could not be opened or resolved.
    #[error("failed to load '{path}': {reason}")]
    LoadFailed {
        /// Path of the plugin.
        path: String,
        /// What went wrong while opening it.
        reason: String,
    },

    /// The plugin has no filter with the requested label.
    #[error("plugin '{path}' has no label '{label}'")]
    LabelNotFound {
        /// Path of the plugin.
        path: String,
        /// The missing label.
        label: String,
    },

    /// The filter declares neither audio inputs nor audio outputs.
    #[error("filter '{label}' has no audio ports")]
    NoAudioPorts {
        /// Label of the portless filter.
        label: String,
    },
}
