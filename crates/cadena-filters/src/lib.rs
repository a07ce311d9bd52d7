//! Builtin filter set for the cadena filter-chain engine.
//!
//! This crate implements the filters behind the `builtin` plugin namespace
//! against the same descriptor contract as dynamically loaded plugins, so
//! the graph compiler treats them uniformly:
//!
//! | Label | Filter |
//! |---|---|
//! | `mixer` | up to 8 gain-weighted inputs summed to one output |
//! | `copy` | identity |
//! | `bq_lowpass` … `bq_allpass` | the eight RBJ biquad shapes |
//! | `convolver` | partitioned FFT convolution |
//! | `delay` | ring-buffer delay with a live "Delay (s)" control |
//!
//! [`builtin_library`] returns the [`FilterLibrary`] the plugin registry
//! installs for the `builtin` type tag.

use std::sync::Arc;

use cadena_core::{FilterDescriptor, FilterError, FilterLibrary};

mod biquad;
mod convolver;
mod copy;
mod delay;
mod mixer;
mod port;

pub(crate) use port::PortPtr;

/// The `builtin` plugin namespace.
///
/// Descriptor construction is cheap; the registry caches the result per
/// label, so no caching happens here.
pub struct BuiltinLibrary;

impl FilterLibrary for BuiltinLibrary {
    fn make_descriptor(&self, label: &str) -> Result<Arc<dyn FilterDescriptor>, FilterError> {
        match label {
            "mixer" => Ok(Arc::new(mixer::MixerDescriptor::new())),
            "copy" => Ok(Arc::new(copy::CopyDescriptor::new())),
            "convolver" => Ok(Arc::new(convolver::ConvolverDescriptor::new())),
            "delay" => Ok(Arc::new(delay::DelayDescriptor::new())),
            _ => biquad::descriptor_for_label(label)
                .ok_or_else(|| FilterError::UnknownLabel(label.to_owned())),
        }
    }
}

/// Creates the builtin filter library.
pub fn builtin_library() -> Arc<dyn FilterLibrary> {
    Arc::new(BuiltinLibrary)
}
