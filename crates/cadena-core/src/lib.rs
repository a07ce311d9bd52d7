//! Core contract and DSP primitives for the cadena filter-chain engine.
//!
//! This crate defines the uniform descriptor/instance interface that every
//! filter implementation — builtin or dynamically loaded — presents to the
//! graph engine:
//!
//! - [`FilterDescriptor`] — immutable metadata: the port list with kinds and
//!   hints, plus the instantiate entry point. The descriptor is the vtable;
//!   there is no inheritance hierarchy behind it.
//! - [`Filter`] — one instantiation of a descriptor at a given sample rate,
//!   holding private DSP state. Ports are wired with raw sample pointers so
//!   the same contract spans Rust builtins and C-ABI plugins.
//! - [`FilterLibrary`] — one loaded plugin object, dispensing descriptors
//!   by label.
//!
//! It also carries the pieces the contract leans on: the process-wide
//! [`silence`]/[`discard`] scratch buffers that keep unbound ports pointing
//! at valid memory, the single-writer [`ControlCell`] used for live
//! parameter updates, and the DSP building blocks ([`Biquad`],
//! [`RingDelay`]) used by the builtin filter set.

mod biquad;
mod control;
mod delay;
mod descriptor;
mod error;
mod scratch;

pub use biquad::{Biquad, BiquadType, Coefficients};
pub use control::ControlCell;
pub use delay::RingDelay;
pub use descriptor::{
    DescriptorFlags, Filter, FilterDescriptor, FilterLibrary, HintFlags, PortFlags, PortSpec,
};
pub use error::FilterError;
pub use scratch::{discard, silence, MAX_BLOCK, MAX_INSTANCES};
