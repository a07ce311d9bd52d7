//! The uniform filter contract.
//!
//! A [`FilterLibrary`] is one loaded plugin object (a shared library, or the
//! builtin namespace). It dispenses [`FilterDescriptor`]s by label. A
//! descriptor lists its ports and instantiates [`Filter`]s — one per graph
//! replica — which are wired with raw sample pointers and then driven once
//! per audio block.
//!
//! Ports are identified by their index in [`FilterDescriptor::ports`]. The
//! graph engine partitions them by kind (audio/control × input/output) and
//! never interprets a filter's samples itself.

use std::sync::Arc;

use crate::error::FilterError;

/// Direction and signal class of a port.
///
/// Exactly one of `INPUT`/`OUTPUT` and one of `AUDIO`/`CONTROL` must be set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortFlags(u8);

impl PortFlags {
    /// Port consumes data.
    pub const INPUT: Self = Self(1 << 0);
    /// Port produces data.
    pub const OUTPUT: Self = Self(1 << 1);
    /// Port carries one sample per frame.
    pub const AUDIO: Self = Self(1 << 2);
    /// Port carries a single scalar, updated out-of-band.
    pub const CONTROL: Self = Self(1 << 3);

    /// Returns `true` if all bits in `other` are set in `self`.
    #[inline]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns the union of two flag sets.
    #[inline]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    #[inline]
    pub const fn is_input(self) -> bool {
        self.contains(Self::INPUT)
    }

    #[inline]
    pub const fn is_output(self) -> bool {
        self.contains(Self::OUTPUT)
    }

    #[inline]
    pub const fn is_audio(self) -> bool {
        self.contains(Self::AUDIO)
    }

    #[inline]
    pub const fn is_control(self) -> bool {
        self.contains(Self::CONTROL)
    }
}

/// Interpretation hints attached to a control port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HintFlags(u8);

impl HintFlags {
    /// No hints.
    pub const NONE: Self = Self(0);
    /// Value is a toggle: `<= 0.0` is off, anything else is on.
    pub const BOOLEAN: Self = Self(1 << 0);
    /// Value is an integer count or selector.
    pub const INTEGER: Self = Self(1 << 1);
    /// Declared default/min/max are fractions of the sample rate and must be
    /// scaled by the runtime rate before use.
    pub const SAMPLE_RATE: Self = Self(1 << 2);

    /// Returns `true` if all bits in `other` are set in `self`.
    #[inline]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns the union of two flag sets.
    #[inline]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }
}

impl Default for HintFlags {
    fn default() -> Self {
        Self::NONE
    }
}

/// Capability flags of a whole descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorFlags(u8);

impl DescriptorFlags {
    /// No flags.
    pub const NONE: Self = Self(0);
    /// The filter tolerates null port pointers and skips unconnected ports
    /// itself. Such filters are pre-wired with null instead of the shared
    /// scratch buffers.
    pub const SUPPORTS_NULL_DATA: Self = Self(1 << 0);

    /// Returns `true` if all bits in `other` are set in `self`.
    #[inline]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

/// One port declaration in a descriptor.
#[derive(Debug, Clone)]
pub struct PortSpec {
    /// Port name, unique within its kind (e.g. `"In 1"`, `"Freq"`).
    pub name: String,
    /// Direction and signal class.
    pub flags: PortFlags,
    /// Interpretation hints (control ports).
    pub hint: HintFlags,
    /// Default value (control input ports).
    pub default: f32,
    /// Lower bound of the useful range.
    pub min: f32,
    /// Upper bound of the useful range.
    pub max: f32,
}

impl PortSpec {
    /// An audio input port.
    pub fn audio_in(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            flags: PortFlags::INPUT.union(PortFlags::AUDIO),
            hint: HintFlags::NONE,
            default: 0.0,
            min: 0.0,
            max: 0.0,
        }
    }

    /// An audio output port.
    pub fn audio_out(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            flags: PortFlags::OUTPUT.union(PortFlags::AUDIO),
            hint: HintFlags::NONE,
            default: 0.0,
            min: 0.0,
            max: 0.0,
        }
    }

    /// A control input port with its default and range.
    pub fn control_in(name: &str, default: f32, min: f32, max: f32) -> Self {
        Self {
            name: name.to_owned(),
            flags: PortFlags::INPUT.union(PortFlags::CONTROL),
            hint: HintFlags::NONE,
            default,
            min,
            max,
        }
    }

    /// A control output (notify) port.
    pub fn control_out(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            flags: PortFlags::OUTPUT.union(PortFlags::CONTROL),
            hint: HintFlags::NONE,
            default: 0.0,
            min: 0.0,
            max: 0.0,
        }
    }

    /// Attaches interpretation hints. Builder style.
    pub fn with_hint(mut self, hint: HintFlags) -> Self {
        self.hint = hint;
        self
    }
}

/// One instantiation of a filter descriptor.
///
/// Instances hold private DSP state. They are created on the control thread,
/// wired with [`connect_port`](Filter::connect_port), activated, and then
/// driven by [`run`](Filter::run) on the audio thread. `run` must not
/// allocate, block, or otherwise leave constant-time-per-sample territory.
pub trait Filter: Send {
    /// Stores `data` as the sample buffer (audio ports) or scalar cell
    /// (control ports) behind descriptor port index `port`.
    ///
    /// # Safety
    ///
    /// `data` must be non-null (unless the descriptor advertises
    /// [`DescriptorFlags::SUPPORTS_NULL_DATA`]), well-aligned for `f32`, and
    /// valid for the full block length passed to every subsequent
    /// [`run`](Self::run) call, until replaced by another `connect_port`
    /// call for the same port or the instance is dropped. Audio input
    /// buffers must be valid for reads, audio output buffers for writes,
    /// control cells for reads (inputs) or writes (outputs).
    unsafe fn connect_port(&mut self, port: u32, data: *mut f32);

    /// Prepares the instance for processing. Called before the first `run`
    /// and again after [`deactivate`](Self::deactivate) on a graph reset.
    fn activate(&mut self) {}

    /// Suspends processing; history and tails should be dropped so a later
    /// [`activate`](Self::activate) starts clean.
    fn deactivate(&mut self) {}

    /// Processes `samples` frames using the currently connected ports.
    fn run(&mut self, samples: usize);
}

/// Immutable filter metadata plus the instantiate entry point.
///
/// The descriptor is shared (`Arc`) between the registry cache and every
/// node that uses it; instances hold onto it for the lifetime of the graph.
pub trait FilterDescriptor: Send + Sync {
    /// The label this descriptor was created for.
    fn label(&self) -> &str;

    /// Capability flags.
    fn flags(&self) -> DescriptorFlags {
        DescriptorFlags::NONE
    }

    /// The full port list. Port indices used by
    /// [`Filter::connect_port`] index into this slice.
    fn ports(&self) -> &[PortSpec];

    /// Creates one instance at `sample_rate`.
    ///
    /// `instance` is the replica index within the graph (0-based); `config`
    /// is the node's raw configuration text, if the graph description
    /// carried one.
    fn instantiate(
        &self,
        sample_rate: u32,
        instance: u32,
        config: Option<&str>,
    ) -> Result<Box<dyn Filter>, FilterError>;
}

/// One loaded plugin object.
///
/// A library may contain several filters; [`make_descriptor`]
/// (`FilterLibrary::make_descriptor`) resolves one by label. Libraries are
/// expensive to open and are shared between descriptors by the registry.
pub trait FilterLibrary: Send + Sync {
    /// Creates the descriptor for `label`.
    fn make_descriptor(&self, label: &str) -> Result<Arc<dyn FilterDescriptor>, FilterError>;
}
