//! Plugin registry for the cadena filter-chain engine.
//!
//! The registry caches loaded plugin libraries by `(type, path)` and
//! dispenses [`Descriptor`]s by label. Libraries are expensive to open —
//! LADSPA hosts dlopen shared objects — so descriptors from the same library
//! share one cached handle, and a descriptor requested twice is served from
//! the plugin's descriptor list.
//!
//! All registry operations run on the control thread; sharing is plain
//! [`Arc`] reference counting. The cache itself holds strong references so
//! cached plugins survive graph teardown; [`evict_unused`]
//! (`PluginRegistry::evict_unused`) drops entries nothing else refers to.

use std::sync::Arc;

use cadena_core::{FilterDescriptor, FilterError, FilterLibrary, HintFlags, PortSpec};
use tracing::{debug, info};

mod error;
pub mod ladspa;

pub use error::LoadError;

/// The plugin formats the engine can resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginType {
    /// The built-in filter namespace.
    Builtin,
    /// LADSPA shared objects.
    Ladspa,
    /// LV2 bundles. Recognized, but this build carries no LV2 host.
    Lv2,
}

impl PluginType {
    /// Parses the graph description's `type` tag.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "builtin" => Some(Self::Builtin),
            "ladspa" => Some(Self::Ladspa),
            "lv2" => Some(Self::Lv2),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Builtin => "builtin",
            Self::Ladspa => "ladspa",
            Self::Lv2 => "lv2",
        }
    }
}

/// A descriptor with its ports partitioned for the graph engine.
///
/// Wraps the raw [`FilterDescriptor`] with the four port-index partitions
/// and the resolved control defaults (SAMPLE_RATE hints applied). Holding a
/// `Descriptor` keeps its plugin library loaded.
impl std::fmt::Debug for Descriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Descriptor").field("label", &self.label).finish_non_exhaustive()
    }
}

pub struct Descriptor {
    label: String,
    desc: Arc<dyn FilterDescriptor>,
    audio_in: Vec<u32>,
    audio_out: Vec<u32>,
    control_in: Vec<u32>,
    control_out: Vec<u32>,
    /// Default values parallel to `control_in`.
    defaults: Vec<f32>,
    /// Keeps the shared library behind `desc` loaded.
    _library: Arc<dyn FilterLibrary>,
}

impl Descriptor {
    fn new(
        label: &str,
        desc: Arc<dyn FilterDescriptor>,
        library: Arc<dyn FilterLibrary>,
        sample_rate: u32,
    ) -> Result<Self, LoadError> {
        let mut audio_in = Vec::new();
        let mut audio_out = Vec::new();
        let mut control_in = Vec::new();
        let mut control_out = Vec::new();

        for (p, spec) in desc.ports().iter().enumerate() {
            let p = p as u32;
            if spec.flags.is_audio() {
                if spec.flags.is_input() {
                    debug!(port = p, name = %spec.name, index = audio_in.len(), "audio input");
                    audio_in.push(p);
                } else if spec.flags.is_output() {
                    debug!(port = p, name = %spec.name, index = audio_out.len(), "audio output");
                    audio_out.push(p);
                }
            } else if spec.flags.is_control() {
                if spec.flags.is_input() {
                    debug!(port = p, name = %spec.name, index = control_in.len(), "control input");
                    control_in.push(p);
                } else if spec.flags.is_output() {
                    debug!(port = p, name = %spec.name, index = control_out.len(), "notify output");
                    control_out.push(p);
                }
            }
        }

        if audio_in.is_empty() && audio_out.is_empty() {
            return Err(LoadError::NoAudioPorts {
                label: label.to_owned(),
            });
        }

        let defaults = control_in
            .iter()
            .map(|&p| {
                let spec = &desc.ports()[p as usize];
                let def = if spec.hint.contains(HintFlags::SAMPLE_RATE) {
                    spec.default * sample_rate as f32
                } else {
                    spec.default
                };
                debug!(name = %spec.name, default = def, "control default");
                def
            })
            .collect();

        Ok(Self {
            label: label.to_owned(),
            desc,
            audio_in,
            audio_out,
            control_in,
            control_out,
            defaults,
            _library: library,
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// The underlying descriptor (instantiate entry point and flags).
    pub fn raw(&self) -> &Arc<dyn FilterDescriptor> {
        &self.desc
    }

    /// Descriptor port indices of the audio input ports.
    pub fn audio_in(&self) -> &[u32] {
        &self.audio_in
    }

    /// Descriptor port indices of the audio output ports.
    pub fn audio_out(&self) -> &[u32] {
        &self.audio_out
    }

    /// Descriptor port indices of the control input ports.
    pub fn control_in(&self) -> &[u32] {
        &self.control_in
    }

    /// Descriptor port indices of the control output (notify) ports.
    pub fn control_out(&self) -> &[u32] {
        &self.control_out
    }

    /// The resolved default for control input `idx` (index within kind).
    pub fn control_default(&self, idx: usize) -> f32 {
        self.defaults[idx]
    }

    /// The port spec behind descriptor port index `p`.
    pub fn port_spec(&self, p: u32) -> &PortSpec {
        &self.desc.ports()[p as usize]
    }
}

struct PluginEntry {
    kind: PluginType,
    path: String,
    library: Arc<dyn FilterLibrary>,
    descriptors: Vec<Arc<Descriptor>>,
}

/// Caches plugin libraries and dispenses partitioned descriptors.
pub struct PluginRegistry {
    sample_rate: u32,
    plugins: Vec<PluginEntry>,
}

impl PluginRegistry {
    /// Creates a registry resolving control defaults at `sample_rate`.
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            plugins: Vec::new(),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Resolves `(kind, path, label)` to a descriptor, loading and caching
    /// the plugin library on first use.
    pub fn descriptor(
        &mut self,
        kind: PluginType,
        path: &str,
        label: &str,
    ) -> Result<Arc<Descriptor>, LoadError> {
        let slot = self.load_plugin(kind, path)?;
        let entry = &mut self.plugins[slot];

        if let Some(desc) = entry.descriptors.iter().find(|d| d.label == label) {
            return Ok(Arc::clone(desc));
        }

        let raw = entry.library.make_descriptor(label).map_err(|e| match e {
            FilterError::UnknownLabel(label) => LoadError::LabelNotFound {
                path: entry.path.clone(),
                label,
            },
            other => LoadError::LoadFailed {
                path: entry.path.clone(),
                reason: other.to_string(),
            },
        })?;

        let desc = Arc::new(Descriptor::new(
            label,
            raw,
            Arc::clone(&entry.library),
            self.sample_rate,
        )?);
        entry.descriptors.push(Arc::clone(&desc));
        Ok(desc)
    }

    fn load_plugin(&mut self, kind: PluginType, path: &str) -> Result<usize, LoadError> {
        if let Some(slot) = self
            .plugins
            .iter()
            .position(|e| e.kind == kind && e.path == path)
        {
            return Ok(slot);
        }

        let library: Arc<dyn FilterLibrary> = match kind {
            PluginType::Builtin => cadena_filters::builtin_library(),
            PluginType::Ladspa => Arc::new(ladspa::LadspaLibrary::open(path)?),
            PluginType::Lv2 => {
                return Err(LoadError::UnsupportedType {
                    kind: "lv2 (no LV2 host in this build)".to_owned(),
                })
            }
        };
        info!(kind = kind.as_str(), path, "opened plugin");

        self.plugins.push(PluginEntry {
            kind,
            path: path.to_owned(),
            library,
            descriptors: Vec::new(),
        });
        Ok(self.plugins.len() - 1)
    }

    /// Drops cached descriptors and plugins nothing else references.
    pub fn evict_unused(&mut self) {
        for entry in &mut self.plugins {
            entry.descriptors.retain(|d| Arc::strong_count(d) > 1);
        }
        self.plugins
            .retain(|e| !e.descriptors.is_empty() || Arc::strong_count(&e.library) > 1);
    }

    /// Number of cached plugin libraries.
    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_descriptor_partitions_ports() {
        let mut registry = PluginRegistry::new(48000);
        let desc = registry
            .descriptor(PluginType::Builtin, "builtin", "mixer")
            .unwrap();
        assert_eq!(desc.label(), "mixer");
        assert_eq!(desc.audio_in().len(), 8);
        assert_eq!(desc.audio_out().len(), 1);
        assert_eq!(desc.control_in().len(), 8);
        assert!(desc.control_out().is_empty());
        assert_eq!(desc.control_default(0), 1.0);
    }

    #[test]
    fn plugin_and_descriptor_are_cached() {
        let mut registry = PluginRegistry::new(48000);
        let a = registry
            .descriptor(PluginType::Builtin, "builtin", "copy")
            .unwrap();
        let b = registry
            .descriptor(PluginType::Builtin, "builtin", "copy")
            .unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 1);

        registry
            .descriptor(PluginType::Builtin, "builtin", "mixer")
            .unwrap();
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn sample_rate_hint_scales_defaults() {
        let mut registry = PluginRegistry::new(48000);
        let desc = registry
            .descriptor(PluginType::Builtin, "builtin", "bq_lowpass")
            .unwrap();
        // "Freq" declares def 0.0 of the rate; scaled it is still 0.
        assert_eq!(desc.control_default(0), 0.0);
        // Its spec max is the Nyquist fraction, left unscaled here.
        let freq_port = desc.control_in()[0];
        assert_eq!(desc.port_spec(freq_port).max, 0.5);
    }

    #[test]
    fn unknown_label_reports_path() {
        let mut registry = PluginRegistry::new(48000);
        let err = registry
            .descriptor(PluginType::Builtin, "builtin", "missing")
            .unwrap_err();
        assert!(matches!(err, LoadError::LabelNotFound { .. }));
    }

    #[test]
    fn lv2_is_reported_unsupported() {
        let mut registry = PluginRegistry::new(48000);
        let err = registry
            .descriptor(PluginType::Lv2, "urn:some:plugin", "x")
            .unwrap_err();
        assert!(matches!(err, LoadError::UnsupportedType { .. }));
    }

    #[test]
    fn evict_drops_unreferenced_entries() {
        let mut registry = PluginRegistry::new(48000);
        let desc = registry
            .descriptor(PluginType::Builtin, "builtin", "copy")
            .unwrap();
        registry.evict_unused();
        assert_eq!(registry.len(), 1); // still referenced by `desc`

        drop(desc);
        registry.evict_unused();
        assert!(registry.is_empty());
    }
}
