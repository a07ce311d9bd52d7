//! LADSPA plugin host.
//!
//! Opens LADSPA shared objects, adapts their descriptors onto the core
//! filter contract, and resolves LADSPA range-hint defaults. Relative plugin
//! paths are searched in `$LADSPA_PATH` (falling back to the conventional
//! system directories) with `.so` appended when missing, so a graph can name
//! `ladspa/librnnoise_ladspa` and have it found.

pub mod abi;

use std::env;
use std::ffi::CStr;
use std::os::raw::c_ulong;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use cadena_core::{
    Filter, FilterDescriptor, FilterError, FilterLibrary, HintFlags, PortFlags, PortSpec,
};
use libm::{expf, logf};
use tracing::{debug, warn};

use crate::LoadError;

const DEFAULT_SEARCH_PATH: &str = "/usr/lib/ladspa:/usr/local/lib/ladspa";

/// One opened LADSPA shared object.
pub struct LadspaLibrary {
    // Field order matters: `entry` points into `library` and must be
    // invalidated first.
    entry: abi::DescriptorFunction,
    _library: libloading::Library,
    path: String,
}

// The entry point and the descriptors behind it are immutable data in the
// loaded object; calling `ladspa_descriptor` from any one thread at a time
// is all the registry (control thread only) ever does.
unsafe impl Send for LadspaLibrary {}
unsafe impl Sync for LadspaLibrary {}

impl LadspaLibrary {
    /// Opens the LADSPA object behind `path`.
    pub fn open(path: &str) -> Result<Self, LoadError> {
        let resolved = resolve_path(path)?;
        let library =
            unsafe { libloading::Library::new(&resolved) }.map_err(|e| LoadError::LoadFailed {
                path: resolved.display().to_string(),
                reason: e.to_string(),
            })?;
        let entry: abi::DescriptorFunction = unsafe {
            library
                .get::<abi::DescriptorFunction>(b"ladspa_descriptor\0")
                .map(|symbol| *symbol)
                .map_err(|e| LoadError::LoadFailed {
                    path: resolved.display().to_string(),
                    reason: format!("no ladspa_descriptor symbol: {e}"),
                })?
        };
        Ok(Self {
            entry,
            _library: library,
            path: resolved.display().to_string(),
        })
    }
}

impl FilterLibrary for LadspaLibrary {
    fn make_descriptor(&self, label: &str) -> Result<Arc<dyn FilterDescriptor>, FilterError> {
        for index in 0.. {
            let raw = unsafe { (self.entry)(index as c_ulong) };
            if raw.is_null() {
                break;
            }
            let desc = unsafe { &*raw };
            let found = !desc.label.is_null()
                && unsafe { CStr::from_ptr(desc.label) }.to_string_lossy() == label;
            if found {
                debug!(path = %self.path, label, index, "matched ladspa descriptor");
                return Ok(Arc::new(LadspaDescriptor::new(raw)));
            }
        }
        Err(FilterError::UnknownLabel(label.to_owned()))
    }
}

/// Locates a LADSPA object, appending `.so` and walking the search path.
fn resolve_path(path: &str) -> Result<PathBuf, LoadError> {
    let mut name = path.to_owned();
    if !name.ends_with(".so") {
        name.push_str(".so");
    }
    let candidate = Path::new(&name);
    if candidate.is_absolute() {
        if candidate.exists() {
            return Ok(candidate.to_path_buf());
        }
        return Err(LoadError::NotFound { path: name });
    }
    let search = env::var("LADSPA_PATH").unwrap_or_else(|_| DEFAULT_SEARCH_PATH.to_owned());
    for dir in search.split(':').filter(|d| !d.is_empty()) {
        let candidate = Path::new(dir).join(&name);
        if candidate.exists() {
            return Ok(candidate);
        }
    }
    Err(LoadError::NotFound { path: name })
}

/// Resolves a LADSPA range hint to a concrete default value.
///
/// Bounds carrying HINT_SAMPLE_RATE are fractions of the rate; scaling is
/// the registry's job, so the raw fraction is returned here.
fn hint_default(hint: &abi::PortRangeHint) -> f32 {
    let h = hint.hint_descriptor;
    let lower = hint.lower_bound;
    let upper = hint.upper_bound;
    let logarithmic = h & abi::HINT_LOGARITHMIC != 0 && lower > 0.0 && upper > 0.0;

    let interpolate = |w: f32| {
        if logarithmic {
            expf((1.0 - w) * logf(lower) + w * logf(upper))
        } else {
            (1.0 - w) * lower + w * upper
        }
    };

    match h & abi::HINT_DEFAULT_MASK {
        abi::HINT_DEFAULT_MINIMUM => lower,
        abi::HINT_DEFAULT_LOW => interpolate(0.25),
        abi::HINT_DEFAULT_MIDDLE => interpolate(0.5),
        abi::HINT_DEFAULT_HIGH => interpolate(0.75),
        abi::HINT_DEFAULT_MAXIMUM => upper,
        abi::HINT_DEFAULT_0 => 0.0,
        abi::HINT_DEFAULT_1 => 1.0,
        abi::HINT_DEFAULT_100 => 100.0,
        abi::HINT_DEFAULT_440 => 440.0,
        _ => 0.0,
    }
}

struct LadspaDescriptor {
    raw: *const abi::Descriptor,
    label: String,
    ports: Vec<PortSpec>,
}

// The descriptor is immutable data inside the loaded object, and the
// registry's `Descriptor` wrapper keeps that object alive for as long as
// this adapter (or any instance) exists.
unsafe impl Send for LadspaDescriptor {}
unsafe impl Sync for LadspaDescriptor {}

impl LadspaDescriptor {
    fn new(raw: *const abi::Descriptor) -> Self {
        let desc = unsafe { &*raw };
        let label = unsafe { CStr::from_ptr(desc.label) }
            .to_string_lossy()
            .into_owned();

        let n_ports = desc.port_count as usize;
        let mut ports = Vec::with_capacity(n_ports);
        for p in 0..n_ports {
            let pd = unsafe { *desc.port_descriptors.add(p) };
            let name = unsafe { CStr::from_ptr(*desc.port_names.add(p)) }
                .to_string_lossy()
                .into_owned();
            let hint = unsafe { &*desc.port_range_hints.add(p) };

            let mut flags = if pd & abi::PORT_AUDIO != 0 {
                PortFlags::AUDIO
            } else {
                PortFlags::CONTROL
            };
            flags = flags.union(if pd & abi::PORT_INPUT != 0 {
                PortFlags::INPUT
            } else {
                PortFlags::OUTPUT
            });

            let mut hints = HintFlags::NONE;
            if hint.hint_descriptor & abi::HINT_TOGGLED != 0 {
                hints = hints.union(HintFlags::BOOLEAN);
            }
            if hint.hint_descriptor & abi::HINT_INTEGER != 0 {
                hints = hints.union(HintFlags::INTEGER);
            }
            if hint.hint_descriptor & abi::HINT_SAMPLE_RATE != 0 {
                hints = hints.union(HintFlags::SAMPLE_RATE);
            }

            let min = if hint.hint_descriptor & abi::HINT_BOUNDED_BELOW != 0 {
                hint.lower_bound
            } else {
                f32::NEG_INFINITY
            };
            let max = if hint.hint_descriptor & abi::HINT_BOUNDED_ABOVE != 0 {
                hint.upper_bound
            } else {
                f32::INFINITY
            };

            ports.push(PortSpec {
                name,
                flags,
                hint: hints,
                default: hint_default(hint),
                min,
                max,
            });
        }

        Self { raw, label, ports }
    }
}

impl FilterDescriptor for LadspaDescriptor {
    fn label(&self) -> &str {
        &self.label
    }

    fn ports(&self) -> &[PortSpec] {
        &self.ports
    }

    fn instantiate(
        &self,
        sample_rate: u32,
        _instance: u32,
        config: Option<&str>,
    ) -> Result<Box<dyn Filter>, FilterError> {
        if config.is_some() {
            warn!(label = %self.label, "ladspa filters take no config, ignoring");
        }
        let desc = unsafe { &*self.raw };
        let instantiate = desc
            .instantiate
            .ok_or_else(|| FilterError::Instantiate("descriptor has no instantiate".into()))?;
        let handle = unsafe { instantiate(self.raw, sample_rate as c_ulong) };
        if handle.is_null() {
            return Err(FilterError::Instantiate(format!(
                "'{}' returned a null handle",
                self.label
            )));
        }
        Ok(Box::new(LadspaInstance {
            raw: self.raw,
            handle,
            active: false,
        }))
    }
}

struct LadspaInstance {
    raw: *const abi::Descriptor,
    handle: abi::Handle,
    active: bool,
}

// An instance is driven by one thread at a time (wired and activated on the
// control thread, then run on the audio thread); LADSPA requires no more.
unsafe impl Send for LadspaInstance {}

impl Filter for LadspaInstance {
    unsafe fn connect_port(&mut self, port: u32, data: *mut f32) {
        let desc = &*self.raw;
        if let Some(connect) = desc.connect_port {
            connect(self.handle, port as c_ulong, data);
        }
    }

    fn activate(&mut self) {
        let desc = unsafe { &*self.raw };
        if let Some(activate) = desc.activate {
            unsafe { activate(self.handle) };
        }
        self.active = true;
    }

    fn deactivate(&mut self) {
        if !self.active {
            return;
        }
        let desc = unsafe { &*self.raw };
        if let Some(deactivate) = desc.deactivate {
            unsafe { deactivate(self.handle) };
        }
        self.active = false;
    }

    fn run(&mut self, samples: usize) {
        let desc = unsafe { &*self.raw };
        if let Some(run) = desc.run {
            unsafe { run(self.handle, samples as c_ulong) };
        }
    }
}

impl Drop for LadspaInstance {
    fn drop(&mut self) {
        self.deactivate();
        let desc = unsafe { &*self.raw };
        if let Some(cleanup) = desc.cleanup {
            unsafe { cleanup(self.handle) };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hint(descriptor: i32, lower: f32, upper: f32) -> abi::PortRangeHint {
        abi::PortRangeHint {
            hint_descriptor: descriptor,
            lower_bound: lower,
            upper_bound: upper,
        }
    }

    #[test]
    fn plain_defaults() {
        assert_eq!(hint_default(&hint(abi::HINT_DEFAULT_MINIMUM, 2.0, 8.0)), 2.0);
        assert_eq!(hint_default(&hint(abi::HINT_DEFAULT_MAXIMUM, 2.0, 8.0)), 8.0);
        assert_eq!(hint_default(&hint(abi::HINT_DEFAULT_MIDDLE, 2.0, 8.0)), 5.0);
        assert_eq!(hint_default(&hint(abi::HINT_DEFAULT_LOW, 0.0, 8.0)), 2.0);
        assert_eq!(hint_default(&hint(abi::HINT_DEFAULT_HIGH, 0.0, 8.0)), 6.0);
    }

    #[test]
    fn fixed_defaults() {
        assert_eq!(hint_default(&hint(abi::HINT_DEFAULT_0, 2.0, 8.0)), 0.0);
        assert_eq!(hint_default(&hint(abi::HINT_DEFAULT_1, 2.0, 8.0)), 1.0);
        assert_eq!(hint_default(&hint(abi::HINT_DEFAULT_100, 2.0, 8.0)), 100.0);
        assert_eq!(hint_default(&hint(abi::HINT_DEFAULT_440, 2.0, 8.0)), 440.0);
        assert_eq!(hint_default(&hint(abi::HINT_DEFAULT_NONE, 2.0, 8.0)), 0.0);
    }

    #[test]
    fn logarithmic_middle_is_geometric_mean() {
        let h = hint(abi::HINT_DEFAULT_MIDDLE | abi::HINT_LOGARITHMIC, 100.0, 10000.0);
        let def = hint_default(&h);
        assert!((def - 1000.0).abs() < 1.0, "got {def}");
    }

    #[test]
    fn logarithmic_with_zero_bound_falls_back_to_linear() {
        let h = hint(abi::HINT_DEFAULT_MIDDLE | abi::HINT_LOGARITHMIC, 0.0, 10.0);
        assert_eq!(hint_default(&h), 5.0);
    }

    #[test]
    fn missing_plugin_reports_not_found() {
        let err = resolve_path("/nonexistent/dir/libsomething").unwrap_err();
        assert!(matches!(err, LoadError::NotFound { .. }));
    }

    #[test]
    fn resolve_appends_so_once() {
        // Both spellings resolve to the same missing name.
        let a = resolve_path("/nope/libx").unwrap_err();
        let b = resolve_path("/nope/libx.so").unwrap_err();
        let (LoadError::NotFound { path: pa }, LoadError::NotFound { path: pb }) = (a, b) else {
            panic!("expected NotFound");
        };
        assert_eq!(pa, pb);
    }
}
