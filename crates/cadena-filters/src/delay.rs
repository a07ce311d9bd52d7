//! The `delay` builtin: a ring-buffer delay with a live time control.
//!
//! The node config sets the buffer size (`max-delay`, seconds); the
//! "Delay (s)" control moves within it and is clamped to it.

use cadena_core::{DescriptorFlags, Filter, FilterDescriptor, FilterError, PortSpec, RingDelay};
use serde::Deserialize;

use crate::PortPtr;

const DEFAULT_MAX_DELAY_S: f32 = 1.0;

#[derive(Debug, Deserialize)]
struct DelayConfig {
    #[serde(rename = "max-delay", default = "default_max_delay")]
    max_delay: f32,
}

fn default_max_delay() -> f32 {
    DEFAULT_MAX_DELAY_S
}

pub(crate) struct DelayDescriptor {
    ports: [PortSpec; 3],
}

impl DelayDescriptor {
    pub fn new() -> Self {
        Self {
            ports: [
                PortSpec::audio_out("Out"),
                PortSpec::audio_in("In"),
                PortSpec::control_in("Delay (s)", 0.0, 0.0, 100.0),
            ],
        }
    }
}

impl FilterDescriptor for DelayDescriptor {
    fn label(&self) -> &str {
        "delay"
    }

    fn flags(&self) -> DescriptorFlags {
        DescriptorFlags::SUPPORTS_NULL_DATA
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
        let config: DelayConfig = match config {
            Some(text) => serde_json::from_str(text)
                .map_err(|e| FilterError::BadConfig(format!("delay config: {e}")))?,
            None => DelayConfig {
                max_delay: DEFAULT_MAX_DELAY_S,
            },
        };
        if !(config.max_delay > 0.0) {
            return Err(FilterError::BadConfig(format!(
                "max-delay must be positive, got {}",
                config.max_delay
            )));
        }
        let max_samples = (config.max_delay * sample_rate as f32) as usize;
        Ok(Box::new(Delay {
            sample_rate: sample_rate as f32,
            line: RingDelay::new(max_samples.max(1)),
            out: PortPtr::NULL,
            input: PortPtr::NULL,
            delay_s: PortPtr::NULL,
        }))
    }
}

struct Delay {
    sample_rate: f32,
    line: RingDelay,
    out: PortPtr,
    input: PortPtr,
    delay_s: PortPtr,
}

impl Filter for Delay {
    unsafe fn connect_port(&mut self, port: u32, data: *mut f32) {
        match port {
            0 => self.out.set(data),
            1 => self.input.set(data),
            2 => self.delay_s.set(data),
            _ => {}
        }
    }

    fn activate(&mut self) {
        self.line.clear();
    }

    fn run(&mut self, samples: usize) {
        if self.out.is_null() {
            return;
        }
        let out = unsafe { self.out.as_slice_mut(samples) };
        if self.input.is_null() {
            out.fill(0.0);
            return;
        }
        let input = unsafe { self.input.as_slice(samples) };

        let delay_s = self.delay_s.control(0.0).max(0.0);
        // RingDelay clamps to its capacity, which is the configured max.
        let delay = (delay_s * self.sample_rate) as usize;
        for (o, &x) in out.iter_mut().zip(input) {
            *o = self.line.process(x, delay);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instance(config: Option<&str>) -> Box<dyn Filter> {
        DelayDescriptor::new().instantiate(1000, 0, config).unwrap()
    }

    #[test]
    fn zero_delay_is_identity() {
        let mut inst = instance(None);
        let mut input = [1.0_f32, 2.0, 3.0, 4.0];
        let mut out = [0.0_f32; 4];
        unsafe {
            inst.connect_port(0, out.as_mut_ptr());
            inst.connect_port(1, input.as_mut_ptr());
        }
        inst.run(4);
        assert_eq!(out, input);
    }

    #[test]
    fn delays_by_control_seconds() {
        // 1 kHz rate: 0.002 s = 2 samples.
        let mut inst = instance(None);
        let mut delay = 0.002_f32;
        let mut input = [1.0_f32, 2.0, 3.0, 4.0, 5.0, 6.0];
        let mut out = [0.0_f32; 6];
        unsafe {
            inst.connect_port(0, out.as_mut_ptr());
            inst.connect_port(1, input.as_mut_ptr());
            inst.connect_port(2, &mut delay);
        }
        inst.run(6);
        assert_eq!(out, [0.0, 0.0, 1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn control_clamps_to_configured_max() {
        let mut inst = instance(Some(r#"{ "max-delay": 0.004 }"#));
        let mut delay = 60.0_f32; // way past max: clamps to 4 samples
        let mut input = [1.0_f32, 2.0, 3.0, 4.0, 5.0, 6.0];
        let mut out = [0.0_f32; 6];
        unsafe {
            inst.connect_port(0, out.as_mut_ptr());
            inst.connect_port(1, input.as_mut_ptr());
            inst.connect_port(2, &mut delay);
        }
        inst.run(6);
        assert_eq!(out, [0.0, 0.0, 0.0, 0.0, 1.0, 2.0]);
    }

    #[test]
    fn bad_config_is_rejected() {
        assert!(DelayDescriptor::new()
            .instantiate(48000, 0, Some(r#"{ "max-delay": -2.0 }"#))
            .is_err());
        assert!(DelayDescriptor::new()
            .instantiate(48000, 0, Some("not json"))
            .is_err());
    }
}
