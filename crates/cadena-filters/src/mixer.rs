//! The `mixer` builtin: gain-weighted summing of up to 8 inputs.

use cadena_core::{DescriptorFlags, Filter, FilterDescriptor, FilterError, PortSpec};

use crate::PortPtr;

const N_INPUTS: usize = 8;

pub(crate) struct MixerDescriptor {
    ports: Vec<PortSpec>,
}

impl MixerDescriptor {
    pub fn new() -> Self {
        let mut ports = Vec::with_capacity(1 + 2 * N_INPUTS);
        ports.push(PortSpec::audio_out("Out"));
        for i in 1..=N_INPUTS {
            ports.push(PortSpec::audio_in(&format!("In {i}")));
        }
        for i in 1..=N_INPUTS {
            ports.push(PortSpec::control_in(&format!("Gain {i}"), 1.0, 0.0, 10.0));
        }
        Self { ports }
    }
}

impl FilterDescriptor for MixerDescriptor {
    fn label(&self) -> &str {
        "mixer"
    }

    fn flags(&self) -> DescriptorFlags {
        DescriptorFlags::SUPPORTS_NULL_DATA
    }

    fn ports(&self) -> &[PortSpec] {
        self.ports.as_slice()
    }

    fn instantiate(
        &self,
        _sample_rate: u32,
        _instance: u32,
        _config: Option<&str>,
    ) -> Result<Box<dyn Filter>, FilterError> {
        Ok(Box::new(Mixer {
            out: PortPtr::NULL,
            inputs: [PortPtr::NULL; N_INPUTS],
            gains: [PortPtr::NULL; N_INPUTS],
        }))
    }
}

struct Mixer {
    out: PortPtr,
    inputs: [PortPtr; N_INPUTS],
    gains: [PortPtr; N_INPUTS],
}

impl Filter for Mixer {
    unsafe fn connect_port(&mut self, port: u32, data: *mut f32) {
        let port = port as usize;
        match port {
            0 => self.out.set(data),
            1..=N_INPUTS => self.inputs[port - 1].set(data),
            _ if port <= 2 * N_INPUTS => self.gains[port - 1 - N_INPUTS].set(data),
            _ => {}
        }
    }

    fn run(&mut self, samples: usize) {
        if self.out.is_null() {
            return;
        }
        let out = unsafe { self.out.as_slice_mut(samples) };
        out.fill(0.0);

        // Unconnected inputs stay null (SUPPORTS_NULL_DATA) and cost nothing.
        for i in 0..N_INPUTS {
            if self.inputs[i].is_null() {
                continue;
            }
            let gain = self.gains[i].control(1.0);
            if gain == 0.0 {
                continue;
            }
            let input = unsafe { self.inputs[i].as_slice(samples) };
            if gain == 1.0 {
                for (o, x) in out.iter_mut().zip(input) {
                    *o += *x;
                }
            } else {
                for (o, x) in out.iter_mut().zip(input) {
                    *o += *x * gain;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadena_core::PortFlags;
    use std::sync::Arc;

    fn make() -> (Box<dyn Filter>, Arc<dyn FilterDescriptor>) {
        let desc: Arc<dyn FilterDescriptor> = Arc::new(MixerDescriptor::new());
        let inst = desc.instantiate(48000, 0, None).unwrap();
        (inst, desc)
    }

    #[test]
    fn port_layout() {
        let desc = MixerDescriptor::new();
        let ports = desc.ports();
        assert_eq!(ports.len(), 17);
        assert_eq!(ports[0].name, "Out");
        assert!(ports[0].flags.contains(PortFlags::OUTPUT.union(PortFlags::AUDIO)));
        assert_eq!(ports[1].name, "In 1");
        assert_eq!(ports[8].name, "In 8");
        assert_eq!(ports[9].name, "Gain 1");
        assert_eq!(ports[9].default, 1.0);
        assert_eq!(ports[16].name, "Gain 8");
    }

    #[test]
    fn sums_connected_inputs_with_gains() {
        let (mut mixer, _desc) = make();
        let mut in1 = [1.0_f32; 4];
        let mut in2 = [4.0_f32; 4];
        let mut g1 = 0.5_f32;
        let mut g2 = 0.25_f32;
        let mut out = [0.0_f32; 4];
        unsafe {
            mixer.connect_port(0, out.as_mut_ptr());
            mixer.connect_port(1, in1.as_mut_ptr());
            mixer.connect_port(2, in2.as_mut_ptr());
            mixer.connect_port(9, &mut g1);
            mixer.connect_port(10, &mut g2);
        }
        mixer.run(4);
        for y in out {
            assert!((y - 1.5).abs() < 1e-6);
        }
    }

    #[test]
    fn unconnected_inputs_are_skipped() {
        let (mut mixer, _desc) = make();
        let mut in3 = [2.0_f32; 4];
        let mut out = [0.0_f32; 4];
        unsafe {
            mixer.connect_port(0, out.as_mut_ptr());
            mixer.connect_port(3, in3.as_mut_ptr());
        }
        mixer.run(4);
        // Only "In 3" contributes, default gain 1.0.
        assert_eq!(out, [2.0; 4]);
    }

    #[test]
    fn null_output_is_a_no_op() {
        let (mut mixer, _desc) = make();
        let mut in1 = [1.0_f32; 4];
        unsafe { mixer.connect_port(1, in1.as_mut_ptr()) };
        mixer.run(4);
    }
}
