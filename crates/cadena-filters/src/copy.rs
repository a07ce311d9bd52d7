//! The `copy` builtin: identity, used to fan a signal out to several filters.

use cadena_core::{DescriptorFlags, Filter, FilterDescriptor, FilterError, PortSpec};

use crate::PortPtr;

pub(crate) struct CopyDescriptor {
    ports: [PortSpec; 2],
}

impl CopyDescriptor {
    pub fn new() -> Self {
        Self {
            ports: [PortSpec::audio_out("Out"), PortSpec::audio_in("In")],
        }
    }
}

impl FilterDescriptor for CopyDescriptor {
    fn label(&self) -> &str {
        "copy"
    }

    fn flags(&self) -> DescriptorFlags {
        DescriptorFlags::SUPPORTS_NULL_DATA
    }

    fn ports(&self) -> &[PortSpec] {
        &self.ports
    }

    fn instantiate(
        &self,
        _sample_rate: u32,
        _instance: u32,
        _config: Option<&str>,
    ) -> Result<Box<dyn Filter>, FilterError> {
        Ok(Box::new(Copy {
            out: PortPtr::NULL,
            input: PortPtr::NULL,
        }))
    }
}

struct Copy {
    out: PortPtr,
    input: PortPtr,
}

impl Filter for Copy {
    unsafe fn connect_port(&mut self, port: u32, data: *mut f32) {
        match port {
            0 => self.out.set(data),
            1 => self.input.set(data),
            _ => {}
        }
    }

    fn run(&mut self, samples: usize) {
        if self.out.is_null() {
            return;
        }
        let out = unsafe { self.out.as_slice_mut(samples) };
        if self.input.is_null() {
            out.fill(0.0);
        } else {
            out.copy_from_slice(unsafe { self.input.as_slice(samples) });
        }
    }
}
