//! The `bq_*` builtins: one filter implementation behind eight labels.
//!
//! Every biquad exposes "In"/"Out" plus "Freq", "Q" and "Gain" controls.
//! "Freq" carries the SAMPLE_RATE hint: its declared range is a fraction of
//! the rate (0 to Nyquist), while the live control value is in plain Hz.
//! Coefficients are re-derived whenever one of the three controls changes.

use std::sync::Arc;

use cadena_core::{
    Biquad, BiquadType, Coefficients, DescriptorFlags, Filter, FilterDescriptor, FilterError,
    HintFlags, PortSpec,
};

use crate::PortPtr;

const LABELS: [(&str, BiquadType); 8] = [
    ("bq_lowpass", BiquadType::Lowpass),
    ("bq_highpass", BiquadType::Highpass),
    ("bq_bandpass", BiquadType::Bandpass),
    ("bq_lowshelf", BiquadType::Lowshelf),
    ("bq_highshelf", BiquadType::Highshelf),
    ("bq_peaking", BiquadType::Peaking),
    ("bq_notch", BiquadType::Notch),
    ("bq_allpass", BiquadType::Allpass),
];

pub(crate) fn descriptor_for_label(label: &str) -> Option<Arc<dyn FilterDescriptor>> {
    LABELS
        .iter()
        .find(|(l, _)| *l == label)
        .map(|&(label, ty)| Arc::new(BiquadDescriptor::new(label, ty)) as Arc<dyn FilterDescriptor>)
}

pub(crate) struct BiquadDescriptor {
    label: &'static str,
    ty: BiquadType,
    ports: [PortSpec; 5],
}

impl BiquadDescriptor {
    fn new(label: &'static str, ty: BiquadType) -> Self {
        Self {
            label,
            ty,
            ports: [
                PortSpec::audio_out("Out"),
                PortSpec::audio_in("In"),
                PortSpec::control_in("Freq", 0.0, 0.0, 0.5).with_hint(HintFlags::SAMPLE_RATE),
                PortSpec::control_in("Q", 0.0, 0.0, 10.0),
                PortSpec::control_in("Gain", 0.0, -30.0, 30.0),
            ],
        }
    }
}

impl FilterDescriptor for BiquadDescriptor {
    fn label(&self) -> &str {
        self.label
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
        _config: Option<&str>,
    ) -> Result<Box<dyn Filter>, FilterError> {
        Ok(Box::new(BiquadFilter {
            ty: self.ty,
            sample_rate: sample_rate as f32,
            bq: Biquad::new(),
            out: PortPtr::NULL,
            input: PortPtr::NULL,
            freq: PortPtr::NULL,
            q: PortPtr::NULL,
            gain: PortPtr::NULL,
            last: None,
        }))
    }
}

struct BiquadFilter {
    ty: BiquadType,
    sample_rate: f32,
    bq: Biquad,
    out: PortPtr,
    input: PortPtr,
    freq: PortPtr,
    q: PortPtr,
    gain: PortPtr,
    /// Control values the current coefficients were derived from.
    last: Option<(f32, f32, f32)>,
}

impl BiquadFilter {
    fn update_coefficients(&mut self) {
        let current = (
            self.freq.control(0.0),
            self.q.control(0.0),
            self.gain.control(0.0),
        );
        if self.last == Some(current) {
            return;
        }
        self.last = Some(current);
        let (freq, q, gain) = current;
        // Q of 0 means "unset": fall back to the Butterworth default.
        let q = if q <= 0.0 { 0.707 } else { q };
        self.bq
            .set_coefficients(Coefficients::compute(self.ty, freq, q, gain, self.sample_rate));
    }
}

impl Filter for BiquadFilter {
    unsafe fn connect_port(&mut self, port: u32, data: *mut f32) {
        match port {
            0 => self.out.set(data),
            1 => self.input.set(data),
            2 => self.freq.set(data),
            3 => self.q.set(data),
            4 => self.gain.set(data),
            _ => {}
        }
    }

    fn activate(&mut self) {
        self.bq.clear();
        self.last = None;
    }

    fn run(&mut self, samples: usize) {
        if self.out.is_null() {
            return;
        }
        self.update_coefficients();
        let out = unsafe { self.out.as_slice_mut(samples) };
        if self.input.is_null() {
            out.fill(0.0);
            return;
        }
        let input = unsafe { self.input.as_slice(samples) };
        for (o, &x) in out.iter_mut().zip(input) {
            *o = self.bq.process(x);
        }
    }
}
