//! The `convolver` builtin: partitioned FFT convolution.
//!
//! The impulse response comes from the node config: a WAV file, or one of
//! the synthetic kernels `/dirac` (gain) and `/hilbert` (±90° phase shift).
//! Convolution runs in up to two uniformly partitioned overlap-save stages:
//! a head stage at `blocksize` covering the start of the response and a tail
//! stage at `tailsize` covering the rest. The tail stage's inherent FFT
//! latency supplies exactly the impulse offset it needs, so the filter's
//! total latency is `blocksize` samples regardless of response length.

use std::f32::consts::PI;
use std::sync::Arc;

use cadena_core::{DescriptorFlags, Filter, FilterDescriptor, FilterError, PortSpec};
use libm::cosf;
use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use serde::Deserialize;
use tracing::warn;

use crate::PortPtr;

#[derive(Debug, Deserialize)]
struct ConvolverConfig {
    blocksize: Option<usize>,
    tailsize: Option<usize>,
    #[serde(default = "default_gain")]
    gain: f32,
    /// Extra delay prepended to the response, in samples.
    #[serde(default)]
    delay: usize,
    filename: String,
    /// Sample offset into the file where the response starts.
    #[serde(default)]
    offset: usize,
    /// Number of samples to use; for `/hilbert` the tap count (odd).
    length: Option<usize>,
    /// Channel of the file to use.
    #[serde(default)]
    channel: usize,
}

fn default_gain() -> f32 {
    1.0
}

const DEFAULT_HILBERT_TAPS: usize = 129;

pub(crate) struct ConvolverDescriptor {
    ports: [PortSpec; 2],
}

impl ConvolverDescriptor {
    pub fn new() -> Self {
        Self {
            ports: [PortSpec::audio_out("Out"), PortSpec::audio_in("In")],
        }
    }
}

impl FilterDescriptor for ConvolverDescriptor {
    fn label(&self) -> &str {
        "convolver"
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
        let text = config.ok_or_else(|| {
            FilterError::BadConfig("convolver requires a config section".into())
        })?;
        let config: ConvolverConfig = serde_json::from_str(text)
            .map_err(|e| FilterError::BadConfig(format!("convolver config: {e}")))?;

        let mut ir = load_response(&config, sample_rate)?;
        if ir.is_empty() {
            return Err(FilterError::BadConfig("impulse response is empty".into()));
        }
        if config.gain != 1.0 {
            for tap in &mut ir {
                *tap *= config.gain;
            }
        }
        if config.delay > 0 {
            let mut delayed = vec![0.0; config.delay];
            delayed.extend_from_slice(&ir);
            ir = delayed;
        }

        let blocksize = config
            .blocksize
            .unwrap_or_else(|| ir.len().next_power_of_two().clamp(64, 256))
            .next_power_of_two()
            .clamp(64, 8192);
        let tailsize = config
            .tailsize
            .unwrap_or_else(|| blocksize.max(4096))
            .next_power_of_two()
            .max(blocksize);

        // Head covers the first tailsize - blocksize samples; the tail
        // stage's own latency then lines its contribution up exactly.
        let split = tailsize - blocksize;
        let (head_ir, tail_ir) = if split > 0 && ir.len() > split {
            ir.split_at(split)
        } else {
            (ir.as_slice(), &[][..])
        };

        let mut planner = FftPlanner::new();
        let head = PartitionedStage::new(&mut planner, blocksize, head_ir);
        let tail = if tail_ir.is_empty() {
            None
        } else {
            Some(PartitionedStage::new(&mut planner, tailsize, tail_ir))
        };

        Ok(Box::new(Convolver {
            head,
            tail,
            out: PortPtr::NULL,
            input: PortPtr::NULL,
        }))
    }
}

/// Builds the impulse response the config names.
fn load_response(config: &ConvolverConfig, sample_rate: u32) -> Result<Vec<f32>, FilterError> {
    match config.filename.as_str() {
        "/dirac" => Ok(vec![1.0]),
        "/hilbert" => hilbert_taps(config.length.unwrap_or(DEFAULT_HILBERT_TAPS)),
        path => load_wav(path, config, sample_rate),
    }
}

/// Windowed FIR approximation of the Hilbert transform.
///
/// Taps are 2/(πk) at odd offsets from the center and zero elsewhere,
/// shaped by a Blackman window. The tap count must be odd so the center
/// lands on a sample.
fn hilbert_taps(n_taps: usize) -> Result<Vec<f32>, FilterError> {
    if n_taps % 2 == 0 {
        return Err(FilterError::BadConfig(format!(
            "hilbert length must be odd, got {n_taps}"
        )));
    }
    let mut taps = vec![0.0; n_taps];
    for (i, tap) in taps.iter_mut().enumerate() {
        let k = i as i64 - (n_taps / 2) as i64;
        if k % 2 != 0 {
            let w = 2.0 * PI * i as f32 / (n_taps - 1) as f32;
            let window = 0.3635819 - 0.4891775 * cosf(w) + 0.1365995 * cosf(2.0 * w)
                - 0.0106411 * cosf(3.0 * w);
            let pk = PI * k as f32;
            *tap = window * (1.0 - cosf(pk)) / pk;
        }
    }
    Ok(taps)
}

fn load_wav(
    path: &str,
    config: &ConvolverConfig,
    sample_rate: u32,
) -> Result<Vec<f32>, FilterError> {
    let mut reader = hound::WavReader::open(path)
        .map_err(|e| FilterError::BadConfig(format!("cannot open '{path}': {e}")))?;
    let spec = reader.spec();
    let channels = spec.channels as usize;
    if config.channel >= channels {
        return Err(FilterError::BadConfig(format!(
            "'{path}' has {channels} channels, channel {} requested",
            config.channel
        )));
    }
    if spec.sample_rate != sample_rate {
        warn!(
            file = path,
            file_rate = spec.sample_rate,
            engine_rate = sample_rate,
            "impulse response rate differs from engine rate, using as-is"
        );
    }

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .map(|s| s.unwrap_or(0.0))
            .collect(),
        hound::SampleFormat::Int => {
            let scale = 1.0 / (1_i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.unwrap_or(0) as f32 * scale)
                .collect()
        }
    };

    let mut ir: Vec<f32> = samples
        .chunks_exact(channels)
        .map(|frame| frame[config.channel])
        .skip(config.offset)
        .collect();
    if let Some(length) = config.length {
        ir.truncate(length);
    }
    Ok(ir)
}

/// One uniformly partitioned overlap-save convolution stage.
///
/// Streams sample by sample with a fixed latency of one partition.
struct PartitionedStage {
    block: usize,
    fft: Arc<dyn Fft<f32>>,
    ifft: Arc<dyn Fft<f32>>,
    /// Impulse partition spectra, earliest lag first.
    parts: Vec<Vec<Complex<f32>>>,
    /// Frequency-domain delay line; `head` is the newest input spectrum.
    fdl: Vec<Vec<Complex<f32>>>,
    head: usize,
    /// Previous input block (the overlap half of the FFT frame).
    prev: Vec<f32>,
    in_fifo: Vec<f32>,
    out_fifo: Vec<f32>,
    fill: usize,
    work: Vec<Complex<f32>>,
    acc: Vec<Complex<f32>>,
    /// FFT scratch, preallocated so the audio thread never allocates.
    scratch: Vec<Complex<f32>>,
}

impl PartitionedStage {
    fn new(planner: &mut FftPlanner<f32>, block: usize, ir: &[f32]) -> Self {
        let n = 2 * block;
        let fft = planner.plan_fft_forward(n);
        let ifft = planner.plan_fft_inverse(n);

        let mut scratch =
            vec![
                Complex::new(0.0, 0.0);
                fft.get_inplace_scratch_len().max(ifft.get_inplace_scratch_len())
            ];

        let mut parts = Vec::with_capacity(ir.len().div_ceil(block).max(1));
        for chunk in ir.chunks(block) {
            let mut spectrum: Vec<Complex<f32>> = chunk
                .iter()
                .map(|&t| Complex::new(t, 0.0))
                .chain(std::iter::repeat(Complex::new(0.0, 0.0)))
                .take(n)
                .collect();
            fft.process_with_scratch(&mut spectrum, &mut scratch);
            parts.push(spectrum);
        }
        let n_parts = parts.len().max(1);

        Self {
            block,
            fft,
            ifft,
            parts,
            fdl: vec![vec![Complex::new(0.0, 0.0); n]; n_parts],
            head: 0,
            prev: vec![0.0; block],
            in_fifo: vec![0.0; block],
            out_fifo: vec![0.0; block],
            fill: 0,
            work: vec![Complex::new(0.0, 0.0); n],
            acc: vec![Complex::new(0.0, 0.0); n],
            scratch,
        }
    }

    /// Drops all streaming state, keeping the partition spectra.
    fn reset(&mut self) {
        for spectrum in &mut self.fdl {
            spectrum.fill(Complex::new(0.0, 0.0));
        }
        self.head = 0;
        self.prev.fill(0.0);
        self.in_fifo.fill(0.0);
        self.out_fifo.fill(0.0);
        self.fill = 0;
    }

    #[inline]
    fn process(&mut self, input: f32) -> f32 {
        let output = self.out_fifo[self.fill];
        self.in_fifo[self.fill] = input;
        self.fill += 1;
        if self.fill == self.block {
            self.compute_block();
            self.fill = 0;
        }
        output
    }

    fn compute_block(&mut self) {
        let n = 2 * self.block;

        // Overlap-save frame: previous block, then the new one.
        for i in 0..self.block {
            self.work[i] = Complex::new(self.prev[i], 0.0);
            self.work[self.block + i] = Complex::new(self.in_fifo[i], 0.0);
        }
        self.prev.copy_from_slice(&self.in_fifo);
        self.fft.process_with_scratch(&mut self.work, &mut self.scratch);

        let n_fdl = self.fdl.len();
        self.head = (self.head + n_fdl - 1) % n_fdl;
        self.fdl[self.head].copy_from_slice(&self.work);

        self.acc.fill(Complex::new(0.0, 0.0));
        for (j, part) in self.parts.iter().enumerate() {
            let spectrum = &self.fdl[(self.head + j) % n_fdl];
            for ((a, p), s) in self.acc.iter_mut().zip(part).zip(spectrum) {
                *a += p * s;
            }
        }
        self.ifft.process_with_scratch(&mut self.acc, &mut self.scratch);

        // Only the second half of the frame is free of circular wrap.
        let scale = 1.0 / n as f32;
        for i in 0..self.block {
            self.out_fifo[i] = self.acc[self.block + i].re * scale;
        }
    }
}

struct Convolver {
    head: PartitionedStage,
    tail: Option<PartitionedStage>,
    out: PortPtr,
    input: PortPtr,
}

impl Filter for Convolver {
    unsafe fn connect_port(&mut self, port: u32, data: *mut f32) {
        match port {
            0 => self.out.set(data),
            1 => self.input.set(data),
            _ => {}
        }
    }

    fn activate(&mut self) {
        self.head.reset();
        if let Some(tail) = &mut self.tail {
            tail.reset();
        }
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
        match &mut self.tail {
            Some(tail) => {
                for (o, &x) in out.iter_mut().zip(input) {
                    *o = self.head.process(x) + tail.process(x);
                }
            }
            None => {
                for (o, &x) in out.iter_mut().zip(input) {
                    *o = self.head.process(x);
                }
            }
        }
    }
}
