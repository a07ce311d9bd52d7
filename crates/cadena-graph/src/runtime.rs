//! Per-block execution on the audio thread.
//!
//! [`run_block`] is the whole hot path: point the exposed input ports at
//! this block's capture samples, point the exposed output ports at the
//! playback buffers (zero-filling dropped channels), then dispatch the
//! schedule. No allocation, no locking, no descriptor work happens here;
//! everything it touches was laid out at compile time.

use cadena_core::{Filter, MAX_BLOCK};

use crate::graph::Graph;

/// One channel of a dequeued stream buffer.
///
/// Mirrors the transport's per-channel chunk header: `offset`/`size` bound
/// the valid region of `samples` on the capture side, and the runtime
/// writes them (plus `stride`) on the playback side before the block is
/// queued.
pub struct ChannelData<'a> {
    samples: &'a mut [f32],
    pub offset: usize,
    pub size: usize,
    pub stride: usize,
}

impl<'a> ChannelData<'a> {
    /// Wraps a whole buffer as one valid region.
    pub fn new(samples: &'a mut [f32]) -> Self {
        let size = samples.len();
        Self {
            samples,
            offset: 0,
            size,
            stride: 1,
        }
    }

    /// Wraps a buffer with an explicit chunk header.
    pub fn with_chunk(samples: &'a mut [f32], offset: usize, size: usize, stride: usize) -> Self {
        Self {
            samples,
            offset,
            size,
            stride,
        }
    }

    /// Read access to the underlying buffer.
    pub fn samples(&self) -> &[f32] {
        self.samples
    }
}

/// Executes one block and returns the number of frames produced.
///
/// Channels beyond the graph's mux tables are ignored on input and left
/// untouched on output; mux slots marked dropped read as discarded input
/// and silent output. The block length is the smallest valid input chunk,
/// clamped by every output buffer's capacity and by [`MAX_BLOCK`].
pub fn run_block(graph: &mut Graph, input: &mut [ChannelData], output: &mut [ChannelData]) -> usize {
    let mut out_size = 0;
    let mut stride = 0;

    for (i, channel) in input.iter_mut().enumerate() {
        let offset = channel.offset.min(channel.samples.len());
        let size = channel.size.min(channel.samples.len() - offset);

        if let Some(Some(mux)) = graph.input_mux.get(i) {
            let data = channel.samples[offset..].as_mut_ptr();
            unsafe {
                graph.nodes[mux.node].instances[mux.instance].connect_port(mux.port, data);
            }
        }
        out_size = if i == 0 { size } else { out_size.min(size) };
        stride = stride.max(channel.stride);
    }

    for channel in output.iter() {
        out_size = out_size.min(channel.samples.len());
    }
    out_size = out_size.min(MAX_BLOCK);

    for (j, channel) in output.iter_mut().enumerate() {
        match graph.output_mux.get(j) {
            Some(Some(mux)) => {
                let data = channel.samples.as_mut_ptr();
                unsafe {
                    graph.nodes[mux.node].instances[mux.instance].connect_port(mux.port, data);
                }
            }
            _ => channel.samples[..out_size].fill(0.0),
        }
        channel.offset = 0;
        channel.size = out_size;
        channel.stride = stride;
    }

    for k in 0..graph.schedule.len() {
        let entry = graph.schedule[k];
        graph.nodes[entry.node].instances[entry.instance].run(out_size);
    }

    out_size
}
