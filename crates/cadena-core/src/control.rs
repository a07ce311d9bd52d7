//! Single-writer scalar cells for live control values.

use std::sync::atomic::{AtomicU32, Ordering};

/// A control port's resident scalar value.
///
/// One writer (the control thread) stores new values; the audio thread — and
/// any plugin holding the cell's address through `connect_port` — reads them
/// at block granularity. The value is kept as `f32` bits in a relaxed
/// `AtomicU32`: there is no ordering requirement because a stale read merely
/// yields the previous value until the next block boundary.
///
/// The cell address handed out by [`as_ptr`](Self::as_ptr) stays valid for
/// as long as the cell itself does; the graph guarantees cells never move
/// after ports are materialized.
#[derive(Debug)]
pub struct ControlCell(AtomicU32);

impl ControlCell {
    /// Creates a cell holding `value`.
    pub fn new(value: f32) -> Self {
        Self(AtomicU32::new(value.to_bits()))
    }

    /// Reads the current value.
    #[inline]
    pub fn get(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }

    /// Stores a new value. Control-thread only.
    #[inline]
    pub fn set(&self, value: f32) {
        self.0.store(value.to_bits(), Ordering::Relaxed);
    }

    /// The cell's address, for wiring into a filter's control port.
    #[inline]
    pub fn as_ptr(&self) -> *mut f32 {
        self.0.as_ptr().cast()
    }
}

impl Default for ControlCell {
    fn default() -> Self {
        Self::new(0.0)
    }
}
