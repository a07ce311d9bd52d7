//! Connected-port pointer plumbing shared by the builtin filters.

use std::ptr;

/// A port's connected buffer, null until wired.
///
/// Builtin instances store one of these per descriptor port. The pointee is
/// owned by the graph (an intermediate buffer, a stream channel, a control
/// cell, or the shared scratch buffers) and outlives the wiring, per the
/// `connect_port` contract.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PortPtr(*mut f32);

// Instances only move between threads while no block is in flight, and the
// buffers behind the pointers are owned by the graph that owns the instance.
unsafe impl Send for PortPtr {}

impl PortPtr {
    pub const NULL: Self = Self(ptr::null_mut());

    #[inline]
    pub fn set(&mut self, data: *mut f32) {
        self.0 = data;
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        self.0.is_null()
    }

    /// The connected buffer as a read slice of `len` samples.
    ///
    /// # Safety
    ///
    /// The pointer must be non-null and valid for `len` reads, which the
    /// `connect_port` contract guarantees for the current block length.
    #[inline]
    pub unsafe fn as_slice<'a>(&self, len: usize) -> &'a [f32] {
        std::slice::from_raw_parts(self.0, len)
    }

    /// The connected buffer as a write slice of `len` samples.
    ///
    /// # Safety
    ///
    /// The pointer must be non-null and valid for `len` writes, which the
    /// `connect_port` contract guarantees for the current block length.
    #[inline]
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn as_slice_mut<'a>(&self, len: usize) -> &'a mut [f32] {
        std::slice::from_raw_parts_mut(self.0, len)
    }

    /// Reads a control port's scalar, or `default` when unconnected.
    #[inline]
    pub fn control(&self, default: f32) -> f32 {
        if self.0.is_null() {
            default
        } else {
            unsafe { *self.0 }
        }
    }
}

impl Default for PortPtr {
    fn default() -> Self {
        Self::NULL
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_control_reads_default() {
        let p = PortPtr::NULL;
        assert_eq!(p.control(0.707), 0.707);
    }

    #[test]
    fn connected_control_reads_value() {
        let mut v = 2.5_f32;
        let mut p = PortPtr::NULL;
        p.set(&mut v);
        assert_eq!(p.control(0.0), 2.5);
    }

    #[test]
    fn slice_views_track_buffer() {
        let mut buf = [1.0_f32, 2.0, 3.0, 4.0];
        let mut p = PortPtr::NULL;
        p.set(buf.as_mut_ptr());
        unsafe {
            p.as_slice_mut(4)[2] = 9.0;
            assert_eq!(p.as_slice(4), &[1.0, 2.0, 9.0, 4.0]);
        }
    }
}
