//! Process-wide scratch buffers and engine limits.

use std::cell::UnsafeCell;

/// Largest block, in frames, a single runtime invocation may carry.
pub const MAX_BLOCK: usize = 8192;

/// Upper bound on the graph replication factor.
pub const MAX_INSTANCES: usize = 64;

#[repr(align(16))]
struct Scratch(UnsafeCell<[f32; MAX_BLOCK]>);

// One global of each kind, shared by every graph in the process. SILENCE is
// never written and DISCARD is never read, so concurrent use from any number
// of audio threads is fine.
unsafe impl Sync for Scratch {}

static SILENCE: Scratch = Scratch(UnsafeCell::new([0.0; MAX_BLOCK]));
static DISCARD: Scratch = Scratch(UnsafeCell::new([0.0; MAX_BLOCK]));

/// The all-zero source buffer unbound audio inputs are wired to.
///
/// Filters must treat connected input buffers as read-only; nothing in the
/// engine ever writes through this pointer.
#[inline]
pub fn silence() -> *mut f32 {
    SILENCE.0.get().cast()
}

/// The sink buffer unbound audio outputs are wired to.
///
/// Contents are unspecified; nothing in the engine ever reads through this
/// pointer.
#[inline]
pub fn discard() -> *mut f32 {
    DISCARD.0.get().cast()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silence_is_zero() {
        let p = silence();
        for i in 0..MAX_BLOCK {
            assert_eq!(unsafe { *p.add(i) }, 0.0);
        }
    }

    #[test]
    fn buffers_are_distinct() {
        assert_ne!(silence(), discard());
    }
}
