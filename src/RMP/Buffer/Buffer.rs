// Ring buffer view over the shared segment.

use super::layout::RingHeader;

/// A fixed-capacity byte ring shared between processes.
///
/// This struct is NOT stored in shared memory. It is a view holding pointers
/// into a segment whose lifetime the owner of the view guarantees.
///
/// ### Concurrency Design:
/// - **Writers** take `header.mutex`, write framed records at `free_pos`, then
///   advance `free_pos`. Only one writer runs at a time across all processes.
/// - **Readers** never lock. They load `free_pos`, copy bytes, and re-check
///   that the writer has not lapped them while they were copying.
#[derive(Clone)]
pub struct RingBuffer {
    /// Control block at the start of the segment.
    pub(crate) header: *const RingHeader,

    /// First storage byte, directly after the header.
    pub(crate) storage: *mut u8,

    /// Storage size in bytes.
    pub(crate) capacity: u64,

    /// `capacity - 1`.
    pub(crate) mask: u64,
}

unsafe impl Send for RingBuffer {}
unsafe impl Sync for RingBuffer {}
