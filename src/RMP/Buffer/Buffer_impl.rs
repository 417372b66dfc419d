use std::mem::size_of;
use std::ptr;
use std::sync::atomic::Ordering::{Acquire, Relaxed, Release, SeqCst};

use super::layout::{
    buf_index, max_message_size, MessageHeader, RingHeader, HEADER_SIZE, MAX_CAPACITY,
};
use super::Buffer::RingBuffer;
use crate::error::{BusError, Result};
use crate::Core::mutex::RobustMutex;

const SEGMENT: &str = "ring buffer";

impl RingBuffer {
    /// Bytes taken by the control block in front of the storage.
    #[inline]
    pub const fn header_size() -> usize {
        size_of::<RingHeader>()
    }

    /// Segment size needed for a ring of `capacity` bytes.
    #[inline]
    pub fn required_size(capacity: u64) -> usize {
        Self::header_size() + capacity as usize
    }

    fn check_capacity(capacity: u64) -> Result<()> {
        if !capacity.is_power_of_two()
            || capacity <= HEADER_SIZE as u64
            || capacity > MAX_CAPACITY
        {
            return Err(BusError::InvalidCapacity { capacity });
        }
        Ok(())
    }

    /// Lay out a fresh ring buffer at `base`. Zeroes the cursor and statistics
    /// and marks the segment initialized last.
    ///
    /// # Safety
    /// `base` must be valid for `required_size(capacity)` writable bytes,
    /// suitably aligned, and not in use by any other view yet.
    pub unsafe fn initialize(base: *mut u8, capacity: u64) -> Result<Self> {
        Self::check_capacity(capacity)?;
        let header = base as *mut RingHeader;
        (*header).initialized.store(0, SeqCst);
        ptr::addr_of_mut!((*header).capacity).write(capacity);
        (*header).mutex.initialize()?;
        (*header).free_pos.store(0, Relaxed);
        (*header).backpressure_count.store(0, Relaxed);
        (*header).notification_count.store(0, Relaxed);
        (*header).initialized.store(1, Release);
        tracing::debug!(capacity, "initialized ring buffer");
        Ok(Self::view(base, capacity))
    }

    /// Attach to a ring buffer some other handle initialized.
    ///
    /// # Safety
    /// `base` must point at a mapped ring buffer segment that stays mapped for
    /// the lifetime of the returned view.
    pub unsafe fn open(base: *mut u8) -> Result<Self> {
        if !Self::is_initialized(base) {
            return Err(BusError::NotInitialized {
                segment: SEGMENT.into(),
            });
        }
        let capacity = ptr::addr_of!((*(base as *const RingHeader)).capacity).read();
        Self::check_capacity(capacity)?;
        Ok(Self::view(base, capacity))
    }

    /// # Safety
    /// `base` must point at least `header_size()` mapped bytes.
    pub unsafe fn is_initialized(base: *const u8) -> bool {
        (*(base as *const RingHeader)).initialized.load(Acquire) != 0
    }

    unsafe fn view(base: *mut u8, capacity: u64) -> Self {
        Self {
            header: base as *const RingHeader,
            storage: base.add(Self::header_size()),
            capacity,
            mask: capacity - 1,
        }
    }

    #[inline]
    fn header(&self) -> &RingHeader {
        unsafe { &*self.header }
    }

    #[inline]
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Largest payload `Writer::write_ex` accepts.
    #[inline]
    pub fn max_message_size(&self) -> usize {
        max_message_size(self.capacity)
    }

    #[inline]
    pub fn buf_index(&self, pos: u64) -> u64 {
        buf_index(pos, self.capacity)
    }

    /// The writer lock. Held for the duration of every write.
    pub fn mutex(&self) -> &RobustMutex {
        &self.header().mutex
    }

    #[inline]
    pub fn free_pos(&self) -> u64 {
        self.header().free_pos.load(SeqCst)
    }

    #[inline]
    pub fn set_free_pos(&self, pos: u64) {
        self.header().free_pos.store(pos, SeqCst)
    }

    #[inline]
    pub fn inc_free_pos(&self, n: u64) -> u64 {
        self.header().free_pos.fetch_add(n, SeqCst).wrapping_add(n)
    }

    pub fn backpressure_count(&self) -> u64 {
        self.header().backpressure_count.load(Relaxed)
    }

    pub fn inc_backpressure_count(&self) {
        self.header().backpressure_count.fetch_add(1, Relaxed);
    }

    pub fn notification_count(&self) -> u64 {
        self.header().notification_count.load(Relaxed)
    }

    pub fn inc_notification_count(&self) {
        self.header().notification_count.fetch_add(1, Relaxed);
    }

    /// Copy `dst.len()` bytes starting at stream position `pos`.
    /// A range running past the physical end continues at the start.
    pub fn read_at(&self, pos: u64, dst: &mut [u8]) {
        let index = self.buf_index(pos) as usize;
        let first = dst.len().min(self.capacity as usize - index);
        unsafe {
            ptr::copy_nonoverlapping(self.storage.add(index), dst.as_mut_ptr(), first);
            if first < dst.len() {
                ptr::copy_nonoverlapping(
                    self.storage,
                    dst.as_mut_ptr().add(first),
                    dst.len() - first,
                );
            }
        }
    }

    /// Copy `src` into the storage starting at stream position `pos`.
    /// Only the writer holding the ring mutex calls this.
    pub fn write_at(&self, pos: u64, src: &[u8]) {
        let index = self.buf_index(pos) as usize;
        let first = src.len().min(self.capacity as usize - index);
        unsafe {
            ptr::copy_nonoverlapping(src.as_ptr(), self.storage.add(index), first);
            if first < src.len() {
                ptr::copy_nonoverlapping(src.as_ptr().add(first), self.storage, src.len() - first);
            }
        }
    }

    pub fn read_header(&self, pos: u64) -> MessageHeader {
        let mut bytes = [0u8; HEADER_SIZE];
        self.read_at(pos, &mut bytes);
        MessageHeader::decode(bytes)
    }

    pub fn write_header(&self, pos: u64, header: MessageHeader) {
        self.write_at(pos, &header.encode());
    }

    /// Pointer to the control block, for diagnostics.
    pub fn header_ptr(&self) -> *const RingHeader {
        self.header
    }
}
