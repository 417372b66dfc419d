use std::sync::atomic::fence;
use std::sync::atomic::Ordering::{Acquire, Relaxed, SeqCst};
use std::sync::atomic::AtomicU64;

use crossbeam_utils::CachePadded;

use super::copy_confirm::CopyConfirm;
use super::reader_info::{ReaderSlotTable, SlotId};
use super::slot_keeper;
use super::Buffer::layout::{expired, greater_or_equal, greater_than, RecordType, HEADER_SIZE};
use super::Buffer::RingBuffer;
use crate::error::{BusError, Result};

/// Outcome of a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadResult {
    /// Caught up; the payload is the new position.
    Success(u64),
    /// The writer lapped the reader at this position. Records from here on
    /// were lost.
    Expired(u64),
}

/// Lock-free scanner over the ring buffer.
#[derive(Clone)]
pub struct Reader {
    ring: RingBuffer,
}

impl Reader {
    pub fn new(ring: RingBuffer) -> Self {
        Self { ring }
    }

    pub fn ring(&self) -> &RingBuffer {
        &self.ring
    }

    /// Consume records from `pos` up to the current free position.
    ///
    /// Progress is stored into `published` every half buffer and once at the
    /// end, so writers see it for backpressure without a store per record.
    pub fn read_ex<C>(&self, pos: u64, published: &AtomicU64, handler: &mut C) -> Result<ReadResult>
    where
        C: CopyConfirm + ?Sized,
    {
        let ring = &self.ring;
        let capacity = ring.capacity();
        let publish_lag = capacity >> 1;

        let free_pos = ring.free_pos();
        if greater_than(pos, free_pos) {
            return Err(BusError::InvalidPosition { pos, free_pos });
        }

        let mut pos = pos;
        let mut last_published = published.load(Relaxed);
        loop {
            let free_pos = ring.free_pos();
            if pos == free_pos {
                break;
            }

            let to_end = capacity - ring.buf_index(pos);
            if to_end <= HEADER_SIZE as u64 {
                pos = pos.wrapping_add(to_end);
                continue;
            }

            if expired(pos, free_pos, capacity) {
                return Ok(ReadResult::Expired(pos));
            }
            let header = ring.read_header(pos);
            fence(Acquire);
            if !header.is_valid()
                || HEADER_SIZE as u64 + header.length as u64 > to_end
                || expired(pos, ring.free_pos(), capacity)
            {
                return Ok(ReadResult::Expired(pos));
            }

            if header.record_type() == Some(RecordType::Message) {
                let data_pos = pos.wrapping_add(HEADER_SIZE as u64);
                if handler.copy(ring, data_pos, header.length as usize) {
                    fence(Acquire);
                    if expired(pos, ring.free_pos(), capacity) {
                        return Ok(ReadResult::Expired(pos));
                    }
                    handler.confirm();
                }
            }

            pos = pos.wrapping_add(HEADER_SIZE as u64 + header.length as u64);
            if greater_or_equal(pos, last_published.wrapping_add(publish_lag)) {
                published.store(pos, SeqCst);
                last_published = pos;
            }
        }

        published.store(pos, SeqCst);
        Ok(ReadResult::Success(pos))
    }
}

/// A reader that owns a slot, so writers wait for it.
///
/// The slot is claimed on construction and released on drop, from whichever
/// thread. It is held by the process-wide slot keeper thread, so it stays
/// claimed until dropped or until the process dies.
pub struct ReaderWithBackpressure {
    reader: Reader,
    readers: ReaderSlotTable,
    slot: SlotId,
    pos: CachePadded<AtomicU64>,
}

impl ReaderWithBackpressure {
    pub fn new(ring: RingBuffer, readers: ReaderSlotTable) -> Result<Self> {
        let slot = slot_keeper::alloc(&readers)?.ok_or(BusError::AllocationExhausted {
            max_slots: readers.max_slots(),
        })?;
        Ok(Self {
            reader: Reader::new(ring),
            readers,
            slot,
            pos: CachePadded::new(AtomicU64::new(0)),
        })
    }

    pub fn slot(&self) -> SlotId {
        self.slot
    }

    /// Local read position. After an expiration it jumps to the free
    /// position observed at that time.
    pub fn pos(&self) -> u64 {
        self.pos.load(SeqCst)
    }

    pub fn is_active(&self) -> bool {
        self.readers.is_active(self.slot)
    }

    /// Start reading from the current end of the stream.
    pub fn activate(&self) {
        let free_pos = self.reader.ring().free_pos();
        self.pos.store(free_pos, SeqCst);
        self.readers.activate(self.slot, free_pos);
    }

    pub fn deactivate(&self) {
        self.readers.deactivate(self.slot);
    }

    pub fn read_ex<C>(&self, handler: &mut C) -> Result<ReadResult>
    where
        C: CopyConfirm + ?Sized,
    {
        if !self.is_active() {
            return Err(BusError::ReaderInactive);
        }
        let published = &self.readers.slot(self.slot).position;
        let result = self.reader.read_ex(self.pos(), published, handler)?;
        match result {
            ReadResult::Success(pos) => self.pos.store(pos, SeqCst),
            ReadResult::Expired(pos) => {
                self.readers.inc_expired_reader_count();
                // the gap is dropped; carry on from the current end
                let free_pos = self.reader.ring().free_pos();
                self.pos.store(free_pos, SeqCst);
                self.readers.set_position(self.slot, free_pos);
                tracing::warn!(slot = self.slot, pos, free_pos, "reader expired");
            }
        }
        Ok(result)
    }
}

impl Drop for ReaderWithBackpressure {
    fn drop(&mut self) {
        slot_keeper::free(&self.readers, self.slot);
    }
}
