use super::reader_info::ReaderSlotTable;
use super::Buffer::layout::{expired, greater_than, MessageHeader, HEADER_SIZE};
use super::Buffer::RingBuffer;
use crate::error::{BusError, Result};
use crate::Core::mutex::LockOutcome;

/// What a writer does after finding a reader in the way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackpressureAction {
    /// Check again, ignoring readers that have not moved past the reported
    /// position.
    Retry,
    /// Write anyway. Readers in the way will observe expiration.
    Overwrite,
}

enum Step {
    Written,
    /// Position of a reader the write would expire.
    Backpressure(u64),
}

/// Appends framed records to the ring buffer.
///
/// Every write holds the ring mutex, so writers in all processes are
/// serialized. Before advancing, the writer checks each active reader slot
/// and reports backpressure instead of overwriting unread data.
#[derive(Clone)]
pub struct Writer {
    ring: RingBuffer,
    readers: ReaderSlotTable,
}

impl Writer {
    pub fn new(ring: RingBuffer, readers: ReaderSlotTable) -> Self {
        Self { ring, readers }
    }

    pub fn ring(&self) -> &RingBuffer {
        &self.ring
    }

    pub fn readers(&self) -> &ReaderSlotTable {
        &self.readers
    }

    pub fn max_message_size(&self) -> usize {
        self.ring.max_message_size()
    }

    /// Write one record, consulting `on_backpressure(reader_pos, free_pos)`
    /// whenever an active reader would be overwritten.
    ///
    /// Blocks for as long as the callback keeps returning
    /// [`BackpressureAction::Retry`] while that reader keeps making progress.
    pub fn write_ex<F>(&self, payload: &[u8], mut on_backpressure: F) -> Result<()>
    where
        F: FnMut(u64, u64) -> BackpressureAction,
    {
        if payload.is_empty() {
            return Err(BusError::EmptyMessage);
        }
        let max = self.max_message_size();
        if payload.len() > max {
            return Err(BusError::MessageTooLarge {
                size: payload.len(),
                max,
            });
        }

        let guard = self.ring.mutex().guard();
        if guard.outcome() == LockOutcome::Recovered {
            tracing::warn!(
                free_pos = self.ring.free_pos(),
                "previous writer died holding the ring lock; its record may be truncated"
            );
        }

        let mut skip = None;
        loop {
            match self.try_write(payload, true, skip) {
                Step::Written => break,
                Step::Backpressure(reader_pos) => {
                    self.ring.inc_backpressure_count();
                    let free_pos = self.ring.free_pos();
                    tracing::debug!(reader_pos, free_pos, "write backpressure");
                    match on_backpressure(reader_pos, free_pos) {
                        BackpressureAction::Retry => skip = Some(reader_pos),
                        BackpressureAction::Overwrite => {
                            self.try_write(payload, false, None);
                            break;
                        }
                    }
                }
            }
        }
        drop(guard);
        Ok(())
    }

    /// One attempt. Caller holds the ring mutex.
    fn try_write(&self, payload: &[u8], check: bool, skip: Option<u64>) -> Step {
        let capacity = self.ring.capacity();
        let free_pos = self.ring.free_pos();
        let to_end = capacity - self.ring.buf_index(free_pos);
        let record = (HEADER_SIZE + payload.len()) as u64;

        // A slot too small for a header plus a byte is skipped blank.
        let blank = to_end <= HEADER_SIZE as u64;
        let padding = !blank && to_end < record;
        let needed = if blank || padding { to_end + record } else { record };

        if check {
            if let Some(reader_pos) = self.find_backpressure(free_pos, needed, skip) {
                return Step::Backpressure(reader_pos);
            }
        }

        let mut pos = free_pos;
        if padding {
            self.ring
                .write_header(pos, MessageHeader::padding((to_end - HEADER_SIZE as u64) as u32));
        }
        if blank || padding {
            pos = self.ring.inc_free_pos(to_end);
        }

        self.ring
            .write_header(pos, MessageHeader::message(payload.len() as u32));
        self.ring.write_at(pos + HEADER_SIZE as u64, payload);
        self.ring.inc_free_pos(record);
        Step::Written
    }

    /// First active reader that writing `needed` bytes would expire.
    fn find_backpressure(&self, free_pos: u64, needed: u64, skip: Option<u64>) -> Option<u64> {
        let capacity = self.ring.capacity();
        let new_free_pos = free_pos.wrapping_add(needed);
        let (min, max) = self.readers.active_range();

        for id in min..max {
            if !self.readers.is_active(id) {
                continue;
            }
            let reader_pos = self.readers.position(id);
            if expired(reader_pos, free_pos, capacity) {
                // already lost, nothing left to protect
                continue;
            }
            if let Some(skip) = skip {
                if !greater_than(reader_pos, skip) {
                    continue;
                }
            }
            if expired(reader_pos, new_free_pos, capacity) {
                return Some(reader_pos);
            }
        }
        None
    }
}
