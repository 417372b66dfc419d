use super::Buffer::RingBuffer;

/// Two-phase consumption of a record.
///
/// `copy` takes the bytes out of the ring; the reader then re-checks that the
/// writer did not overwrite them during the copy and only then calls
/// `confirm`. Returning false from `copy` drops the record without a confirm.
pub trait CopyConfirm {
    fn copy(&mut self, ring: &RingBuffer, pos: u64, len: usize) -> bool;
    fn confirm(&mut self);
}

/// Copies each record into a reusable buffer and hands confirmed records to
/// a callback.
pub struct CopyConfirmHandler<F> {
    buffer: Vec<u8>,
    on_message: F,
}

impl<F: FnMut(&[u8])> CopyConfirmHandler<F> {
    pub fn new(on_message: F) -> Self {
        Self {
            buffer: Vec::new(),
            on_message,
        }
    }

    pub fn with_capacity(capacity: usize, on_message: F) -> Self {
        Self {
            buffer: Vec::with_capacity(capacity),
            on_message,
        }
    }

    /// Bytes of the last copied record.
    pub fn last_copied(&self) -> &[u8] {
        &self.buffer
    }
}

impl<F: FnMut(&[u8])> CopyConfirm for CopyConfirmHandler<F> {
    fn copy(&mut self, ring: &RingBuffer, pos: u64, len: usize) -> bool {
        self.buffer.resize(len, 0);
        ring.read_at(pos, &mut self.buffer);
        true
    }

    fn confirm(&mut self) {
        (self.on_message)(&self.buffer);
    }
}
