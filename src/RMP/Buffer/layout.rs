use std::sync::atomic::AtomicU64;

use crate::Core::mutex::RobustMutex;

/// Control block at the start of the ring buffer segment.
///
/// The layout is shared with every process that maps the segment and must
/// not change: `capacity | mutex | freePos | backpressureCount |
/// notificationCount | initialized`, followed directly by the storage bytes.
#[repr(C)]
pub struct RingHeader {
    /// Storage size in bytes, a power of two. Written once by the owner
    /// before `initialized`.
    pub capacity: u64,

    /// Serializes all writers across processes.
    pub mutex: RobustMutex,

    /// End of the written stream. Only ever grows; the low bits masked by
    /// `capacity - 1` address the storage.
    pub free_pos: AtomicU64,

    /// Number of writes that found a reader in the way.
    pub backpressure_count: AtomicU64,

    /// Number of wake-ups sent by writers.
    pub notification_count: AtomicU64,

    /// Non-zero once the owner finished setup. Written last.
    pub initialized: AtomicU64,
}

/// Size of a framed record header: `type:u8 | length:u32`, packed.
pub const HEADER_SIZE: usize = 5;

/// Record kinds in the byte stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RecordType {
    Message = 0,
    /// Filler up to the physical end of the storage.
    Padding = 1,
}

impl RecordType {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(RecordType::Message),
            1 => Some(RecordType::Padding),
            _ => None,
        }
    }
}

/// A decoded record header.
///
/// An all-zero header decodes as a zero-length message, which is never valid;
/// writers never produce zero-length records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    pub kind: u8,
    pub length: u32,
}

impl MessageHeader {
    pub fn message(length: u32) -> Self {
        Self {
            kind: RecordType::Message as u8,
            length,
        }
    }

    pub fn padding(length: u32) -> Self {
        Self {
            kind: RecordType::Padding as u8,
            length,
        }
    }

    pub fn record_type(&self) -> Option<RecordType> {
        RecordType::from_u8(self.kind)
    }

    pub fn is_valid(&self) -> bool {
        self.record_type().is_some() && self.length != 0
    }

    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let len = self.length.to_ne_bytes();
        [self.kind, len[0], len[1], len[2], len[3]]
    }

    pub fn decode(bytes: [u8; HEADER_SIZE]) -> Self {
        Self {
            kind: bytes[0],
            length: u32::from_ne_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]),
        }
    }
}

/// Physical storage index of a stream position.
#[inline]
pub fn buf_index(pos: u64, capacity: u64) -> u64 {
    pos & (capacity - 1)
}

/// `a > b` on a wrapping 64-bit stream.
#[inline]
pub fn greater_than(a: u64, b: u64) -> bool {
    (b.wrapping_sub(a) as i64) < 0
}

/// `a >= b` on a wrapping 64-bit stream.
#[inline]
pub fn greater_or_equal(a: u64, b: u64) -> bool {
    (b.wrapping_sub(a) as i64) <= 0
}

/// True once the bytes at `pos` may have been overwritten, i.e. the writer
/// is at least one full buffer ahead.
#[inline]
pub fn expired(pos: u64, free_pos: u64, capacity: u64) -> bool {
    greater_or_equal(free_pos, pos.wrapping_add(capacity))
}

/// Largest ring a record header can frame: any padding record then fits
/// the 31-bit length field.
pub const MAX_CAPACITY: u64 = 1 << 31;

/// Largest payload a single record can carry.
#[inline]
pub fn max_message_size(capacity: u64) -> usize {
    (capacity as usize)
        .saturating_sub(HEADER_SIZE)
        .min(i32::MAX as usize)
}
