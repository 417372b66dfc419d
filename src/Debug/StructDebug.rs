use std::fmt;

use crate::Bus::Transport;
use crate::RMP::Buffer::RingBuffer;
use crate::RMP::ReaderSlotTable;
use crate::TP::TopicReaderInfo;

/// Debug function for RingBuffer
///
/// Shows the segment location and live cursor/statistics without touching
/// the storage bytes.
pub fn debug_ring_buffer(ring: &RingBuffer, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("RingBuffer")
        .field("header", &format_args!("{:p}", ring.header_ptr()))
        .field("capacity", &ring.capacity())
        .field("free_pos", &ring.free_pos())
        .field("backpressure_count", &ring.backpressure_count())
        .field("notification_count", &ring.notification_count())
        .finish_non_exhaustive()
}

/// Debug function for ReaderSlotTable
///
/// Lists the active range and each active slot's published position.
pub fn debug_reader_slot_table(table: &ReaderSlotTable, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let (min, max) = table.active_range();
    let active: Vec<(u16, u64)> = (min..max)
        .filter(|&id| table.is_active(id))
        .map(|id| (id, table.position(id)))
        .collect();
    f.debug_struct("ReaderSlotTable")
        .field("header", &format_args!("{:p}", table.header_ptr()))
        .field("max_slots", &table.max_slots())
        .field("active_range", &format_args!("[{}, {})", min, max))
        .field("active", &active)
        .field("expired_reader_count", &table.expired_reader_count())
        .finish()
}

pub fn debug_topic_reader_info(info: &TopicReaderInfo, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("TopicReaderInfo")
        .field("header", &format_args!("{:p}", info.header_ptr()))
        .field("reader_gen", &info.reader_gen())
        .field("slots", info.slots())
        .finish()
}

/// Debug function for Transport
pub fn debug_transport(transport: &Transport, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Transport")
        .field("name", &transport.config().name)
        .field("creator", &transport.is_creator())
        .field("ring", transport.ring())
        .field("reader_info", transport.reader_info())
        .field("shm", &"<opaque>")
        .finish()
}
