// RMP: the raw ring buffer transport (ring, framing, writer, readers, slots).

pub mod copy_confirm;
mod debug;
pub mod reader;
pub mod reader_info;
mod slot_keeper;
pub mod writer;

pub use copy_confirm::{CopyConfirm, CopyConfirmHandler};
pub use reader::{ReadResult, Reader, ReaderWithBackpressure};
pub use reader_info::{ReaderSlot, ReaderSlotTable, SlotId, SlotTableHeader};
pub use writer::{BackpressureAction, Writer};
pub use Buffer::RingBuffer;

#[allow(non_snake_case)]
pub mod Buffer {
    pub mod Buffer;
    pub mod Buffer_impl;
    pub mod layout;
    pub use layout::{MessageHeader, RecordType, RingHeader, HEADER_SIZE, MAX_CAPACITY};
    pub use Buffer::RingBuffer; // re-export for stable path
}
