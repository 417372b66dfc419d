// Layout conformance tests for the shared segments.
// Every process mapping a bus must agree on these offsets, so they are
// asserted field by field and printed to help when a platform differs.
use dmxp_bus::Core::RobustMutex;
use dmxp_bus::RMP::Buffer::{MessageHeader, RingBuffer, RingHeader, HEADER_SIZE};
use dmxp_bus::RMP::{ReaderSlot, ReaderSlotTable, SlotTableHeader};
use dmxp_bus::TP::{TopicInfoHeader, TopicReaderInfo};
use memoffset::offset_of;
use std::mem::{align_of, size_of};

#[test]
fn test_robust_mutex_matches_pthread_mutex() {
    println!(
        "RobustMutex => size: {}, align: {}",
        RobustMutex::size(),
        align_of::<RobustMutex>()
    );
    assert_eq!(RobustMutex::size(), size_of::<libc::pthread_mutex_t>());
    assert_eq!(align_of::<RobustMutex>(), align_of::<libc::pthread_mutex_t>());

    #[cfg(all(target_os = "linux", target_arch = "x86_64"))]
    assert_eq!(RobustMutex::size(), 40);
}

#[test]
fn test_ring_header_layout() {
    let m = RobustMutex::size();
    let off_capacity = offset_of!(RingHeader, capacity);
    let off_mutex = offset_of!(RingHeader, mutex);
    let off_free_pos = offset_of!(RingHeader, free_pos);
    let off_bp = offset_of!(RingHeader, backpressure_count);
    let off_notif = offset_of!(RingHeader, notification_count);
    let off_init = offset_of!(RingHeader, initialized);

    println!(
        "RingHeader => size: {}, offsets: [capacity:{off_capacity}, mutex:{off_mutex}, free_pos:{off_free_pos}, backpressure_count:{off_bp}, notification_count:{off_notif}, initialized:{off_init}]",
        size_of::<RingHeader>()
    );

    assert_eq!(off_capacity, 0);
    assert_eq!(off_mutex, 8);
    assert_eq!(off_free_pos, 8 + m);
    assert_eq!(off_bp, 16 + m);
    assert_eq!(off_notif, 24 + m);
    assert_eq!(off_init, 32 + m);
    assert_eq!(size_of::<RingHeader>(), 40 + m);
    // storage follows the header directly
    assert_eq!(RingBuffer::header_size(), 40 + m);
    assert_eq!(RingBuffer::required_size(1024), 40 + m + 1024);
}

#[test]
fn test_slot_table_layout() {
    let m = RobustMutex::size();

    assert_eq!(offset_of!(SlotTableHeader, expired_reader_count), 0);
    assert_eq!(offset_of!(SlotTableHeader, initialized), 8);
    assert_eq!(offset_of!(SlotTableHeader, max_slots), 10);
    assert_eq!(offset_of!(SlotTableHeader, active_range), 12);
    assert_eq!(size_of::<SlotTableHeader>(), 16);

    assert_eq!(offset_of!(ReaderSlot, lock), 0);
    assert_eq!(offset_of!(ReaderSlot, position), m);
    assert_eq!(offset_of!(ReaderSlot, active), m + 8);
    assert_eq!(size_of::<ReaderSlot>(), m + 16);

    assert_eq!(ReaderSlotTable::required_size(3), 16 + 3 * (m + 16));
    println!("ReaderSlot => size: {}", size_of::<ReaderSlot>());
}

#[test]
fn test_topic_info_layout() {
    assert_eq!(offset_of!(TopicInfoHeader, reader_gen), 0);
    assert_eq!(offset_of!(TopicInfoHeader, initialized), 8);
    assert_eq!(size_of::<TopicInfoHeader>(), 16);
    assert_eq!(
        TopicReaderInfo::required_size(4),
        16 + ReaderSlotTable::required_size(4)
    );
}

#[test]
fn test_message_header_is_packed() {
    assert_eq!(HEADER_SIZE, 5);

    let bytes = MessageHeader::message(0x0102_0304).encode();
    assert_eq!(bytes[0], 0);
    assert_eq!(&bytes[1..], &0x0102_0304u32.to_ne_bytes());

    let padding = MessageHeader::padding(7).encode();
    assert_eq!(padding[0], 1);
    assert_eq!(MessageHeader::decode(padding), MessageHeader::padding(7));
}
