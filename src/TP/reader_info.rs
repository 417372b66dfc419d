use std::mem::size_of;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering::{Acquire, Release, SeqCst};

use crate::error::{BusError, Result};
use crate::RMP::ReaderSlotTable;

/// Topic-layer reader bookkeeping: `readerGeneration | initialized`,
/// followed by the RMP reader slot table.
#[repr(C)]
pub struct TopicInfoHeader {
    pub reader_gen: AtomicU64,
    pub initialized: AtomicU64,
}

const SEGMENT: &str = "topic reader info";

#[derive(Clone)]
pub struct TopicReaderInfo {
    header: *const TopicInfoHeader,
    slots: ReaderSlotTable,
}

unsafe impl Send for TopicReaderInfo {}
unsafe impl Sync for TopicReaderInfo {}

impl TopicReaderInfo {
    pub fn required_size(max_slots: u16) -> usize {
        size_of::<TopicInfoHeader>() + ReaderSlotTable::required_size(max_slots)
    }

    /// # Safety
    /// Same contract as [`ReaderSlotTable::initialize`] for
    /// `required_size(max_slots)` bytes at `base`.
    pub unsafe fn initialize(base: *mut u8, max_slots: u16) -> Result<Self> {
        let header = base as *const TopicInfoHeader;
        (*header).initialized.store(0, SeqCst);
        (*header).reader_gen.store(0, SeqCst);
        let slots = ReaderSlotTable::initialize(base.add(size_of::<TopicInfoHeader>()), max_slots)?;
        (*header).initialized.store(1, Release);
        Ok(Self { header, slots })
    }

    /// # Safety
    /// `base` must point at a mapped topic reader info segment that outlives
    /// the view.
    pub unsafe fn open(base: *mut u8) -> Result<Self> {
        if !Self::is_initialized(base) {
            return Err(BusError::NotInitialized {
                segment: SEGMENT.into(),
            });
        }
        let slots = ReaderSlotTable::open(base.add(size_of::<TopicInfoHeader>()))?;
        Ok(Self {
            header: base as *const TopicInfoHeader,
            slots,
        })
    }

    /// # Safety
    /// `base` must point at least `size_of::<TopicInfoHeader>()` mapped bytes.
    pub unsafe fn is_initialized(base: *const u8) -> bool {
        (*(base as *const TopicInfoHeader)).initialized.load(Acquire) != 0
    }

    #[inline]
    fn header(&self) -> &TopicInfoHeader {
        unsafe { &*self.header }
    }

    pub fn reader_gen(&self) -> u64 {
        self.header().reader_gen.load(SeqCst)
    }

    /// Start a new generation. Channel readers created from now on ignore
    /// messages framed with an older generation. Returns the new value.
    pub fn advance_generation(&self) -> u64 {
        self.header().reader_gen.fetch_add(1, SeqCst) + 1
    }

    pub fn slots(&self) -> &ReaderSlotTable {
        &self.slots
    }

    pub fn header_ptr(&self) -> *const TopicInfoHeader {
        self.header
    }
}

impl std::fmt::Debug for TopicReaderInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        crate::Debug::StructDebug::debug_topic_reader_info(self, f)
    }
}
