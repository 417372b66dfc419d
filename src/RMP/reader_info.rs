// Table of reader slots consulted by writers for backpressure.

use std::mem::size_of;
use std::ptr;
use std::sync::atomic::Ordering::{Acquire, Relaxed, Release, SeqCst};
use std::sync::atomic::{AtomicU16, AtomicU32, AtomicU64};

use crate::error::{BusError, Result};
use crate::Core::mutex::RobustMutex;

/// Slot table control block: `expiredReaderCount | initialized |
/// maxSlots | packedActiveRange`, followed by `maxSlots` [`ReaderSlot`]s.
#[repr(C)]
pub struct SlotTableHeader {
    pub expired_reader_count: AtomicU64,
    pub initialized: AtomicU16,
    pub max_slots: u16,
    /// `(min << 16) | (max + 1)` where `[min, max)` covers every active slot.
    pub active_range: AtomicU32,
}

/// One reader's consumption record.
#[repr(C)]
pub struct ReaderSlot {
    /// Held by the owning reader for as long as it owns the slot.
    pub lock: RobustMutex,
    /// Last position the reader published.
    pub position: AtomicU64,
    /// Non-zero while writers must respect `position`.
    pub active: AtomicU64,
}

pub type SlotId = u16;

/// View over a slot table living in shared memory.
#[derive(Clone)]
pub struct ReaderSlotTable {
    header: *const SlotTableHeader,
    slots: *const ReaderSlot,
    max_slots: u16,
}

unsafe impl Send for ReaderSlotTable {}
unsafe impl Sync for ReaderSlotTable {}

const SEGMENT: &str = "reader slot table";

#[inline]
fn pack_range(min: u32, max_plus_one: u32) -> u32 {
    (min << 16) | max_plus_one
}

impl ReaderSlotTable {
    pub fn required_size(max_slots: u16) -> usize {
        size_of::<SlotTableHeader>() + max_slots as usize * size_of::<ReaderSlot>()
    }

    /// Lay out an empty table with no active slots.
    ///
    /// # Safety
    /// `base` must be valid for `required_size(max_slots)` writable, 8-byte
    /// aligned bytes not yet used by any other view.
    pub unsafe fn initialize(base: *mut u8, max_slots: u16) -> Result<Self> {
        let header = base as *mut SlotTableHeader;
        (*header).initialized.store(0, SeqCst);
        (*header).expired_reader_count.store(0, Relaxed);
        ptr::addr_of_mut!((*header).max_slots).write(max_slots);
        (*header)
            .active_range
            .store(pack_range(max_slots as u32, 0), Relaxed);

        let table = Self::view(base, max_slots);
        for id in 0..max_slots {
            let slot = table.slot(id);
            slot.lock.initialize()?;
            slot.position.store(0, Relaxed);
            slot.active.store(0, Relaxed);
        }
        (*header).initialized.store(1, Release);
        tracing::debug!(max_slots, "initialized reader slot table");
        Ok(table)
    }

    /// # Safety
    /// `base` must point at a mapped slot table that outlives the view.
    pub unsafe fn open(base: *mut u8) -> Result<Self> {
        let header = base as *const SlotTableHeader;
        if (*header).initialized.load(Acquire) == 0 {
            return Err(BusError::NotInitialized {
                segment: SEGMENT.into(),
            });
        }
        let max_slots = ptr::addr_of!((*header).max_slots).read();
        Ok(Self::view(base, max_slots))
    }

    unsafe fn view(base: *mut u8, max_slots: u16) -> Self {
        Self {
            header: base as *const SlotTableHeader,
            slots: base.add(size_of::<SlotTableHeader>()) as *const ReaderSlot,
            max_slots,
        }
    }

    #[inline]
    fn header(&self) -> &SlotTableHeader {
        unsafe { &*self.header }
    }

    pub fn is_initialized(&self) -> bool {
        self.header().initialized.load(Acquire) != 0
    }

    #[inline]
    pub fn max_slots(&self) -> u16 {
        self.max_slots
    }

    /// # Panics
    /// If `id` is outside the table.
    #[inline]
    pub fn slot(&self, id: SlotId) -> &ReaderSlot {
        assert!(id < self.max_slots, "slot {} out of range", id);
        unsafe { &*self.slots.add(id as usize) }
    }

    pub fn is_active(&self, id: SlotId) -> bool {
        self.slot(id).active.load(SeqCst) != 0
    }

    pub fn position(&self, id: SlotId) -> u64 {
        self.slot(id).position.load(SeqCst)
    }

    pub fn expired_reader_count(&self) -> u64 {
        self.header().expired_reader_count.load(Relaxed)
    }

    pub fn inc_expired_reader_count(&self) {
        self.header().expired_reader_count.fetch_add(1, Relaxed);
    }

    /// Claim the first free slot. The slot lock stays held by the calling
    /// thread until [`free`](Self::free); a slot whose holder died is reclaimed.
    pub fn alloc(&self) -> Option<SlotId> {
        for id in 0..self.max_slots {
            if let Some(outcome) = self.slot(id).lock.try_lock() {
                self.deactivate(id);
                tracing::debug!(slot = id, ?outcome, "allocated reader slot");
                return Some(id);
            }
        }
        tracing::warn!(max_slots = self.max_slots, "no free reader slot");
        None
    }

    /// Release a slot. Must run on the thread that allocated it.
    pub fn free(&self, id: SlotId) {
        self.deactivate(id);
        self.slot(id).lock.unlock();
        tracing::debug!(slot = id, "freed reader slot");
    }

    pub fn activate(&self, id: SlotId, pos: u64) {
        let slot = self.slot(id);
        slot.position.store(pos, SeqCst);
        slot.active.store(1, SeqCst);
        self.update_active_range();
    }

    pub fn deactivate(&self, id: SlotId) {
        self.slot(id).active.store(0, SeqCst);
        self.update_active_range();
    }

    /// Publish a reader's progress.
    pub fn set_position(&self, id: SlotId, pos: u64) {
        self.slot(id).position.store(pos, SeqCst);
    }

    /// `[min, max)` over the active slots; empty when `min >= max`.
    pub fn active_range(&self) -> (u16, u16) {
        let packed = self.header().active_range.load(SeqCst);
        ((packed >> 16) as u16, packed as u16)
    }

    /// Rescan the active flags and publish a new range. Not linearizable with
    /// concurrent activate/deactivate; writers re-check each slot's flag.
    fn update_active_range(&self) {
        let range = &self.header().active_range;
        let mut old = range.load(SeqCst);
        loop {
            let mut min = self.max_slots as u32;
            let mut max = 0u32;
            for id in 0..self.max_slots {
                if self.is_active(id) {
                    min = min.min(id as u32);
                    max = max.max(id as u32 + 1);
                }
            }
            let packed = pack_range(min, max);
            match range.compare_exchange_weak(old, packed, SeqCst, SeqCst) {
                Ok(_) => return,
                Err(current) => old = current,
            }
        }
    }

    pub fn header_ptr(&self) -> *const SlotTableHeader {
        self.header
    }
}
