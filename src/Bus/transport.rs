use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_utils::Backoff;

use crate::config::TransportConfig;
use crate::error::{BusError, Result};
use crate::Core::notify::FutexNotifier;
use crate::Core::SharedMemory::{
    create_or_open_shared_memory, unlink_shared_memory, HeapMemory, SharedMemoryBackend,
    DEFAULT_MODE,
};
use crate::RMP::RingBuffer;
use crate::TP::TopicReaderInfo;

const RING_SUFFIX: &str = "rb";
const INFO_SUFFIX: &str = "ri";
const NOTIFY_SUFFIX: &str = "nt";

fn segment_name(name: &str, suffix: &str) -> String {
    format!("{}-{}", name, suffix)
}

/// Everything one process needs to talk on a bus: the mapped segments and
/// the views over them.
///
/// Construct once per process and share it (`Arc`) with publishers and
/// subscribers; the views point into memory this object owns.
pub struct Transport {
    config: TransportConfig,
    ring: RingBuffer,
    info: TopicReaderInfo,
    notifier: Arc<FutexNotifier>,
    creator: bool,
    _ring_shm: Box<dyn SharedMemoryBackend>,
    _info_shm: Box<dyn SharedMemoryBackend>,
    _notify_shm: Box<dyn SharedMemoryBackend>,
}

impl Transport {
    /// Map the named segments, creating and initializing any that do not
    /// exist yet.
    pub fn create_or_open(config: TransportConfig) -> Result<Self> {
        config.validate()?;
        let ring_shm = create_or_open_shared_memory(
            &segment_name(&config.name, RING_SUFFIX),
            RingBuffer::required_size(config.capacity()),
            DEFAULT_MODE,
        )?;
        let info_shm = create_or_open_shared_memory(
            &segment_name(&config.name, INFO_SUFFIX),
            TopicReaderInfo::required_size(config.max_readers),
            DEFAULT_MODE,
        )?;
        let notify_shm = create_or_open_shared_memory(
            &segment_name(&config.name, NOTIFY_SUFFIX),
            FutexNotifier::size(),
            DEFAULT_MODE,
        )?;
        Self::attach(config, ring_shm, info_shm, notify_shm)
    }

    /// A transport over private memory. Readers and writers must be threads
    /// of this process.
    pub fn in_process(config: TransportConfig) -> Result<Self> {
        config.validate()?;
        let ring_shm = Box::new(HeapMemory::new(RingBuffer::required_size(config.capacity()))?);
        let info_shm = Box::new(HeapMemory::new(TopicReaderInfo::required_size(
            config.max_readers,
        ))?);
        let notify_shm = Box::new(HeapMemory::new(FutexNotifier::size())?);
        Self::attach(config, ring_shm, info_shm, notify_shm)
    }

    /// Remove the named segments of bus `name`. Processes that still map
    /// them keep working; new processes get a fresh bus.
    pub fn unlink(name: &str) -> Result<()> {
        let mut first_err = None;
        for suffix in [RING_SUFFIX, INFO_SUFFIX, NOTIFY_SUFFIX] {
            if let Err(e) = unlink_shared_memory(&segment_name(name, suffix)) {
                tracing::warn!(name, suffix, error = %e, "failed to unlink segment");
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    fn attach(
        config: TransportConfig,
        ring_shm: Box<dyn SharedMemoryBackend>,
        info_shm: Box<dyn SharedMemoryBackend>,
        notify_shm: Box<dyn SharedMemoryBackend>,
    ) -> Result<Self> {
        let timeout = Duration::from_millis(config.open_timeout_ms);
        let capacity = config.capacity();

        let ring = unsafe {
            if ring_shm.is_creator() {
                RingBuffer::initialize(ring_shm.as_ptr(), capacity)?
            } else {
                wait_initialized(timeout, || RingBuffer::is_initialized(ring_shm.as_ptr()));
                RingBuffer::open(ring_shm.as_ptr())?
            }
        };
        if ring.capacity() != capacity {
            return Err(BusError::LayoutMismatch {
                segment: segment_name(&config.name, RING_SUFFIX),
                expected: capacity,
                found: ring.capacity(),
            });
        }

        let info = unsafe {
            if info_shm.is_creator() {
                TopicReaderInfo::initialize(info_shm.as_ptr(), config.max_readers)?
            } else {
                wait_initialized(timeout, || TopicReaderInfo::is_initialized(info_shm.as_ptr()));
                TopicReaderInfo::open(info_shm.as_ptr())?
            }
        };
        if info.slots().max_slots() != config.max_readers {
            return Err(BusError::LayoutMismatch {
                segment: segment_name(&config.name, INFO_SUFFIX),
                expected: config.max_readers as u64,
                found: info.slots().max_slots() as u64,
            });
        }

        let notifier = Arc::new(unsafe { FutexNotifier::new(notify_shm.as_ptr()) });
        let creator = ring_shm.is_creator();
        tracing::info!(
            name = %config.name,
            capacity,
            max_readers = config.max_readers,
            creator,
            "attached transport"
        );

        Ok(Self {
            config,
            ring,
            info,
            notifier,
            creator,
            _ring_shm: ring_shm,
            _info_shm: info_shm,
            _notify_shm: notify_shm,
        })
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    pub fn ring(&self) -> &RingBuffer {
        &self.ring
    }

    pub fn reader_info(&self) -> &TopicReaderInfo {
        &self.info
    }

    pub fn notifier(&self) -> &Arc<FutexNotifier> {
        &self.notifier
    }

    /// True if this handle created the ring buffer segment.
    pub fn is_creator(&self) -> bool {
        self.creator
    }

    pub fn stats(&self) -> TransportStats {
        let slots = self.info.slots();
        TransportStats {
            free_pos: self.ring.free_pos(),
            capacity: self.ring.capacity(),
            backpressure_count: self.ring.backpressure_count(),
            notification_count: self.ring.notification_count(),
            expired_reader_count: slots.expired_reader_count(),
            reader_generation: self.info.reader_gen(),
            active_range: slots.active_range(),
        }
    }
}

impl fmt::Debug for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        crate::Debug::StructDebug::debug_transport(self, f)
    }
}

/// Spin, then sleep, until `ready` or the deadline. The caller's open call
/// reports `NotInitialized` if the segment is still not ready.
fn wait_initialized<F: Fn() -> bool>(timeout: Duration, ready: F) {
    let deadline = Instant::now() + timeout;
    let backoff = Backoff::new();
    while !ready() && Instant::now() < deadline {
        if backoff.is_completed() {
            std::thread::sleep(Duration::from_millis(1));
        } else {
            backoff.snooze();
        }
    }
}

/// Point-in-time counters of a bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportStats {
    pub free_pos: u64,
    pub capacity: u64,
    pub backpressure_count: u64,
    pub notification_count: u64,
    pub expired_reader_count: u64,
    pub reader_generation: u64,
    pub active_range: (u16, u16),
}

impl fmt::Display for TransportStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "ringbuf.freePos {}", self.free_pos)?;
        writeln!(f, "ringbuf.capacity {}", self.capacity)?;
        writeln!(f, "ringbuf.backPressureCount {}", self.backpressure_count)?;
        writeln!(f, "ringbuf.notificationCount {}", self.notification_count)?;
        writeln!(f, "readerInfo.expiredReaders {}", self.expired_reader_count)?;
        writeln!(f, "readerInfo.readerGen {}", self.reader_generation)?;
        write!(
            f,
            "readerInfo.activeRange [{}, {})",
            self.active_range.0, self.active_range.1
        )
    }
}
