// Wake-up hints between writers and readers.
//
// Losing a notification only adds latency: readers derive their work from the
// ring buffer, never from the notification itself.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use super::futex::{futex_wait, futex_wake_all};

/// Best-effort wake-up channel. Notifications may coalesce.
pub trait Notifier: Send + Sync {
    fn notify_all(&self);

    /// Wait until a notification newer than the last one this handle observed
    /// arrives, or until `timeout` passes. Returns true if one was observed.
    fn wait_for_notification(&self, timeout: Option<Duration>) -> bool;
}

/// Notifier over a sequence word, normally placed in its own shared segment.
///
/// Every process keeps its own `FutexNotifier` over the same word; each tracks
/// the last sequence it has seen.
pub struct FutexNotifier {
    word: *const AtomicU32,
    seen: AtomicU32,
}

unsafe impl Send for FutexNotifier {}
unsafe impl Sync for FutexNotifier {}

impl FutexNotifier {
    pub const fn size() -> usize {
        std::mem::size_of::<AtomicU32>()
    }

    /// # Safety
    /// `word` must be 4-byte aligned and stay mapped for the notifier's lifetime.
    pub unsafe fn new(word: *mut u8) -> Self {
        let word = word as *const AtomicU32;
        let seen = (*word).load(Ordering::Acquire);
        Self {
            word,
            seen: AtomicU32::new(seen),
        }
    }

    #[inline]
    fn word(&self) -> &AtomicU32 {
        unsafe { &*self.word }
    }

    /// Current sequence value of the shared word.
    pub fn sequence(&self) -> u32 {
        self.word().load(Ordering::Acquire)
    }
}

impl Notifier for FutexNotifier {
    fn notify_all(&self) {
        self.word().fetch_add(1, Ordering::Release);
        futex_wake_all(self.word());
    }

    fn wait_for_notification(&self, timeout: Option<Duration>) -> bool {
        let seen = self.seen.load(Ordering::Relaxed);
        if self.sequence() == seen {
            futex_wait(self.word(), seen, timeout);
        }
        let now = self.sequence();
        self.seen.store(now, Ordering::Relaxed);
        now != seen
    }
}

/// Notifier that never wakes anybody. Readers driven by polling use it.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn notify_all(&self) {}

    fn wait_for_notification(&self, timeout: Option<Duration>) -> bool {
        if let Some(timeout) = timeout {
            std::thread::sleep(timeout);
        }
        false
    }
}
