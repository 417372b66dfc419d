// Process-shared mutex that survives its holder dying.
//
// The mutex lives inside a shared memory segment. A holder that exits while
// locked leaves the mutex in the owner-died state; the next lock or try_lock
// marks it consistent and reports `LockOutcome::Recovered`.

use std::cell::UnsafeCell;
use std::io;
use std::mem::{size_of, MaybeUninit};

/// How a lock was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockOutcome {
    Acquired,
    /// The previous holder died while holding the lock. State it protected
    /// may be half-written.
    Recovered,
}

/// A `pthread_mutex_t` configured as process-shared and robust.
#[repr(C)]
pub struct RobustMutex {
    inner: UnsafeCell<libc::pthread_mutex_t>,
}

unsafe impl Send for RobustMutex {}
unsafe impl Sync for RobustMutex {}

impl RobustMutex {
    /// In-memory footprint, for laying out shared segments.
    pub const fn size() -> usize {
        size_of::<Self>()
    }

    /// Prepare the mutex in place.
    ///
    /// # Safety
    /// `self` must point into writable memory that no other thread or process
    /// is using as a mutex yet. Only the segment owner calls this, once.
    pub unsafe fn initialize(&self) -> io::Result<()> {
        let mut attr = MaybeUninit::<libc::pthread_mutexattr_t>::uninit();
        check(
            libc::pthread_mutexattr_init(attr.as_mut_ptr()),
            "pthread_mutexattr_init",
        )?;
        let result = Self::configure(attr.as_mut_ptr()).and_then(|_| {
            check(
                libc::pthread_mutex_init(self.inner.get(), attr.as_ptr()),
                "pthread_mutex_init",
            )
        });
        libc::pthread_mutexattr_destroy(attr.as_mut_ptr());
        result
    }

    #[cfg(target_os = "linux")]
    unsafe fn configure(attr: *mut libc::pthread_mutexattr_t) -> io::Result<()> {
        check(
            libc::pthread_mutexattr_setpshared(attr, libc::PTHREAD_PROCESS_SHARED),
            "pthread_mutexattr_setpshared",
        )?;
        check(
            libc::pthread_mutexattr_setrobust(attr, libc::PTHREAD_MUTEX_ROBUST),
            "pthread_mutexattr_setrobust",
        )
    }

    #[cfg(not(target_os = "linux"))]
    unsafe fn configure(_attr: *mut libc::pthread_mutexattr_t) -> io::Result<()> {
        // TODO: lease-based emulation for targets without robust pthread mutexes.
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "Robust process-shared mutexes only supported on Linux",
        ))
    }

    /// Block until the mutex is held by the caller.
    pub fn lock(&self) -> LockOutcome {
        let rc = unsafe { libc::pthread_mutex_lock(self.inner.get()) };
        match self.outcome(rc, "pthread_mutex_lock") {
            Some(outcome) => outcome,
            None => fatal("pthread_mutex_lock", rc),
        }
    }

    /// Take the mutex if it is free. `None` means another owner holds it.
    pub fn try_lock(&self) -> Option<LockOutcome> {
        let rc = unsafe { libc::pthread_mutex_trylock(self.inner.get()) };
        if rc == libc::EBUSY {
            return None;
        }
        match self.outcome(rc, "pthread_mutex_trylock") {
            Some(outcome) => Some(outcome),
            None => fatal("pthread_mutex_trylock", rc),
        }
    }

    /// Release the mutex. Must be called by the thread that locked it.
    pub fn unlock(&self) {
        let rc = unsafe { libc::pthread_mutex_unlock(self.inner.get()) };
        if rc != 0 {
            fatal("pthread_mutex_unlock", rc);
        }
    }

    /// Lock and return a guard that unlocks on drop.
    pub fn guard(&self) -> RobustMutexGuard<'_> {
        let outcome = self.lock();
        RobustMutexGuard {
            mutex: self,
            outcome,
        }
    }

    fn outcome(&self, rc: i32, op: &'static str) -> Option<LockOutcome> {
        match rc {
            0 => Some(LockOutcome::Acquired),
            libc::EOWNERDEAD => {
                self.make_consistent();
                tracing::warn!(op, "recovered mutex from dead owner");
                Some(LockOutcome::Recovered)
            }
            _ => None,
        }
    }

    #[cfg(target_os = "linux")]
    fn make_consistent(&self) {
        let rc = unsafe { libc::pthread_mutex_consistent(self.inner.get()) };
        if rc != 0 {
            fatal("pthread_mutex_consistent", rc);
        }
    }

    #[cfg(not(target_os = "linux"))]
    fn make_consistent(&self) {
        fatal("pthread_mutex_consistent", libc::ENOSYS);
    }
}

/// Unlocks on drop.
pub struct RobustMutexGuard<'a> {
    mutex: &'a RobustMutex,
    outcome: LockOutcome,
}

impl RobustMutexGuard<'_> {
    pub fn outcome(&self) -> LockOutcome {
        self.outcome
    }
}

impl Drop for RobustMutexGuard<'_> {
    fn drop(&mut self) {
        self.mutex.unlock();
    }
}

fn check(rc: i32, op: &'static str) -> io::Result<()> {
    if rc == 0 {
        Ok(())
    } else {
        let err = io::Error::from_raw_os_error(rc);
        Err(io::Error::new(err.kind(), format!("{} failed: {}", op, err)))
    }
}

/// A mutex that cannot be locked or released leaves the segment unusable.
fn fatal(op: &'static str, rc: i32) -> ! {
    tracing::error!(op, error = %io::Error::from_raw_os_error(rc), "robust mutex failure");
    std::process::abort()
}
