//! `FairSync` and `FastSync`: strict-FIFO ticket locks (spec.md §4.5).
//!
//! Grounded on the same intrusive-state-machine style as `mcs.rs`, but
//! without a queue of heap-allocated nodes: fairness comes from a pair of
//! monotonic counters rather than an explicit linked list, the classic
//! ticket-lock shape (`examples/JonasKruckenberg-k23/libs/spin/src/mutex.rs`
//! uses the same spin/yield hybridization idea for its own spinlock).

use core::cell::UnsafeCell;
use core::fmt;
use core::ops::{Deref, DerefMut};

use crate::diag::diag_trace;
use crate::loom::{AtomicU8, AtomicUsize, Ordering};
use crate::park::{spin_hint, yield_now};

////////////////////////////////////////////////////////////////////////////////////////////////////
// RawFairSync
////////////////////////////////////////////////////////////////////////////////////////////////////

/// A strict-FIFO ticket lock with spin/yield hybridization.
///
/// Every waiter draws a ticket and spins (or yields) until `done` reaches its
/// own number, so waiters are served in exactly the order they arrived --
/// unlike [`crate::mcs::WeakUnfairMcs`], a thread can never jump ahead of one
/// already waiting (spec.md invariant: "never reorders waiters").
pub(crate) struct RawFairSync {
    ticket: AtomicUsize,
    done: AtomicUsize,
    spin_before_yield: usize,
}

unsafe impl Send for RawFairSync {}
unsafe impl Sync for RawFairSync {}

impl RawFairSync {
    pub(crate) const fn new(spin_before_yield: u32) -> Self {
        Self { ticket: AtomicUsize::new(0), done: AtomicUsize::new(0), spin_before_yield: spin_before_yield as usize }
    }

    /// Draws a ticket and blocks until it is served.
    pub(crate) fn acquire(&self) {
        let my_ticket = self.ticket.fetch_add(1, Ordering::Relaxed);
        loop {
            let current = self.done.load(Ordering::Acquire);
            if current == my_ticket {
                return;
            }
            // spin while close to the head of the line, yield once the
            // remaining wait is long enough that burning a core is wasteful
            // (spec.md §4.5).
            if my_ticket.wrapping_sub(current) <= self.spin_before_yield {
                spin_hint();
            } else {
                yield_now();
            }
        }
    }

    /// Serves the next ticket in line.
    pub(crate) fn release(&self) {
        self.done.fetch_add(1, Ordering::Release);
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// RawFastSync
////////////////////////////////////////////////////////////////////////////////////////////////////

const FALSE: u8 = 0;
const TRUE: u8 = 1;
const NAN: u8 = 2;

/// `RawFairSync` plus a tri-state fast path for the uncontended case
/// (spec.md §4.5: "a `FALSE`/`TRUE`/`NAN` fast-path atomic").
///
/// While no contention has ever been observed, acquiring and releasing the
/// lock costs a single CAS and never touches the ticket counters at all. A
/// thread that arrives while the fast path is already held draws a ticket to
/// take its place in line, then spins claiming the flag (`FALSE` to `NAN`)
/// once it is actually its turn -- the ticket line only orders *who* gets to
/// attempt that claim next, the CAS itself is still what grants exclusive
/// access.
pub(crate) struct RawFastSync {
    fast: AtomicU8,
    fair: RawFairSync,
}

unsafe impl Send for RawFastSync {}
unsafe impl Sync for RawFastSync {}

impl RawFastSync {
    pub(crate) const fn new(spin_before_yield: u32) -> Self {
        Self { fast: AtomicU8::new(FALSE), fair: RawFairSync::new(spin_before_yield) }
    }

    pub(crate) fn acquire(&self) {
        if self.fast.compare_exchange(FALSE, TRUE, Ordering::Acquire, Ordering::Relaxed).is_ok() {
            diag_trace!(target: "mcsync::ticket", "fast-path hit");
            return;
        }

        self.fair.acquire();
        while self.fast.compare_exchange(FALSE, NAN, Ordering::AcqRel, Ordering::Relaxed).is_err() {
            spin_hint();
        }
        diag_trace!(target: "mcsync::ticket", "claimed lock via ticket line");
    }

    pub(crate) fn release(&self) {
        let prior = self.fast.swap(FALSE, Ordering::Release);
        if prior == NAN {
            self.fair.release();
        }
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// FairSync / FastSync (public, generic wrappers)
////////////////////////////////////////////////////////////////////////////////////////////////////

macro_rules! ticket_lock {
    ($lock:ident, $guard:ident, $raw:ty, $raw_new:expr, $doc:literal) => {
        #[doc = $doc]
        pub struct $lock<T: ?Sized> {
            raw: $raw,
            data: UnsafeCell<T>,
        }

        unsafe impl<T: ?Sized + Send> Send for $lock<T> {}
        unsafe impl<T: ?Sized + Send> Sync for $lock<T> {}

        impl<T> $lock<T> {
            /// Creates a new lock wrapping `value`, using the spin/yield
            /// threshold from [`crate::config::Config::default`].
            pub fn new(value: T) -> Self {
                Self::with_spin_threshold(value, crate::config::Config::default().spin_before_yield())
            }

            /// Creates a new lock wrapping `value` with an explicit spin/yield
            /// threshold (spec.md §4.5), instead of the process default.
            pub fn with_spin_threshold(value: T, spin_before_yield: u32) -> Self {
                Self { raw: $raw_new(spin_before_yield), data: UnsafeCell::new(value) }
            }

            pub fn into_inner(self) -> T {
                self.data.into_inner()
            }
        }

        impl<T: ?Sized> $lock<T> {
            pub fn lock(&self) -> $guard<'_, T> {
                self.raw.acquire();
                $guard { lock: self }
            }

            pub fn get_mut(&mut self) -> &mut T {
                self.data.get_mut()
            }
        }

        impl<T: ?Sized + Default> Default for $lock<T> {
            fn default() -> Self {
                Self::new(T::default())
            }
        }

        impl<T: ?Sized + fmt::Debug> fmt::Debug for $lock<T> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_struct(stringify!($lock)).finish_non_exhaustive()
            }
        }

        #[must_use = "the lock is released as soon as the guard is dropped"]
        pub struct $guard<'a, T: ?Sized> {
            lock: &'a $lock<T>,
        }

        impl<T: ?Sized> Deref for $guard<'_, T> {
            type Target = T;

            fn deref(&self) -> &T {
                unsafe { &*self.lock.data.get() }
            }
        }

        impl<T: ?Sized> DerefMut for $guard<'_, T> {
            fn deref_mut(&mut self) -> &mut T {
                unsafe { &mut *self.lock.data.get() }
            }
        }

        impl<T: ?Sized> Drop for $guard<'_, T> {
            fn drop(&mut self) {
                self.lock.raw.release();
            }
        }

        impl<T: ?Sized + fmt::Debug> fmt::Debug for $guard<'_, T> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_struct(stringify!($guard)).field("data", &&**self).finish()
            }
        }
    };
}

ticket_lock!(
    FairSync,
    FairSyncGuard,
    RawFairSync,
    RawFairSync::new,
    "A strict-FIFO ticket lock: waiters are served in arrival order, with no \
     fast path (spec.md §4.5)."
);

ticket_lock!(
    FastSync,
    FastSyncGuard,
    RawFastSync,
    RawFastSync::new,
    "`FairSync` plus a tri-state fast path for the uncontended case: as long \
     as no second thread has ever arrived while the lock was held, acquiring \
     and releasing costs a single CAS and never touches the ticket counters \
     (spec.md §4.5)."
);

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn fair_single_thread_roundtrip() {
        let lock = FairSync::new(0u32);
        *lock.lock() += 1;
        assert_eq!(*lock.lock(), 1);
    }

    #[test]
    fn fair_contended_increments_are_not_lost() {
        const THREADS: usize = 8;
        const ITERS: usize = 2_000;

        let lock = Arc::new(FairSync::with_spin_threshold(0u64, 2));
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let lock = Arc::clone(&lock);
                std::thread::spawn(move || {
                    for _ in 0..ITERS {
                        *lock.lock() += 1;
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(*lock.lock(), (THREADS * ITERS) as u64);
    }

    #[test]
    fn fast_single_thread_stays_on_fast_path() {
        let lock = FastSync::new(0u32);
        *lock.lock() += 1;
        *lock.lock() += 1;
        assert_eq!(*lock.lock(), 2);
        assert_eq!(lock.raw.fast.load(Ordering::Relaxed), FALSE);
    }

    #[test]
    fn fast_contended_increments_are_not_lost() {
        const THREADS: usize = 8;
        const ITERS: usize = 2_000;

        let lock = Arc::new(FastSync::with_spin_threshold(0u64, 2));
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let lock = Arc::clone(&lock);
                std::thread::spawn(move || {
                    for _ in 0..ITERS {
                        *lock.lock() += 1;
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(*lock.lock(), (THREADS * ITERS) as u64);
        // `release` always resets the flag to `FALSE`, so a subsequent
        // uncontended acquire can take the fast path again even after a
        // stretch of contention.
        assert_eq!(lock.raw.fast.load(Ordering::Relaxed), FALSE);
    }

    #[test]
    fn fair_guard_releases_on_panic_unwind() {
        let lock = Arc::new(FairSync::new(0u32));
        let other = Arc::clone(&lock);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            let _guard = other.lock();
            panic!("boom");
        }));
        assert!(result.is_err());
        *lock.lock() += 1;
        assert_eq!(*lock.lock(), 1);
    }
}
