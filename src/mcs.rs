//! `WeakUnfairMcs`: the MCS-queue lock with a fast-path busy-flag bypass
//! (spec.md §4.3).
//!
//! Grounded on the intrusive, tail-linked queue shape of this crate's
//! lineage's own retirement queue (`examples/oliver-giersch-hazptr/src/queue.rs`)
//! and on a direct MCS-lock reference implementation
//! (`examples/other_examples/..._r9os-r9__port-src-mcslock.rs.rs`), recombined
//! around the fast-path/tail-fixup/poll shape spec.md §4.3.2 specifies.

use core::cell::UnsafeCell;
use core::fmt;
use core::ops::{Deref, DerefMut};
use core::ptr;

use crate::arch::{cas, xchg};
use crate::diag::{diag_debug, diag_trace};
use crate::loom::{AtomicBool, AtomicPtr, Ordering};
use crate::node::{is_removed, removed, Node};
use crate::park::spin_hint;

////////////////////////////////////////////////////////////////////////////////////////////////////
// RawWeakUnfairMcs
////////////////////////////////////////////////////////////////////////////////////////////////////

/// The bare queue-and-flag state, without an embedded payload.
///
/// Split out from [`WeakUnfairMcs`] so the protocol itself -- the part this
/// crate's tests and benchmarks actually exercise under `loom` -- doesn't
/// carry a generic payload parameter it has no use for.
pub(crate) struct RawWeakUnfairMcs {
    /// Fast-path occupancy flag; `true` while some thread holds the lock.
    busy: AtomicBool,
    /// The most recently enqueued node, or `null` when the queue is empty.
    tail: AtomicPtr<Node>,
    /// The current front (head) waiter, or `null` when the queue is empty.
    ///
    /// Mutated only by the thread that currently holds `busy`, so plain
    /// atomic loads/stores at `Relaxed` ordering are enough -- there is never
    /// more than one writer at a time.
    top: AtomicPtr<Node>,
}

// SAFETY: the queue is an intrusive linked list of heap-allocated `Node`s;
// all cross-thread handoff goes through the atomics above, synchronized the
// same way `Box<T>` hand-offs through a channel are.
unsafe impl Send for RawWeakUnfairMcs {}
unsafe impl Sync for RawWeakUnfairMcs {}

impl RawWeakUnfairMcs {
    pub(crate) const fn new() -> Self {
        Self {
            busy: AtomicBool::new(false),
            tail: AtomicPtr::new(ptr::null_mut()),
            top: AtomicPtr::new(ptr::null_mut()),
        }
    }

    /// Attempts to publish `node_ptr` as the new tail when the queue was
    /// observed empty.
    ///
    /// Returns `null` on success (the caller became the sole queue
    /// participant and may proceed straight to the busy-spin), or the
    /// witness tail observed by a racing enqueuer on failure.
    fn first_tail(&self, node_ptr: *mut Node) -> *mut Node {
        match xchg::<*mut Node>(&self.tail, ptr::null_mut(), node_ptr, Ordering::AcqRel) {
            Ok(_) => {
                self.top.store(node_ptr, Ordering::Relaxed);
                ptr::null_mut()
            }
            Err(witness) => witness,
        }
    }

    /// Blocks until the calling thread holds the lock (spec.md §4.3.2).
    pub(crate) fn acquire(&self) {
        // step 1-2: fast path -- queue empty and busy flag free.
        let snapshot = self.tail.load(Ordering::Acquire);
        if snapshot.is_null() && cas::<bool>(&self.busy, false, true, Ordering::Acquire) {
            diag_trace!(target: "mcsync::mcs", "fast-path-1 hit");
            return;
        }

        // step 3: allocate this acquire's waiter node.
        let node_ptr = Box::into_raw(Node::new());
        let mut h = snapshot;

        if h.is_null() {
            h = self.first_tail(node_ptr);
            if h.is_null() {
                diag_trace!(target: "mcsync::mcs", "became sole queue participant, skipping park");
                self.spin_busy_then_poll(node_ptr);
                return;
            }
        }

        // step 5: enqueue loop -- publish node_ptr as h's successor.
        loop {
            let next_atomic = unsafe { (*h).next() };
            match xchg::<*mut Node>(next_atomic, ptr::null_mut(), node_ptr, Ordering::AcqRel) {
                Ok(_) => {
                    diag_trace!(target: "mcsync::mcs", "node enqueued, cold path taken");
                    break;
                }
                Err(_observed) => {
                    // `xchg` already absorbs spurious weak-CAS failure
                    // internally (spec.md §4.1), so a genuine `Err` here
                    // means `h` was evicted or already has a live successor.
                    // Advance to the current tail and retry.
                    h = self.tail.load(Ordering::Acquire);
                    if h.is_null() {
                        if cas::<bool>(&self.busy, false, true, Ordering::Acquire) {
                            diag_trace!(target: "mcsync::mcs", "fast-path-2 hit mid-enqueue");
                            unsafe { drop(Box::from_raw(node_ptr)) };
                            return;
                        }
                        h = self.first_tail(node_ptr);
                        if h.is_null() {
                            self.spin_busy_then_poll(node_ptr);
                            return;
                        }
                    }
                }
            }
        }

        // step 6: tail fixup.
        self.fixup_tail(h, node_ptr);

        // step 7: park until the predecessor's poll wakes us.
        diag_debug!(target: "mcsync::mcs", "parking behind predecessor");
        unsafe { (*node_ptr).park_until_ready() };
        diag_debug!(target: "mcsync::mcs", "woken from park");

        // step 8-9: busy-spin for the flag, then drain our own successor.
        self.spin_busy_then_poll(node_ptr);
    }

    /// Re-publishes `tail` from `old` to `node_ptr`, chasing concurrent
    /// enqueuers until either it succeeds or our own node already has a
    /// successor linked in (meaning some other thread already fixed up
    /// `tail` on our behalf).
    fn fixup_tail(&self, mut old: *mut Node, node_ptr: *mut Node) {
        loop {
            match xchg::<*mut Node>(&self.tail, old, node_ptr, Ordering::Relaxed) {
                Ok(_) => return,
                Err(witness) => {
                    if !unsafe { Node::next_raw(node_ptr) }.is_null() {
                        return;
                    }
                    old = witness;
                }
            }
        }
    }

    /// Steps 8-9: spin until `busy` is claimed, then drain our own node so a
    /// pre-woken successor (if any) can start spinning on `busy` immediately,
    /// overlapping its wake-up latency with this holder's critical section.
    fn spin_busy_then_poll(&self, node_ptr: *mut Node) {
        while !cas::<bool>(&self.busy, false, true, Ordering::SeqCst) {
            spin_hint();
        }
        self.poll(node_ptr);
    }

    /// Drains `node_ptr` (the node of the thread that just became holder)
    /// from the front of the queue, pre-waking its successor if one already
    /// exists, or resetting `tail`/`top` to `null` if the queue is empty.
    fn poll(&self, node_ptr: *mut Node) {
        let first = node_ptr;
        let next_atomic = unsafe { (*first).next() };
        let expected = next_atomic.load(Ordering::Acquire);

        let next = match xchg::<*mut Node>(next_atomic, expected, removed(), Ordering::AcqRel) {
            Err(witness) => {
                // a concurrent enqueuer changed `first.next` since our load;
                // store REMOVED anyway so its linking attempt observes the
                // eviction rather than looping against a live predecessor.
                next_atomic.store(removed(), Ordering::Release);
                witness
            }
            Ok(_) if expected.is_null() => {
                if cas::<*mut Node>(&self.tail, first, ptr::null_mut(), Ordering::AcqRel) {
                    self.top.store(ptr::null_mut(), Ordering::Relaxed);
                    diag_trace!(target: "mcsync::mcs", "queue drained");
                    unsafe { drop(Box::from_raw(first)) };
                    return;
                }
                // a racing enqueuer linked in between our load and the CAS
                // above; re-read the now-published successor.
                unsafe { Node::next_raw(first) }
            }
            Ok(_) => expected,
        };

        debug_assert!(!next.is_null() && !is_removed(next), "poll observed an invalid successor");
        diag_trace!(target: "mcsync::mcs", "poll handed off to a successor");
        self.top.store(next, Ordering::Relaxed);
        unsafe { (*next).wake() };
        unsafe { drop(Box::from_raw(first)) };
    }

    /// Releases the lock (spec.md §4.3.3): a single store.
    ///
    /// The successor, if any, was already pre-woken during this holder's own
    /// `acquire` (step 9), so there is nothing left to drain here.
    pub(crate) fn release(&self) {
        debug_assert!(self.busy.load(Ordering::Relaxed), "release called while not held");
        self.busy.store(false, Ordering::Release);
        diag_trace!(target: "mcsync::mcs", "released");
    }
}

impl Drop for RawWeakUnfairMcs {
    fn drop(&mut self) {
        // invariant I5: the queue is empty whenever no thread holds the lock,
        // and `acquire`/`poll` always free a node before returning control to
        // its caller, so there is nothing left to reclaim here. `top`/`tail`
        // are plain pointers to nodes already owned (and freed) elsewhere.
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// WeakUnfairMcs
////////////////////////////////////////////////////////////////////////////////////////////////////

/// A mutual-exclusion lock built on an MCS wait queue with a fast-path
/// busy-flag bypass (spec.md §4.3).
///
/// Unfair under contention: a thread that arrives while the queue is
/// momentarily empty can win the lock ahead of threads already parked in the
/// queue (spec.md invariant I4 names this explicitly; see [`crate::ticket`]
/// for a strictly fair alternative).
pub struct WeakUnfairMcs<T: ?Sized> {
    raw: RawWeakUnfairMcs,
    data: UnsafeCell<T>,
}

// SAFETY: access to `data` is only ever granted through a `WeakUnfairMcsGuard`
// obtained while `raw` is held, exactly once at a time.
unsafe impl<T: ?Sized + Send> Send for WeakUnfairMcs<T> {}
unsafe impl<T: ?Sized + Send> Sync for WeakUnfairMcs<T> {}

impl<T> WeakUnfairMcs<T> {
    /// Creates a new lock wrapping `value`.
    pub const fn new(value: T) -> Self {
        Self { raw: RawWeakUnfairMcs::new(), data: UnsafeCell::new(value) }
    }

    /// Consumes the lock, returning the wrapped value.
    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }
}

impl<T: ?Sized> WeakUnfairMcs<T> {
    /// Blocks until the lock is acquired, returning a guard that releases it
    /// on drop.
    pub fn lock(&self) -> WeakUnfairMcsGuard<'_, T> {
        self.raw.acquire();
        WeakUnfairMcsGuard { lock: self }
    }

    /// Returns a mutable reference to the wrapped value without locking.
    ///
    /// Sound because `&mut self` statically proves no other reference -- and
    /// therefore no outstanding guard -- can exist.
    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }
}

impl<T: ?Sized + Default> Default for WeakUnfairMcs<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for WeakUnfairMcs<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakUnfairMcs").field("busy", &self.raw.busy.load(Ordering::Relaxed)).finish()
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// WeakUnfairMcsGuard
////////////////////////////////////////////////////////////////////////////////////////////////////

/// RAII guard granting exclusive access to a [`WeakUnfairMcs`]'s payload.
///
/// Releases the lock when dropped, including during unwind, so a panic while
/// holding the guard never leaves the lock held forever.
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct WeakUnfairMcsGuard<'a, T: ?Sized> {
    lock: &'a WeakUnfairMcs<T>,
}

impl<T: ?Sized> Deref for WeakUnfairMcsGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { &*self.lock.data.get() }
    }
}

impl<T: ?Sized> DerefMut for WeakUnfairMcsGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T: ?Sized> Drop for WeakUnfairMcsGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.raw.release();
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for WeakUnfairMcsGuard<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakUnfairMcsGuard").field("data", &&**self).finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn single_thread_lock_unlock_roundtrip() {
        let lock = WeakUnfairMcs::new(0u32);
        {
            let mut guard = lock.lock();
            *guard += 1;
        }
        assert_eq!(*lock.lock(), 1);
    }

    #[test]
    fn contended_increments_are_not_lost() {
        const THREADS: usize = 8;
        const ITERS: usize = 2_000;

        let lock = Arc::new(WeakUnfairMcs::new(0u64));
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
    fn guard_releases_on_panic_unwind() {
        let lock = Arc::new(WeakUnfairMcs::new(0u32));
        let other = Arc::clone(&lock);

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            let _guard = other.lock();
            panic!("boom");
        }));
        assert!(result.is_err());

        // would deadlock if the guard's Drop impl hadn't run during unwind.
        *lock.lock() += 1;
        assert_eq!(*lock.lock(), 1);
    }

    #[test]
    fn get_mut_bypasses_locking() {
        let mut lock = WeakUnfairMcs::new(vec![1, 2, 3]);
        lock.get_mut().push(4);
        assert_eq!(*lock.lock(), vec![1, 2, 3, 4]);
    }
}
