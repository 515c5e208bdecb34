//! The per-acquire waiter record (spec.md §4.2) and its `REMOVED` sentinel.

use core::ptr;

use crate::loom::{thread, AtomicBool, AtomicPtr, Ordering};

/// Sentinel stored in a node's `next` slot to mark it as evicted from the
/// reachable queue, distinguishing "no successor yet" (`null`) from "this
/// node has been drained and must not be linked to again".
///
/// A small non-zero, non-null integer cast to a pointer is used rather than a
/// real allocation, the same technique as the `FREE`/`THREAD_RESERVED`
/// sentinel pair this crate's lineage uses for hazard-pointer states. It is
/// never dereferenced; every read of a node's `next` checks for equality with
/// `REMOVED` before following it as a pointer.
pub(crate) fn removed<T>() -> *mut T {
    1usize as *mut T
}

#[inline]
pub(crate) fn is_removed<T>(ptr: *mut T) -> bool {
    ptr == removed::<T>()
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// Node
////////////////////////////////////////////////////////////////////////////////////////////////////

/// A single waiter's per-acquire record.
///
/// Allocated once per call to `acquire` that cannot claim the fast path,
/// linked into the queue via `next`, and dropped once its owner has returned
/// from `acquire` (spec.md §5, "Resource discipline").
pub(crate) struct Node {
    /// The handle needed to unpark this node's owning thread.
    thread: thread::Thread,
    /// True from construction until the predecessor clears it just before
    /// unparking this node's thread (spec.md invariant I3).
    parked: AtomicBool,
    /// `null` until linked to a successor, `REMOVED` once evicted during
    /// drain, otherwise a live pointer to the successor node.
    next: AtomicPtr<Node>,
}

impl Node {
    /// Creates a new parked node for the calling thread.
    #[inline]
    pub(crate) fn new() -> Box<Node> {
        Box::new(Node {
            thread: thread::current(),
            parked: AtomicBool::new(true),
            next: AtomicPtr::new(ptr::null_mut()),
        })
    }

    #[inline]
    pub(crate) fn next(&self) -> &AtomicPtr<Node> {
        &self.next
    }

    /// Parks the calling thread until the predecessor clears `parked`.
    ///
    /// Tolerant of spurious wake-ups: re-checks `parked` in a loop, per the
    /// Park/Unpark Bridge contract (spec.md §4.4).
    #[inline]
    pub(crate) fn park_until_ready(&self) {
        while self.parked.load(Ordering::Acquire) {
            thread::park();
        }
    }

    /// Clears `parked` and unparks this node's thread.
    ///
    /// # Safety (protocol, not memory)
    ///
    /// Must be called by exactly one thread (the predecessor performing
    /// drain), exactly once per node, per invariant I3.
    #[inline]
    pub(crate) fn wake(&self) {
        self.parked.store(false, Ordering::Release);
        self.thread.unpark();
    }
}

/********** impl RawNode-style raw-pointer helpers ***************************************************/

/// Raw-pointer accessors mirroring the ones used by the intrusive queue this
/// module's `Node` plugs into (`mcs.rs`), kept separate from the safe
/// `&Node` API above since the queue protocol has to operate on nodes it does
/// not yet (or no longer) own a safe reference to.
impl Node {
    #[inline]
    pub(crate) unsafe fn next_raw(node: *mut Node) -> *mut Node {
        (*node).next.load(Ordering::Acquire)
    }
}
