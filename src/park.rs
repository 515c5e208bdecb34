//! Park/Unpark Bridge (spec.md §4.4).
//!
//! The protocol in `mcs.rs` needs a primitive by which a thread voluntarily
//! suspends until another thread signals it, with two properties: tolerance
//! of spurious wake-ups, and an idempotent unpark (calling unpark before the
//! target has parked grants a single permit consumed by its next park call).
//!
//! `std::thread::park`/`Thread::unpark` already provide exactly this contract
//! -- it is the platform's own thread-parking primitive, which is what the
//! spec calls for ("map to the platform's thread parking primitive"). This
//! module exists to document that contract at a single point rather than to
//! reimplement it; `node.rs` calls straight through to
//! `crate::loom::thread::{current, park}` and `Thread::unpark`.
//!
//! Out of scope, per spec.md §1: building the park/unpark primitive itself
//! from lower-level OS facilities (futex, wait queues, ...) is the operating
//! system's job, not this crate's.

use crate::loom::thread;

/// Issues a single spin-loop hint.
///
/// Used by the busy-spin step of `acquire` (spec.md §4.3.2 step 8) and by
/// `FairSync`'s hybridized wait (spec.md §4.5), both of which poll an atomic
/// in a tight loop rather than parking.
#[inline(always)]
pub(crate) fn spin_hint() {
    core::hint::spin_loop();
}

/// Yields the current thread's timeslice back to the scheduler.
///
/// Used by `FairSync`/`FastSync` once a waiter's remaining distance from the
/// head of the ticket queue is no longer "small" (spec.md §4.5).
#[inline(always)]
pub(crate) fn yield_now() {
    thread::yield_now();
}
