//! Exhaustive small-interleaving model checks, run only under `--cfg loom`.
//!
//! Targets the two open questions spec.md §9 leaves unresolved at the
//! source level: whether `acquire`/`release` can be proven free of lost
//! wake-ups and double-holds under every legal interleaving for a small
//! number of threads, using acquire-ordered loads throughout drain (the
//! resolution SPEC_FULL.md §9 records for both).
#![cfg(loom)]

use std::sync::atomic::{AtomicUsize, Ordering};

use loom::sync::Arc;
use loom::thread;

use mcsync::WeakUnfairMcs;

/// Two threads, each acquiring once: every legal interleaving must still
/// serialize the two critical sections (P1) and both threads must complete
/// (P2, P3) -- covers the fast-path-1/fast-path-2 race spec.md §9 calls out
/// ("the interplay between the early-return fast path ... and a concurrently
/// enqueueing thread").
#[test]
fn two_threads_mutual_exclusion() {
    loom::model(|| {
        let lock = Arc::new(WeakUnfairMcs::new(0usize));
        let overlap = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let lock = Arc::clone(&lock);
                let overlap = Arc::clone(&overlap);
                thread::spawn(move || {
                    let mut guard = lock.lock();
                    let concurrent = overlap.fetch_add(1, Ordering::SeqCst);
                    assert_eq!(concurrent, 0, "two threads observed the critical section at once");
                    *guard += 1;
                    overlap.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(*lock.lock(), 2);
    });
}

/// Three threads, each acquiring once: exercises a genuine queue (at least
/// one thread must park behind another) rather than only the two-thread
/// fast-path races above.
#[test]
fn three_threads_queue_forms_and_drains() {
    loom::model(|| {
        let lock = Arc::new(WeakUnfairMcs::new(0usize));

        let handles: Vec<_> = (0..3)
            .map(|_| {
                let lock = Arc::clone(&lock);
                thread::spawn(move || {
                    *lock.lock() += 1;
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(*lock.lock(), 3);
    });
}

/// A guard dropped via panic/unwind must still release the lock under every
/// interleaving, so a later acquire by another thread is never starved.
#[test]
fn panic_during_critical_section_still_releases() {
    loom::model(|| {
        let lock = Arc::new(WeakUnfairMcs::new(0usize));

        let panicking = {
            let lock = Arc::clone(&lock);
            thread::spawn(move || {
                let _guard = lock.lock();
                panic!("boom");
            })
        };
        let _ = panicking.join();

        let other = {
            let lock = Arc::clone(&lock);
            thread::spawn(move || {
                *lock.lock() += 1;
            })
        };
        other.join().unwrap();

        assert_eq!(*lock.lock(), 1);
    });
}
