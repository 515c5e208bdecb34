//! Indirection over the atomics and thread primitives used throughout this
//! crate, so the entire protocol can be re-run under `loom`'s exhaustive
//! interleaving model checker without duplicating any logic.
//!
//! Everywhere else in this crate reaches through `crate::loom::*` instead of
//! `core::sync::atomic`/`std::thread` directly; under `--cfg loom` those paths
//! resolve to loom's own instrumented equivalents instead.

cfg_if::cfg_if! {
    if #[cfg(loom)] {
        pub(crate) use loom::sync::atomic::{AtomicBool, AtomicPtr, AtomicU8, AtomicUsize, Ordering};
        pub(crate) use loom::thread;
    } else {
        pub(crate) use core::sync::atomic::{AtomicBool, AtomicPtr, AtomicU8, AtomicUsize, Ordering};
        pub(crate) use std::thread;
    }
}
