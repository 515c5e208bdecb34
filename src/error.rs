//! The one recoverable error surface in this crate: validating process-wide
//! configuration supplied by an embedder (spec.md §7, SPEC_FULL.md §10.2).
//!
//! Nothing in the lock protocol itself returns this type -- `acquire` and
//! `release` are infallible by contract. This exists purely for
//! [`crate::config::ConfigBuilder::try_build`].

/// An invalid [`Config`](crate::config::Config) parameter.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The spin/yield hybridization threshold for `FairSync`/`FastSync` was
    /// zero, which would make every waiter yield immediately rather than ever
    /// spin-hint first.
    #[error("spin_before_yield threshold must be greater than 0")]
    ZeroSpinThreshold,
}
