//! Process-wide, one-time configuration (SPEC_FULL.md §10.3).
//!
//! Mirrors the shape of this crate's lineage's own runtime-parameter
//! configuration: a plain [`Config`] value plus a [`ConfigBuilder`] for
//! gradually overriding individual defaults, so future parameters can be
//! added without an API break.

use crate::error::ConfigError;

/// `FairSync`/`FastSync` hybridize between spin-hinting and yielding based on
/// a waiter's remaining distance from the head of the ticket queue, compared
/// against half the number of logical CPUs (spec.md §4.5). This is the
/// fallback used when the host reports zero or one logical CPU, where "half"
/// would otherwise collapse to zero and make every waiter yield immediately.
const MIN_SPIN_THRESHOLD: u32 = 1;

////////////////////////////////////////////////////////////////////////////////////////////////////
// Config
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Runtime configuration parameters, consumed once per process.
#[derive(Copy, Clone, Debug)]
pub struct Config {
    spin_before_yield: u32,
    weakly_ordered_override: Option<bool>,
}

impl Default for Config {
    #[inline]
    fn default() -> Self {
        ConfigBuilder::new().build()
    }
}

impl Config {
    /// Creates a new [`Config`] with the given parameters.
    ///
    /// # Panics
    ///
    /// Panics if `spin_before_yield` is 0. Prefer
    /// [`ConfigBuilder::try_build`] at call sites that accept configuration
    /// from outside the program and want to handle invalid input instead of
    /// panicking on it.
    #[inline]
    pub fn with_params(spin_before_yield: u32, weakly_ordered_override: Option<bool>) -> Self {
        assert!(spin_before_yield > 0, "spin_before_yield threshold must be greater than 0");
        Self { spin_before_yield, weakly_ordered_override }
    }

    /// The spin/yield hybridization threshold used by `FairSync`/`FastSync`
    /// (spec.md §4.5).
    #[inline]
    pub fn spin_before_yield(&self) -> u32 {
        self.spin_before_yield
    }

    /// The overridden weakly-ordered-architecture classification, if any
    /// (spec.md §4.1, §6).
    #[inline]
    pub fn weakly_ordered_override(&self) -> Option<bool> {
        self.weakly_ordered_override
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// ConfigBuilder
////////////////////////////////////////////////////////////////////////////////////////////////////

/// A builder type for gradually initializing a [`Config`].
#[derive(Copy, Clone, Debug, Default)]
pub struct ConfigBuilder {
    spin_before_yield: Option<u32>,
    weakly_ordered_override: Option<bool>,
}

impl ConfigBuilder {
    /// Creates a new [`ConfigBuilder`] with default values.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the spin/yield hybridization threshold for `FairSync`/`FastSync`.
    #[inline]
    pub fn spin_before_yield(mut self, spin_before_yield: u32) -> Self {
        self.spin_before_yield = Some(spin_before_yield);
        self
    }

    /// Forces the weak-CAS shim's architecture classification rather than
    /// relying on its compile-time default.
    #[inline]
    pub fn weakly_ordered_override(mut self, weak: bool) -> Self {
        self.weakly_ordered_override = Some(weak);
        self
    }

    /// Consumes the [`ConfigBuilder`] and returns an initialized [`Config`].
    ///
    /// Unspecified parameters are initialized with their default values; the
    /// spin/yield threshold defaults to half the number of logical CPUs
    /// available to the process (spec.md §4.5), floored at
    /// [`MIN_SPIN_THRESHOLD`].
    ///
    /// # Panics
    ///
    /// Panics if an explicitly supplied `spin_before_yield` is 0. Use
    /// [`Self::try_build`] to get a [`ConfigError`] instead.
    #[inline]
    pub fn build(self) -> Config {
        self.try_build().expect("invalid configuration")
    }

    /// Like [`Self::build`], but returns a [`ConfigError`] instead of
    /// panicking on invalid parameters.
    ///
    /// If [`Self::weakly_ordered_override`] was set, this also applies it to
    /// the weak-CAS shim via [`crate::arch::set_weakly_ordered_override`]. As
    /// with that function, the override only takes effect if the shim has not
    /// already latched its architecture classification; a later call has no
    /// effect and is not reported as an error here.
    pub fn try_build(self) -> Result<Config, ConfigError> {
        let spin_before_yield = match self.spin_before_yield {
            Some(0) => return Err(ConfigError::ZeroSpinThreshold),
            Some(threshold) => threshold,
            None => (num_cpus::get() as u32 / 2).max(MIN_SPIN_THRESHOLD),
        };

        if let Some(weak) = self.weakly_ordered_override {
            let _ = crate::arch::set_weakly_ordered_override(weak);
        }

        Ok(Config { spin_before_yield, weakly_ordered_override: self.weakly_ordered_override })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_nonzero_threshold() {
        let config = Config::default();
        assert!(config.spin_before_yield() > 0);
    }

    #[test]
    fn zero_threshold_rejected_without_panicking() {
        let result = ConfigBuilder::new().spin_before_yield(0).try_build();
        assert!(matches!(result, Err(ConfigError::ZeroSpinThreshold)));
    }

    #[test]
    #[should_panic(expected = "spin_before_yield threshold must be greater than 0")]
    fn zero_threshold_panics_via_build() {
        let _ = ConfigBuilder::new().spin_before_yield(0).build();
    }

    #[test]
    fn explicit_override_is_preserved() {
        let config = ConfigBuilder::new().spin_before_yield(4).weakly_ordered_override(true).build();
        assert_eq!(config.spin_before_yield(), 4);
        assert_eq!(config.weakly_ordered_override(), Some(true));
    }
}
