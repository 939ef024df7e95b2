//! Error types for the sketchcache library.
//!
//! ## Key Components
//!
//! - [`ConfigError`]: Returned when cache construction parameters are invalid
//!   (e.g. zero counters, non-positive max cost, empty buffers).
//! - [`InvariantError`]: Returned by `check_invariants` when the policy's cost
//!   accounting and the store drift apart.
//!
//! ## Example Usage
//!
//! ```
//! use sketchcache::builder::CacheBuilder;
//! use sketchcache::error::ConfigError;
//!
//! let bad: Result<_, ConfigError> = CacheBuilder::<u64, u64>::new(0, 100).build();
//! assert!(bad.is_err());
//! ```

use std::fmt;

// ---------------------------------------------------------------------------
// InvariantError
// ---------------------------------------------------------------------------

/// Error returned when internal cache invariants are violated.
///
/// Produced by [`Cache::check_invariants`](crate::Cache::check_invariants) and
/// [`EvictionPolicy::check_invariants`](crate::policy::EvictionPolicy::check_invariants).
/// Carries a human-readable description of which invariant failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvariantError(String);

impl InvariantError {
    /// Creates a new `InvariantError` with the given description.
    #[inline]
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }

    /// Returns the error description.
    #[inline]
    pub fn message(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InvariantError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for InvariantError {}

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

/// Error returned when cache configuration parameters are invalid.
///
/// Produced by [`CacheBuilder::build`](crate::builder::CacheBuilder::build).
/// Carries a human-readable description of which parameter failed validation.
///
/// # Example
///
/// ```
/// use sketchcache::builder::CacheBuilder;
///
/// let err = CacheBuilder::<u64, u64>::new(1000, 0).build().unwrap_err();
/// assert!(err.to_string().contains("max_cost"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError(String);

impl ConfigError {
    /// Creates a new `ConfigError` with the given description.
    #[inline]
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }

    /// Returns the error description.
    #[inline]
    pub fn message(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for ConfigError {}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
