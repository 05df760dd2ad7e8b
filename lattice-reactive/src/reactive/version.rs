//! Value Versions
//!
//! Every signal carries a version next to its value. Two observations of the
//! same signal with equal versions mean the value has not changed in between,
//! which is all the dependency engine needs to decide whether a memo is stale.
//!
//! Versions only increase by one per real change. When the counter reaches
//! `i64::MAX` it wraps to `i64::MIN` rather than zero, so neighbouring versions
//! stay distinct across the wrap. Two versions a full counter range apart can
//! collide; comparisons only ever span a handful of updates.

use std::fmt;

/// An opaque change marker attached to a signal's value.
///
/// Versions are compared for equality only. After a wrap a newer version
/// would compare "smaller", so there is no `Ord`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Version(i64);

impl Version {
    /// The version a freshly created signal starts at.
    pub const INITIAL: Version = Version(0);

    /// Create a version from a raw counter value.
    pub const fn new(raw: i64) -> Self {
        Self(raw)
    }

    /// Get the raw counter value.
    pub const fn raw(self) -> i64 {
        self.0
    }

    /// The version following this one.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

impl From<i64> for Version {
    fn from(raw: i64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn versions_count_up_from_zero() {
        let mut version = Version::INITIAL;
        for _ in 0..5 {
            version = version.next();
        }
        assert_eq!(version, Version::new(5));
    }

    #[test]
    fn max_wraps_to_min_not_zero() {
        let last = Version::new(i64::MAX);
        assert_eq!(last.next(), Version::new(i64::MIN));
        assert_ne!(last.next(), Version::INITIAL);
        assert_eq!(last.next().next(), Version::new(i64::MIN + 1));
    }
}
