//! Validity windows for delegation chains.

use super::timestamp::Timestamp;
use std::fmt;

/// The validity window of a token or a whole delegation chain.
///
/// `not_before` is the latest `nbf` seen so far and `expiration` the
/// earliest `exp`; `None` means the bound is open. Intersecting the
/// windows of every link yields the span in which the chain as a whole
/// is usable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    /// Earliest usable time (inclusive), or `None` for no lower bound.
    pub not_before: Option<Timestamp>,

    /// Latest usable time (inclusive), or `None` for no expiry.
    pub expiration: Option<Timestamp>,
}

impl TimeRange {
    /// A window with no constraints.
    #[must_use]
    pub const fn unbounded() -> Self {
        Self {
            not_before: None,
            expiration: None,
        }
    }

    /// Build a window from a token's `nbf` and `exp` fields.
    #[must_use]
    pub const fn new(not_before: Option<Timestamp>, expiration: Option<Timestamp>) -> Self {
        Self {
            not_before,
            expiration,
        }
    }

    /// Whether any instant falls inside the window.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        match (self.not_before, self.expiration) {
            (Some(nbf), Some(exp)) => nbf <= exp,
            _ => true,
        }
    }

    /// Whether `at` falls inside the window.
    #[must_use]
    pub fn contains(&self, at: Timestamp) -> bool {
        self.not_before.is_none_or(|nbf| nbf <= at)
            && self.expiration.is_none_or(|exp| at <= exp)
    }

    /// Intersect with another window: the later `not_before` and the
    /// earlier `expiration` win.
    #[must_use]
    pub fn intersect(self, other: Self) -> Self {
        let not_before = match (self.not_before, other.not_before) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (bound, None) | (None, bound) => bound,
        };
        let expiration = match (self.expiration, other.expiration) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (bound, None) | (None, bound) => bound,
        };
        Self {
            not_before,
            expiration,
        }
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(nbf) = self.not_before {
            write!(f, "{nbf}")?;
        }
        f.write_str("..")?;
        if let Some(exp) = self.expiration {
            write!(f, "={exp}")?;
        }
        Ok(())
    }
}
