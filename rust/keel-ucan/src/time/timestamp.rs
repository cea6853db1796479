//! UNIX timestamps for token validity fields.

use serde::{Deserialize, Serialize};
use std::{fmt, ops::Add, time::Duration};
use web_time::{SystemTime, UNIX_EPOCH};

/// Largest timestamp value tokens may carry: 2^53 - 1 seconds.
///
/// Timestamps above this bound cannot round-trip through ecosystems
/// whose numbers are IEEE 754 doubles, so they are rejected on decode.
pub const MAX_TIMESTAMP: u64 = (1 << 53) - 1;

/// Seconds since the UNIX epoch, as used by `exp`, `nbf`, and `iat`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Timestamp(u64);

impl Timestamp {
    /// The current wall-clock time, truncated to whole seconds.
    ///
    /// # Panics
    ///
    /// Panics if the system clock reports a time before the UNIX epoch.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn now() -> Self {
        let elapsed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock is set before the UNIX epoch");
        Timestamp(elapsed.as_secs())
    }

    /// Construct from whole seconds since the UNIX epoch.
    ///
    /// # Errors
    ///
    /// Returns [`TimestampOutOfRange`] when `seconds` exceeds
    /// [`MAX_TIMESTAMP`].
    pub fn from_unix(seconds: u64) -> Result<Self, TimestampOutOfRange> {
        if seconds > MAX_TIMESTAMP {
            return Err(TimestampOutOfRange(seconds));
        }
        Ok(Timestamp(seconds))
    }

    /// Whole seconds since the UNIX epoch.
    #[must_use]
    pub const fn to_unix(self) -> u64 {
        self.0
    }
}

impl Add<Duration> for Timestamp {
    type Output = Timestamp;

    fn add(self, rhs: Duration) -> Self::Output {
        Timestamp(self.0.saturating_add(rhs.as_secs()).min(MAX_TIMESTAMP))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Error for timestamps beyond the representable range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("timestamp {0} exceeds 2^53 - 1 seconds")]
pub struct TimestampOutOfRange(pub u64);

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let seconds = u64::deserialize(deserializer)?;
        Timestamp::from_unix(seconds).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use testresult::TestResult;

    #[test]
    fn rejects_timestamps_above_the_double_range() {
        assert!(Timestamp::from_unix(MAX_TIMESTAMP).is_ok());
        assert!(Timestamp::from_unix(MAX_TIMESTAMP + 1).is_err());
    }

    #[test]
    fn decode_rejects_oversized_values() -> TestResult {
        let bytes = serde_ipld_dagcbor::to_vec(&(MAX_TIMESTAMP + 1))?;
        assert!(serde_ipld_dagcbor::from_slice::<Timestamp>(&bytes).is_err());

        let bytes = serde_ipld_dagcbor::to_vec(&1_700_000_000u64)?;
        let ts: Timestamp = serde_ipld_dagcbor::from_slice(&bytes)?;
        assert_eq!(ts.to_unix(), 1_700_000_000);
        Ok(())
    }

    #[test]
    fn addition_saturates() -> TestResult {
        let ts = Timestamp::from_unix(MAX_TIMESTAMP - 10)?;
        let bumped = ts + Duration::from_secs(100);
        assert_eq!(bumped.to_unix(), MAX_TIMESTAMP);
        Ok(())
    }
}
