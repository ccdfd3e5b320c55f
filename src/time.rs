//! Wall-clock abstraction.
//!
//! The scheduler reads time through the [`Clock`] trait so tests can drive
//! virtual time deterministically.

use crate::error::{AlertError, Result};
use std::time::{SystemTime, UNIX_EPOCH};

/// Source of wall-clock time, in whole seconds since the Unix epoch.
pub trait Clock: Send + Sync {
    /// Returns current UTC seconds since epoch.
    fn unix_now(&self) -> Result<i64>;
}

/// System wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn unix_now(&self) -> Result<i64> {
        let elapsed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| AlertError::Time(format!("system clock before epoch: {e}")))?;
        Ok(elapsed.as_secs() as i64)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn system_clock_returns_plausible_time() {
        let now = SystemClock.unix_now().unwrap();
        // 2020-01-01T00:00:00Z.
        assert!(now > 1_577_836_800);
    }
}
