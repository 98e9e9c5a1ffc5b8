//! Time source abstraction and scan height/timestamp conversions.

use crate::constants::{BLOCK_FUTURE_TIME_LIMIT, DIFFICULTY_TARGET, GENESIS_BLOCK_TIMESTAMP};
use std::time::{SystemTime, UNIX_EPOCH};

pub trait TimeProvider: Send + Sync {
    /// Seconds since the unix epoch.
    fn now(&self) -> u64;
}

pub struct SystemTimeProvider;

impl SystemTimeProvider {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SystemTimeProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeProvider for SystemTimeProvider {
    fn now(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }
}

/// Fixed clock, for tests and replays.
pub struct FixedTimeProvider(pub u64);

impl TimeProvider for FixedTimeProvider {
    fn now(&self) -> u64 {
        self.0
    }
}

/// "Now", pulled back by the furthest a block timestamp may lie in the
/// future, so a wallet created now cannot miss a block stamped slightly ahead.
pub fn current_timestamp_adjusted(time: &dyn TimeProvider) -> u64 {
    time.now().saturating_sub(BLOCK_FUTURE_TIME_LIMIT)
}

/// Rough, deliberately early estimate of when a block height was mined.
pub fn scan_height_to_timestamp(scan_height: u64) -> u64 {
    if scan_height == 0 {
        return 0;
    }

    let seconds_since_launch = scan_height * DIFFICULTY_TARGET;

    // Blocks can come out faster than the target.
    let buffered = seconds_since_launch / 100 * 95;

    GENESIS_BLOCK_TIMESTAMP + buffered
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_time_provider() {
        let provider = SystemTimeProvider::new();
        let now = provider.now();

        assert!(now > 1_600_000_000);
        assert!(now < 4_000_000_000);
    }

    #[test]
    fn test_adjusted_timestamp() {
        let clock = FixedTimeProvider(1_700_000_000);
        assert_eq!(current_timestamp_adjusted(&clock), 1_700_000_000 - BLOCK_FUTURE_TIME_LIMIT);
        assert_eq!(current_timestamp_adjusted(&FixedTimeProvider(5)), 0);
    }

    #[test]
    fn test_scan_height_to_timestamp() {
        assert_eq!(scan_height_to_timestamp(0), 0);
        assert_eq!(scan_height_to_timestamp(1000), GENESIS_BLOCK_TIMESTAMP + 28_500);
        assert!(scan_height_to_timestamp(2000) > scan_height_to_timestamp(1000));
    }
}
