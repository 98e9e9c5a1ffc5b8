//! Runtime configuration for a wallet backend. Nothing here is persisted.

use crate::daemon::HandshakeWait;
use crate::time::{SystemTimeProvider, TimeProvider};
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
pub struct WalletConfig {
    /// How `init()` waits for the daemon handshake.
    pub handshake: HandshakeWait,
    /// Pause between sync rounds once the wallet has caught up.
    pub sync_interval: Duration,
    pub retry_policy: RetryPolicy,
    pub event_capacity: usize,
    /// Where the wallet and its synchronizer thread send their logs.
    pub dispatch: tracing::Dispatch,
    pub time: Arc<dyn TimeProvider>,
}

impl WalletConfig {
    pub fn new() -> Self {
        Self {
            handshake: HandshakeWait::Unbounded,
            sync_interval: Duration::from_secs(5),
            retry_policy: RetryPolicy::default(),
            event_capacity: 256,
            dispatch: tracing::Dispatch::default(),
            time: Arc::new(SystemTimeProvider::new()),
        }
    }

    /// Bounds the daemon handshake; the default waits forever.
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake = HandshakeWait::Timeout(timeout);
        self
    }

    pub fn with_sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = interval;
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    pub fn with_dispatch(mut self, dispatch: tracing::Dispatch) -> Self {
        self.dispatch = dispatch;
        self
    }

    pub fn with_time_provider(mut self, time: Arc<dyn TimeProvider>) -> Self {
        self.time = time;
        self
    }
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Exponential back-off for failed daemon requests.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
}

impl RetryPolicy {
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay_secs = self.initial_delay.as_secs_f64()
            * self.backoff_multiplier.powi(attempt.min(32) as i32);
        let delay = Duration::from_secs_f64(delay_secs.min(self.max_delay.as_secs_f64()));
        delay.min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(16),
            backoff_multiplier: 2.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_backoff() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for_attempt(0), Duration::from_secs(1));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(4));
        assert_eq!(policy.delay_for_attempt(10), Duration::from_secs(16));
        assert_eq!(policy.delay_for_attempt(u32::MAX), Duration::from_secs(16));
    }

    #[test]
    fn test_builder() {
        let config = WalletConfig::new()
            .with_handshake_timeout(Duration::from_secs(3))
            .with_sync_interval(Duration::from_millis(10))
            .with_event_capacity(8);

        assert!(matches!(config.handshake, HandshakeWait::Timeout(d) if d == Duration::from_secs(3)));
        assert_eq!(config.sync_interval, Duration::from_millis(10));
        assert_eq!(config.event_capacity, 8);
    }
}
