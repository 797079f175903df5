//! Configuration for the replica and the sync engine.

use cvrsync_core::{ClientGroupId, ClientId};
use std::time::Duration;
use uuid::Uuid;

/// Identity of a replica and the schema it speaks.
#[derive(Debug, Clone)]
pub struct ReplicaConfig {
    /// Profile the replica syncs for; must match the authenticated user.
    pub profile_id: String,
    /// Client group shared by the replicas of one storage area.
    pub client_group_id: ClientGroupId,
    /// This replica's client id.
    pub client_id: ClientId,
    /// Schema version sent with every request.
    pub schema_version: String,
}

impl ReplicaConfig {
    /// Creates a configuration with fresh random client and group ids.
    pub fn new(profile_id: impl Into<String>, schema_version: impl Into<String>) -> Self {
        Self {
            profile_id: profile_id.into(),
            client_group_id: ClientGroupId::new(Uuid::new_v4().to_string()),
            client_id: ClientId::new(Uuid::new_v4().to_string()),
            schema_version: schema_version.into(),
        }
    }

    /// Joins an existing client group.
    pub fn with_client_group_id(mut self, id: impl Into<ClientGroupId>) -> Self {
        self.client_group_id = id.into();
        self
    }

    /// Uses a fixed client id.
    pub fn with_client_id(mut self, id: impl Into<ClientId>) -> Self {
        self.client_id = id.into();
        self
    }
}

/// Configuration for sync cycles.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Maximum number of mutations per push request.
    pub push_batch_size: usize,
    /// Retry configuration.
    pub retry: RetryConfig,
}

impl SyncConfig {
    /// Creates a new sync configuration.
    pub fn new() -> Self {
        Self {
            push_batch_size: 100,
            retry: RetryConfig::default(),
        }
    }

    /// Sets the push batch size (at least 1).
    pub fn with_push_batch_size(mut self, size: usize) -> Self {
        self.push_batch_size = size.max(1);
        self
    }

    /// Sets the retry configuration.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, the first one included.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound for any delay.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,
    /// Whether to add up to 25% jitter to delays.
    pub add_jitter: bool,
}

impl RetryConfig {
    /// Creates a new retry configuration.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            add_jitter: true,
        }
    }

    /// Creates a configuration with no retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
            add_jitter: false,
        }
    }

    /// Sets the initial delay.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the maximum delay.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the backoff multiplier. Values below 1.0 and NaN become 1.0.
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier.max(1.0);
        self
    }

    /// Turns jitter on or off.
    pub fn with_jitter(mut self, enabled: bool) -> Self {
        self.add_jitter = enabled;
        self
    }

    /// Calculates the delay before `attempt` (0-indexed; attempt 0 never
    /// waits).
    ///
    /// A delay that is not a valid duration, e.g. from a negative multiplier
    /// set on the public field, falls back to `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
        let base = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        let delay = base.min(self.max_delay.as_secs_f64());

        let secs = if self.add_jitter {
            delay + delay * 0.25 * jitter_fraction()
        } else {
            delay
        };
        Duration::try_from_secs_f64(secs).unwrap_or(self.max_delay)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(3)
    }
}

/// A fraction in `[0, 1)` taken from the clock's sub-second nanos.
fn jitter_fraction() -> f64 {
    let nanos = chrono::Utc::now().timestamp_subsec_nanos();
    f64::from(nanos % 1000) / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replica_config_builder() {
        let config = ReplicaConfig::new("alice", "3")
            .with_client_group_id("g1")
            .with_client_id("c1");

        assert_eq!(config.profile_id, "alice");
        assert_eq!(config.client_group_id.as_str(), "g1");
        assert_eq!(config.client_id.as_str(), "c1");
        assert_eq!(config.schema_version, "3");
    }

    #[test]
    fn fresh_configs_get_distinct_ids() {
        let a = ReplicaConfig::new("alice", "1");
        let b = ReplicaConfig::new("alice", "1");
        assert_ne!(a.client_id, b.client_id);
        assert_ne!(a.client_group_id, b.client_group_id);
    }

    #[test]
    fn sync_config_builder() {
        let config = SyncConfig::new()
            .with_push_batch_size(0)
            .with_retry(RetryConfig::no_retry());
        assert_eq!(config.push_batch_size, 1);
        assert_eq!(config.retry.max_attempts, 1);
    }

    #[test]
    fn retry_delay_calculation() {
        let config = RetryConfig::new(5)
            .with_initial_delay(Duration::from_millis(100))
            .with_backoff_multiplier(2.0);

        assert_eq!(config.delay_for_attempt(0), Duration::ZERO);

        let delay1 = config.delay_for_attempt(1);
        assert!(delay1 >= Duration::from_millis(100));
        assert!(delay1 <= Duration::from_millis(125));

        let delay2 = config.delay_for_attempt(2);
        assert!(delay2 >= Duration::from_millis(200));
    }

    #[test]
    fn retry_delay_respects_max() {
        let config = RetryConfig::new(10)
            .with_initial_delay(Duration::from_secs(1))
            .with_max_delay(Duration::from_secs(5))
            .with_backoff_multiplier(10.0)
            .with_jitter(false);

        assert_eq!(config.delay_for_attempt(5), Duration::from_secs(5));
    }

    #[test]
    fn shrinking_multipliers_are_clamped() {
        for multiplier in [-2.0, 0.5, f64::NAN] {
            let config = RetryConfig::new(4)
                .with_initial_delay(Duration::from_millis(100))
                .with_backoff_multiplier(multiplier)
                .with_jitter(false);
            assert_eq!(config.backoff_multiplier, 1.0);
            assert_eq!(config.delay_for_attempt(3), Duration::from_millis(100));
        }
    }

    #[test]
    fn invalid_delays_fall_back_to_max() {
        let mut config = RetryConfig::new(4)
            .with_initial_delay(Duration::from_millis(100))
            .with_max_delay(Duration::from_secs(2));
        config.backoff_multiplier = -3.0;
        assert_eq!(config.delay_for_attempt(2), Duration::from_secs(2));
        config.backoff_multiplier = f64::NAN;
        assert!(config.delay_for_attempt(3) <= Duration::from_millis(2500));
    }
}
