use serde::{
    Deserialize,
    Serialize,
};
use std::time::Duration;

/// Tuning knobs for loading, event draining and cache maintenance.
///
/// Durations are (de)serialized as whole milliseconds; missing fields take
/// their default value.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Slots read concurrently per batch during a full load.
    pub load_batch_size: usize,
    #[serde(with = "millis")]
    pub load_batch_delay: Duration,
    /// Slots refreshed concurrently per sub-batch while draining events.
    pub event_batch_size: usize,
    #[serde(with = "millis")]
    pub event_batch_delay: Duration,
    /// Rounds one drain cycle may run before leaving the rest for the next cycle.
    pub max_drain_rounds: usize,
    #[serde(with = "millis")]
    pub user_max_age: Duration,
    pub max_processed_transactions: usize,
    #[serde(with = "millis")]
    pub eviction_interval: Duration,
    #[serde(with = "millis")]
    pub staleness_check_interval: Duration,
    #[serde(with = "millis")]
    pub force_refresh_after: Duration,
    #[serde(with = "millis")]
    pub event_poll_interval: Duration,
    #[serde(with = "millis")]
    pub status_ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            load_batch_size: 10,
            load_batch_delay: Duration::from_millis(100),
            event_batch_size: 5,
            event_batch_delay: Duration::from_millis(100),
            max_drain_rounds: 8,
            user_max_age: Duration::from_secs(24 * 60 * 60),
            max_processed_transactions: 1000,
            eviction_interval: Duration::from_secs(60 * 60),
            staleness_check_interval: Duration::from_secs(60),
            force_refresh_after: Duration::from_secs(5 * 60),
            event_poll_interval: Duration::from_secs(4),
            status_ttl: Duration::from_secs(5),
        }
    }
}

impl CacheConfig {
    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str::<Self>(raw).map(Self::normalized)
    }

    /// Clamps counts that must be positive; a zero batch size would stall
    /// every load.
    pub fn normalized(mut self) -> Self {
        self.load_batch_size = self.load_batch_size.max(1);
        self.event_batch_size = self.event_batch_size.max(1);
        self.max_drain_rounds = self.max_drain_rounds.max(1);
        self
    }
}

mod millis {
    use serde::{
        Deserialize,
        Deserializer,
        Serializer,
    };
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        let millis = u64::try_from(value.as_millis()).unwrap_or(u64::MAX);
        serializer.serialize_u64(millis)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;

    #[test]
    fn from_json__fills_missing_fields_with_defaults() {
        // given
        let raw = r#"{ "load_batch_size": 4, "force_refresh_after": 120000 }"#;

        // when
        let config = CacheConfig::from_json(raw).unwrap();

        // then
        assert_eq!(config.load_batch_size, 4);
        assert_eq!(config.force_refresh_after, Duration::from_secs(120));
        assert_eq!(config.event_batch_size, 5);
        assert_eq!(config.max_processed_transactions, 1000);
    }

    #[test]
    fn from_json__clamps_zero_batch_sizes() {
        let config =
            CacheConfig::from_json(r#"{ "load_batch_size": 0, "event_batch_size": 0 }"#)
                .unwrap();
        assert_eq!(config.load_batch_size, 1);
        assert_eq!(config.event_batch_size, 1);
    }
}
