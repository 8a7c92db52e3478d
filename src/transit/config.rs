//! Pipeline configuration: broker addresses, consumer groups, topic names.

use std::env;
use std::time::Duration;

/// Topic the raw station records arrive on (written by the upstream collector).
pub const STATIONS_TOPIC: &str = "org.chicago.cta.stations";
/// Topic the transform stage publishes normalized records to. Doubles as the
/// changelog backing the station state table.
pub const TRANSFORMED_STATIONS_TOPIC: &str = "org.chicago.cta.stations.table.v1";
/// Topic carrying one event per rider entry.
pub const TURNSTILE_TOPIC: &str = "org.chicago.cta.turnstile";
/// Materialized output of the turnstile aggregation query.
pub const TURNSTILE_SUMMARY_TOPIC: &str = "TURNSTILE_SUMMARY";

/// Runtime settings shared by the pipeline components.
///
/// Renaming topics requires coordinated migration with every other
/// producer/consumer of them, so the defaults are the canonical names and
/// overrides are for test clusters only.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub brokers: String,
    pub stations_topic: String,
    pub transformed_topic: String,
    pub turnstile_topic: String,
    pub summary_topic: String,
    pub transform_group: String,
    pub query_group: String,
    /// Maximum wait for a single delivery acknowledgment.
    pub send_timeout: Duration,
    /// Maximum wait for outstanding sends during `close()`.
    pub flush_timeout: Duration,
    /// How long a consumer loop waits on its stream before re-checking the
    /// running flag.
    pub poll_interval: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            brokers: "localhost:9092".to_string(),
            stations_topic: STATIONS_TOPIC.to_string(),
            transformed_topic: TRANSFORMED_STATIONS_TOPIC.to_string(),
            turnstile_topic: TURNSTILE_TOPIC.to_string(),
            summary_topic: TURNSTILE_SUMMARY_TOPIC.to_string(),
            transform_group: "org.chicago.cta.station-transform".to_string(),
            query_group: "org.chicago.cta.turnstile-summary".to_string(),
            send_timeout: Duration::from_secs(30),
            flush_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_millis(500),
        }
    }
}

impl PipelineConfig {
    /// Builds a config from the environment, falling back to defaults.
    ///
    /// Recognized variables: `TRANSIT_BROKERS`, `TRANSIT_TRANSFORM_GROUP`,
    /// `TRANSIT_QUERY_GROUP`.
    pub fn from_env() -> Self {
        let mut config = PipelineConfig::default();
        if let Ok(brokers) = env::var("TRANSIT_BROKERS") {
            config.brokers = brokers;
        }
        if let Ok(group) = env::var("TRANSIT_TRANSFORM_GROUP") {
            config.transform_group = group;
        }
        if let Ok(group) = env::var("TRANSIT_QUERY_GROUP") {
            config.query_group = group;
        }
        config
    }

    pub fn with_brokers(mut self, brokers: impl Into<String>) -> Self {
        self.brokers = brokers.into();
        self
    }
}
