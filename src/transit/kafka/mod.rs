//! Kafka transport layer: topic provisioning, schema-validated producers,
//! typed consumers, and pluggable serialization.

pub mod admin;
pub mod consumer;
pub mod error;
pub mod producer;
pub mod serialization;
pub mod topic;

pub use admin::{ClusterAdmin, KafkaClusterAdmin, TopicProvisioner, TopicRegistry};
pub use consumer::{KafkaConsumer, Message, GROUP_JOIN_GRACE};
pub use error::{ConsumerError, ProvisionError, PublishError};
pub use producer::{time_millis, LoggingProducerContext, RecordProducer};
pub use serialization::{
    AvroSerializer, BytesSerializer, JsonSerializer, SerializationError, Serializer,
    StringSerializer,
};
pub use topic::{CompressionCodec, RetentionPolicy, TopicSpec};

use rdkafka::config::RDKafkaLogLevel;

/// Maps librdkafka's syslog-style levels onto the `log` facade.
pub(crate) fn convert_kafka_log_level(level: RDKafkaLogLevel) -> log::Level {
    match level {
        RDKafkaLogLevel::Emerg
        | RDKafkaLogLevel::Alert
        | RDKafkaLogLevel::Critical
        | RDKafkaLogLevel::Error => log::Level::Error,
        RDKafkaLogLevel::Warning => log::Level::Warn,
        RDKafkaLogLevel::Notice | RDKafkaLogLevel::Info => log::Level::Info,
        RDKafkaLogLevel::Debug => log::Level::Debug,
    }
}
