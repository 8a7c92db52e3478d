//! Error types for provisioning, producing, and consuming.

use crate::transit::kafka::serialization::SerializationError;
use crate::transit::kafka::topic::TopicSpec;
use crate::transit::schema::SchemaError;
use rdkafka::error::KafkaError;

/// Topic creation or metadata failure.
///
/// Retryable from the caller's point of view; a failure for one topic never
/// poisons the registry for other topics.
#[derive(Debug)]
pub enum ProvisionError {
    /// Client-level failure (connection, metadata fetch, admin request).
    Kafka(KafkaError),
    /// The broker rejected the creation request for this topic.
    Creation { topic: String, reason: String },
    /// A spec was already confirmed for this name and the new request
    /// disagrees with it.
    Conflict {
        requested: TopicSpec,
        existing: TopicSpec,
    },
}

impl std::fmt::Display for ProvisionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProvisionError::Kafka(e) => write!(f, "Kafka error: {}", e),
            ProvisionError::Creation { topic, reason } => {
                write!(f, "failed to create topic {}: {}", topic, reason)
            }
            ProvisionError::Conflict {
                requested,
                existing,
            } => write!(
                f,
                "topic spec conflict: requested {} but {} is already provisioned",
                requested, existing
            ),
        }
    }
}

impl std::error::Error for ProvisionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ProvisionError::Kafka(e) => Some(e),
            _ => None,
        }
    }
}

impl From<KafkaError> for ProvisionError {
    fn from(err: KafkaError) -> Self {
        ProvisionError::Kafka(err)
    }
}

/// Failure of a single publish call or of producer shutdown.
#[derive(Debug)]
pub enum PublishError {
    /// Topic assurance failed during producer construction.
    Provision(ProvisionError),
    /// Transport-level send failure; the caller decides retry vs. drop.
    Kafka(KafkaError),
    /// The record does not match its declared schema. The record was never
    /// sent and must not be retried unchanged.
    SchemaViolation(SchemaError),
    /// The record could not be serialized.
    Serialization(SerializationError),
    /// `publish` was called after `close` began.
    Closed,
}

impl std::fmt::Display for PublishError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PublishError::Provision(e) => write!(f, "Provisioning error: {}", e),
            PublishError::Kafka(e) => write!(f, "Kafka error: {}", e),
            PublishError::SchemaViolation(e) => write!(f, "Schema violation: {}", e),
            PublishError::Serialization(e) => write!(f, "Serialization error: {}", e),
            PublishError::Closed => write!(f, "producer is closed"),
        }
    }
}

impl std::error::Error for PublishError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PublishError::Provision(e) => Some(e),
            PublishError::Kafka(e) => Some(e),
            PublishError::SchemaViolation(e) => Some(e),
            PublishError::Serialization(e) => Some(e),
            PublishError::Closed => None,
        }
    }
}

impl From<ProvisionError> for PublishError {
    fn from(err: ProvisionError) -> Self {
        PublishError::Provision(err)
    }
}

impl From<KafkaError> for PublishError {
    fn from(err: KafkaError) -> Self {
        PublishError::Kafka(err)
    }
}

impl From<SchemaError> for PublishError {
    fn from(err: SchemaError) -> Self {
        PublishError::SchemaViolation(err)
    }
}

impl From<SerializationError> for PublishError {
    fn from(err: SerializationError) -> Self {
        PublishError::Serialization(err)
    }
}

/// Failure while consuming or deserializing a message.
#[derive(Debug)]
pub enum ConsumerError {
    Kafka(KafkaError),
    Serialization(SerializationError),
    NoMessage,
}

impl std::fmt::Display for ConsumerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConsumerError::Kafka(e) => write!(f, "Kafka error: {}", e),
            ConsumerError::Serialization(e) => write!(f, "Serialization error: {}", e),
            ConsumerError::NoMessage => write!(f, "No message available"),
        }
    }
}

impl std::error::Error for ConsumerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConsumerError::Kafka(e) => Some(e),
            ConsumerError::Serialization(e) => Some(e),
            ConsumerError::NoMessage => None,
        }
    }
}

impl From<KafkaError> for ConsumerError {
    fn from(err: KafkaError) -> Self {
        ConsumerError::Kafka(err)
    }
}

impl From<SerializationError> for ConsumerError {
    fn from(err: SerializationError) -> Self {
        ConsumerError::Serialization(err)
    }
}
