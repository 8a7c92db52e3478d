//! Schema-validated record producer.

use crate::transit::kafka::admin::{ClusterAdmin, TopicProvisioner};
use crate::transit::kafka::convert_kafka_log_level;
use crate::transit::kafka::error::{ProvisionError, PublishError};
use crate::transit::kafka::serialization::{SerializationError, Serializer};
use crate::transit::kafka::topic::TopicSpec;
use crate::transit::schema::RecordSchema;
use log::{debug, error, info};
use rdkafka::config::{ClientConfig, RDKafkaLogLevel};
use rdkafka::error::KafkaError;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use rdkafka::ClientContext;
use serde::Serialize;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Client context that bridges librdkafka's internal logs and global errors
/// into the `log` facade.
#[derive(Default)]
pub struct LoggingProducerContext;

impl ClientContext for LoggingProducerContext {
    fn log(&self, level: RDKafkaLogLevel, fac: &str, message: &str) {
        log::log!(convert_kafka_log_level(level), "Kafka ({}): {}", fac, message);
    }

    fn error(&self, error: KafkaError, reason: &str) {
        error!("Kafka client error: {:?}, reason: {}", error, reason);
    }
}

/// Millisecond-resolution wall-clock timestamp, for use as a partition or
/// ordering key when the caller has no natural key.
pub fn time_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// A producer bound to one provisioned topic.
///
/// Construction runs [`TopicProvisioner::ensure_topic`] for the bound topic
/// and fails fast if assurance fails, so a `RecordProducer` never publishes
/// into a topic that is not known to exist. Every outgoing key and value is
/// validated against its declared [`RecordSchema`] before serialization; a
/// mismatch fails that publish call and nothing is sent.
pub struct RecordProducer<K, V, KS, VS>
where
    KS: Serializer<K>,
    VS: Serializer<V>,
{
    producer: FutureProducer<LoggingProducerContext>,
    topic: String,
    key_schema: Option<RecordSchema>,
    value_schema: RecordSchema,
    key_serializer: KS,
    value_serializer: VS,
    send_timeout: Duration,
    flush_timeout: Duration,
    closed: AtomicBool,
    _phantom_key: PhantomData<K>,
    _phantom_value: PhantomData<V>,
}

impl<K, V, KS, VS> RecordProducer<K, V, KS, VS>
where
    K: Serialize,
    V: Serialize,
    KS: Serializer<K>,
    VS: Serializer<V>,
{
    /// Creates a producer for `spec`'s topic, ensuring the topic first.
    ///
    /// `key_schema` is `None` for topics with an opaque (non-record) key,
    /// e.g. a bare station id.
    #[allow(clippy::too_many_arguments)]
    pub async fn connect<A: ClusterAdmin>(
        brokers: &str,
        provisioner: &TopicProvisioner<A>,
        spec: TopicSpec,
        key_schema: Option<RecordSchema>,
        value_schema: RecordSchema,
        key_serializer: KS,
        value_serializer: VS,
        send_timeout: Duration,
        flush_timeout: Duration,
    ) -> Result<Self, ProvisionError> {
        provisioner.ensure_topic(&spec).await?;

        let producer: FutureProducer<LoggingProducerContext> = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "30000")
            .set("enable.idempotence", "true")
            .create_with_context(LoggingProducerContext)?;

        info!(
            "created producer for topic {} connected to {}",
            spec.name, brokers
        );

        Ok(RecordProducer {
            producer,
            topic: spec.name,
            key_schema,
            value_schema,
            key_serializer,
            value_serializer,
            send_timeout,
            flush_timeout,
            closed: AtomicBool::new(false),
            _phantom_key: PhantomData,
            _phantom_value: PhantomData,
        })
    }

    /// Publishes one record, awaiting the transport's durable acknowledgment.
    pub async fn publish(&self, key: &K, value: &V) -> Result<(), PublishError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(PublishError::Closed);
        }

        if let Some(schema) = &self.key_schema {
            let key_json = serde_json::to_value(key).map_err(SerializationError::Json)?;
            schema.validate(&key_json)?;
        }
        let value_json = serde_json::to_value(value).map_err(SerializationError::Json)?;
        self.value_schema.validate(&value_json)?;

        let key_bytes = self.key_serializer.serialize(key)?;
        let value_bytes = self.value_serializer.serialize(value)?;

        let record = FutureRecord::to(&self.topic)
            .payload(&value_bytes)
            .key(&key_bytes)
            .timestamp(time_millis());

        match self
            .producer
            .send(record, Timeout::After(self.send_timeout))
            .await
        {
            Ok(_) => {
                debug!("published record to {}", self.topic);
                Ok(())
            }
            Err((err, _)) => {
                error!("failed to publish to {}: {}", self.topic, err);
                Err(PublishError::Kafka(err))
            }
        }
    }

    /// Flushes and closes the producer.
    ///
    /// Idempotent; blocks until every record accepted before this call is
    /// durably acknowledged or failed. Records published concurrently with or
    /// after the first `close` are not guaranteed delivery.
    pub fn close(&self) -> Result<(), PublishError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.producer
            .flush(Timeout::After(self.flush_timeout))
            .map_err(PublishError::Kafka)
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}
