//! Typed Kafka consumer yielding deserialized messages as a stream.

use crate::transit::kafka::error::ConsumerError;
use crate::transit::kafka::serialization::Serializer;
use futures::StreamExt;
use log::warn;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::error::KafkaError;
use rdkafka::message::Message as KafkaMessage;
use std::marker::PhantomData;
use std::time::Duration;

/// Lower bound on a replay's first wait: a fresh consumer group can take
/// several seconds to join and receive its partition assignment, well past
/// any steady-state idle window.
pub const GROUP_JOIN_GRACE: Duration = Duration::from_secs(15);

/// A deserialized message: optional key plus value.
#[derive(Debug)]
pub struct Message<K, V> {
    pub key: Option<K>,
    pub value: V,
}

impl<K, V> Message<K, V> {
    pub fn new(key: Option<K>, value: V) -> Self {
        Self { key, value }
    }

    pub fn key(&self) -> Option<&K> {
        self.key.as_ref()
    }

    pub fn value(&self) -> &V {
        &self.value
    }

    pub fn into_parts(self) -> (Option<K>, V) {
        (self.key, self.value)
    }
}

/// A Kafka consumer that deserializes keys and values automatically.
///
/// Reads from the earliest offset by default so state-rebuilding consumers
/// (the table changelog replay) see the full log.
pub struct KafkaConsumer<K, V, KS, VS>
where
    KS: Serializer<K>,
    VS: Serializer<V>,
{
    consumer: StreamConsumer,
    group_id: String,
    key_serializer: KS,
    value_serializer: VS,
    _phantom_key: PhantomData<K>,
    _phantom_value: PhantomData<V>,
}

impl<K, V, KS, VS> KafkaConsumer<K, V, KS, VS>
where
    KS: Serializer<K>,
    VS: Serializer<V>,
{
    pub fn new(
        brokers: &str,
        group_id: &str,
        key_serializer: KS,
        value_serializer: VS,
    ) -> Result<Self, KafkaError> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("group.id", group_id)
            .set("auto.offset.reset", "earliest")
            .set("enable.auto.commit", "false")
            .create()?;

        Ok(KafkaConsumer {
            consumer,
            group_id: group_id.to_string(),
            key_serializer,
            value_serializer,
            _phantom_key: PhantomData,
            _phantom_value: PhantomData,
        })
    }

    pub fn subscribe(&self, topics: &[&str]) -> Result<(), KafkaError> {
        self.consumer.subscribe(topics)
    }

    /// Replays the subscribed log, invoking `on_message` for every
    /// deserialized message, until the log has been idle for `idle`.
    ///
    /// The first wait is `first_wait`, stretched past the steady-state idle
    /// window so that consumer group join and partition assignment cannot be
    /// mistaken for an empty log. Unreadable messages are skipped with a
    /// warning. Returns the number of messages delivered to `on_message`.
    pub async fn replay<F>(&self, first_wait: Duration, idle: Duration, on_message: F) -> usize
    where
        F: FnMut(Message<K, V>),
    {
        drain_until_idle(self.stream(), first_wait, idle, on_message).await
    }

    /// A stream of deserialized typed messages.
    pub fn stream(
        &self,
    ) -> impl futures::Stream<Item = Result<Message<K, V>, ConsumerError>> + '_ {
        self.consumer.stream().map(|msg_result| match msg_result {
            Ok(borrowed) => {
                let payload = borrowed.payload().ok_or(ConsumerError::NoMessage)?;
                let value = self
                    .value_serializer
                    .deserialize(payload)
                    .map_err(ConsumerError::Serialization)?;

                let key = match borrowed.key() {
                    Some(key_bytes) => Some(
                        self.key_serializer
                            .deserialize(key_bytes)
                            .map_err(ConsumerError::Serialization)?,
                    ),
                    None => None,
                };

                Ok(Message::new(key, value))
            }
            Err(e) => Err(ConsumerError::Kafka(e)),
        })
    }

    /// Synchronously commits the current consumer state.
    pub fn commit(&self) -> Result<(), KafkaError> {
        self.consumer.commit_consumer_state(CommitMode::Sync)
    }

    pub fn group_id(&self) -> &str {
        &self.group_id
    }
}

async fn drain_until_idle<K, V, S, F>(
    mut stream: S,
    first_wait: Duration,
    idle: Duration,
    mut on_message: F,
) -> usize
where
    S: futures::Stream<Item = Result<Message<K, V>, ConsumerError>> + Unpin,
    F: FnMut(Message<K, V>),
{
    let mut delivered = 0usize;
    let mut wait = first_wait;
    loop {
        match tokio::time::timeout(wait, stream.next()).await {
            Ok(Some(Ok(message))) => {
                on_message(message);
                delivered += 1;
                wait = idle;
            }
            Ok(Some(Err(e))) => {
                // A bad record still proves the assignment is live.
                warn!("skipping unreadable record during replay: {}", e);
                wait = idle;
            }
            Ok(None) => break,
            Err(_) => break, // log has gone idle
        }
    }
    delivered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transit::kafka::serialization::{JsonSerializer, SerializationError};
    use crate::transit::model::TurnstileEvent;
    use futures::stream;

    fn event() -> TurnstileEvent {
        TurnstileEvent {
            station_id: 40900,
            station_name: "Howard".to_string(),
            line: "red".to_string(),
            num_entries: 1,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_replay_waits_out_slow_partition_assignment() {
        // The first message lands well after the idle window, as it does
        // while a fresh consumer group is still joining.
        let delayed = stream::once(async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, ConsumerError>(Message::new(Some(40900i64), event()))
        })
        .chain(stream::pending());

        let mut seen = 0;
        let delivered = drain_until_idle(
            Box::pin(delayed),
            Duration::from_secs(15),
            Duration::from_secs(2),
            |_| seen += 1,
        )
        .await;

        assert_eq!(delivered, 1);
        assert_eq!(seen, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_replay_stops_once_the_log_goes_idle() {
        let log = stream::iter(vec![
            Ok::<_, ConsumerError>(Message::new(Some(1i64), event())),
            Ok(Message::new(None, event())),
        ])
        .chain(stream::pending());

        let mut seen = 0;
        let delivered = drain_until_idle(
            Box::pin(log),
            Duration::from_secs(15),
            Duration::from_secs(2),
            |_| seen += 1,
        )
        .await;

        assert_eq!(delivered, 2);
        assert_eq!(seen, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_replay_skips_unreadable_records() {
        let bad = ConsumerError::Serialization(SerializationError::Json(
            serde_json::from_slice::<TurnstileEvent>(b"not-json").unwrap_err(),
        ));
        let log = stream::iter(vec![Err(bad), Ok(Message::new(Some(1i64), event()))])
            .chain(stream::pending());

        let delivered = drain_until_idle(
            Box::pin(log),
            Duration::from_secs(15),
            Duration::from_secs(2),
            |_| {},
        )
        .await;

        assert_eq!(delivered, 1);
    }

    #[test]
    fn test_message_accessors() {
        let message = Message::new(
            Some(40900i64),
            TurnstileEvent {
                station_id: 40900,
                station_name: "Howard".to_string(),
                line: "red".to_string(),
                num_entries: 1,
            },
        );
        assert_eq!(message.key(), Some(&40900));
        assert_eq!(message.value().station_name, "Howard");

        let (key, value) = message.into_parts();
        assert_eq!(key, Some(40900));
        assert_eq!(value.station_id, 40900);
    }

    #[tokio::test]
    async fn test_consumer_construction() {
        // Constructing a consumer does not contact the broker, so this works
        // without a cluster; it only validates the client configuration.
        let consumer = KafkaConsumer::<i64, TurnstileEvent, _, _>::new(
            "localhost:9092",
            "test-group",
            JsonSerializer,
            JsonSerializer,
        );
        assert!(consumer.is_ok());
    }
}
