//! The turnstile aggregation query.
//!
//! A continuous grouped count over the turnstile event stream: for every
//! [`TurnstileEvent`] consumed, `count[station_id] += 1`, with results
//! published as a materialized summary keyed by station id. Cumulative over
//! the lifetime of the aggregation, with no windowing. On restart the count
//! state is rebuilt by replaying the compacted summary topic, then
//! consumption resumes from the last committed offset; recounting on
//! reprocessed events is an accepted at-least-once limitation.

use crate::transit::config::PipelineConfig;
use crate::transit::kafka::admin::{ClusterAdmin, TopicProvisioner};
use crate::transit::kafka::error::{ConsumerError, ProvisionError};
use crate::transit::kafka::serialization::{BytesSerializer, JsonSerializer};
use crate::transit::kafka::{KafkaConsumer, RecordProducer, TopicSpec, GROUP_JOIN_GRACE};
use crate::transit::model::{turnstile_summary_schema, TurnstileEvent, TurnstileSummary};
use crate::transit::stream::StageError;
use futures::StreamExt;
use log::{error, info, warn};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::Mutex;

type TurnstileConsumer = KafkaConsumer<Vec<u8>, TurnstileEvent, BytesSerializer, JsonSerializer>;
type SummaryProducer = RecordProducer<i64, TurnstileSummary, JsonSerializer, JsonSerializer>;

/// Consumer type the aggregation recovers from: the compacted summary topic,
/// keyed by station id.
pub type SummaryConsumer = KafkaConsumer<i64, TurnstileSummary, JsonSerializer, JsonSerializer>;

/// Aggregate functions the registry accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFunction {
    Count,
}

/// A registration request for a continuous aggregation.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregationSpec {
    pub source_topic: String,
    pub group_by: String,
    pub aggregate: AggregateFunction,
    pub output_name: String,
}

impl AggregationSpec {
    /// The turnstile count: group the turnstile stream by station id.
    pub fn turnstile_summary(config: &PipelineConfig) -> Self {
        AggregationSpec {
            source_topic: config.turnstile_topic.clone(),
            group_by: "station_id".to_string(),
            aggregate: AggregateFunction::Count,
            output_name: config.summary_topic.clone(),
        }
    }
}

/// Outcome of a registration request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// The output was materialized by this call.
    Created,
    /// An equivalent aggregation was already active; nothing was changed and
    /// no counts were reset.
    AlreadyActive,
}

/// Registration failure.
#[derive(Debug)]
pub enum RegistrationError {
    Provision(ProvisionError),
    /// A different aggregation is already registered under this output name.
    Conflict { output_name: String },
}

impl std::fmt::Display for RegistrationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistrationError::Provision(e) => write!(f, "Provisioning error: {}", e),
            RegistrationError::Conflict { output_name } => write!(
                f,
                "a different aggregation is already registered as {}",
                output_name
            ),
        }
    }
}

impl std::error::Error for RegistrationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RegistrationError::Provision(e) => Some(e),
            RegistrationError::Conflict { .. } => None,
        }
    }
}

impl From<ProvisionError> for RegistrationError {
    fn from(err: ProvisionError) -> Self {
        RegistrationError::Provision(err)
    }
}

/// Registers continuous aggregations, idempotently.
///
/// Before issuing a registration the registry checks whether the target
/// output is already materialized — locally first, then against the cluster —
/// so re-registering an active aggregation is a no-op that neither
/// duplicates the output nor resets its counts. A registration failure is
/// logged by the caller and does not prevent other registrations.
pub struct AggregationRegistry<A: ClusterAdmin> {
    admin: A,
    active: Mutex<HashMap<String, AggregationSpec>>,
}

impl<A: ClusterAdmin> AggregationRegistry<A> {
    pub fn new(admin: A) -> Self {
        AggregationRegistry {
            admin,
            active: Mutex::new(HashMap::new()),
        }
    }

    pub async fn register(&self, spec: AggregationSpec) -> Result<Registration, RegistrationError> {
        let mut active = self.active.lock().await;

        if let Some(existing) = active.get(&spec.output_name) {
            if existing == &spec {
                return Ok(Registration::AlreadyActive);
            }
            return Err(RegistrationError::Conflict {
                output_name: spec.output_name.clone(),
            });
        }

        if self.admin.topic_exists(&spec.output_name).await? {
            // Materialized by a previous run or another process.
            info!("aggregation output {} already exists", spec.output_name);
            active.insert(spec.output_name.clone(), spec);
            return Ok(Registration::AlreadyActive);
        }

        self.admin
            .create_topic(&TopicSpec::compacted(&spec.output_name, 1, 1))
            .await?;
        info!(
            "registered {:?} over {} grouped by {} as {}",
            spec.aggregate, spec.source_topic, spec.group_by, spec.output_name
        );
        active.insert(spec.output_name.clone(), spec);
        Ok(Registration::Created)
    }
}

/// Cumulative per-station count state.
///
/// Owned by the query alone — independent of the station state table.
#[derive(Default)]
pub struct TurnstileAggregation {
    counts: RwLock<HashMap<i64, i64>>,
}

impl TurnstileAggregation {
    pub fn new() -> Self {
        TurnstileAggregation::default()
    }

    /// Rebuilds count state by folding a finite sequence of summary rows in
    /// offset order (latest row per station wins).
    pub fn restore<I>(summaries: I) -> Self
    where
        I: IntoIterator<Item = TurnstileSummary>,
    {
        let aggregation = TurnstileAggregation::new();
        for summary in summaries {
            aggregation.absorb(&summary);
        }
        aggregation
    }

    fn absorb(&self, summary: &TurnstileSummary) {
        self.counts
            .write()
            .expect("count state lock poisoned")
            .insert(summary.station_id, summary.count);
    }

    /// Replays the compacted summary topic until it has been idle for `idle`,
    /// folding every row back into the count state. Returns the number of
    /// rows absorbed.
    ///
    /// Run this before consuming new events, so a restarted query resumes
    /// its counts instead of resetting them to zero. The first wait is
    /// stretched to [`GROUP_JOIN_GRACE`] to cover consumer group join and
    /// partition assignment.
    pub async fn recover(&self, consumer: &SummaryConsumer, idle: Duration) -> usize {
        consumer
            .replay(GROUP_JOIN_GRACE.max(idle), idle, |message| {
                self.absorb(message.value())
            })
            .await
    }

    /// Folds one event into the count state and returns the updated summary
    /// row for its station.
    pub fn apply(&self, event: &TurnstileEvent) -> TurnstileSummary {
        let mut counts = self.counts.write().expect("count state lock poisoned");
        let count = counts.entry(event.station_id).or_insert(0);
        *count += 1;
        TurnstileSummary {
            station_id: event.station_id,
            count: *count,
        }
    }

    /// Current count for a station; zero if no event has been seen.
    pub fn count(&self, station_id: i64) -> i64 {
        self.counts
            .read()
            .expect("count state lock poisoned")
            .get(&station_id)
            .copied()
            .unwrap_or(0)
    }

    pub fn snapshot(&self) -> HashMap<i64, i64> {
        self.counts
            .read()
            .expect("count state lock poisoned")
            .clone()
    }
}

/// The running query: consumes turnstile events, maintains the aggregation,
/// and publishes each updated summary to the compacted output topic.
pub struct TurnstileQuery {
    consumer: TurnstileConsumer,
    producer: SummaryProducer,
    aggregation: Arc<TurnstileAggregation>,
    running: AtomicBool,
    poll_interval: Duration,
}

impl TurnstileQuery {
    /// Builds the query: registers the aggregation, subscribes to the event
    /// topic, and provisions the summary output. `aggregation` carries the
    /// count state recovered from the summary topic.
    pub async fn new<A: ClusterAdmin, R: ClusterAdmin>(
        config: &PipelineConfig,
        provisioner: &TopicProvisioner<A>,
        registry: &AggregationRegistry<R>,
        aggregation: Arc<TurnstileAggregation>,
    ) -> Result<Self, StageError> {
        match registry
            .register(AggregationSpec::turnstile_summary(config))
            .await
        {
            Ok(registration) => info!("turnstile summary registration: {:?}", registration),
            // Registration errors do not abort the pipeline; the producer
            // below still ensures the output topic before publishing.
            Err(e) => warn!("turnstile summary registration failed: {}", e),
        }

        let consumer = TurnstileConsumer::new(
            &config.brokers,
            &config.query_group,
            BytesSerializer,
            JsonSerializer,
        )
        .map_err(StageError::Kafka)?;
        consumer
            .subscribe(&[&config.turnstile_topic])
            .map_err(StageError::Kafka)?;

        let producer = SummaryProducer::connect(
            &config.brokers,
            provisioner,
            TopicSpec::compacted(&config.summary_topic, 1, 1),
            None,
            turnstile_summary_schema(),
            JsonSerializer,
            JsonSerializer,
            config.send_timeout,
            config.flush_timeout,
        )
        .await?;

        Ok(TurnstileQuery {
            consumer,
            producer,
            aggregation,
            running: AtomicBool::new(false),
            poll_interval: config.poll_interval,
        })
    }

    /// Runs until [`stop`](Self::stop) is called, incrementally recomputing
    /// the summary as events arrive.
    pub async fn run(&self) -> Result<(), ConsumerError> {
        self.running.store(true, Ordering::Release);
        info!("turnstile aggregation query started");

        let mut stream = self.consumer.stream();

        while self.running.load(Ordering::Acquire) {
            let message = match tokio::time::timeout(self.poll_interval, stream.next()).await {
                Ok(Some(Ok(message))) => message,
                Ok(Some(Err(e))) => {
                    warn!("error reading turnstile event: {}", e);
                    continue;
                }
                Ok(None) | Err(_) => continue,
            };

            let summary = self.aggregation.apply(message.value());
            match self.producer.publish(&summary.station_id, &summary).await {
                Ok(()) => {
                    if let Err(e) = self.consumer.commit() {
                        warn!("offset commit failed: {}", e);
                    }
                }
                Err(e) => error!(
                    "failed to publish summary for station {}: {}",
                    summary.station_id, e
                ),
            }
        }

        info!("turnstile aggregation query stopped");
        Ok(())
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn close(&self) -> Result<(), crate::transit::kafka::PublishError> {
        self.producer.close()
    }

    pub fn aggregation(&self) -> &Arc<TurnstileAggregation> {
        &self.aggregation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(station_id: i64) -> TurnstileEvent {
        TurnstileEvent {
            station_id,
            station_name: "Howard".to_string(),
            line: "red".to_string(),
            num_entries: 1,
        }
    }

    #[test]
    fn test_count_increments_per_event() {
        let aggregation = TurnstileAggregation::new();
        assert_eq!(aggregation.count(40900), 0);

        let first = aggregation.apply(&event(40900));
        assert_eq!(first.count, 1);
        let second = aggregation.apply(&event(40900));
        assert_eq!(second.count, 2);
        assert_eq!(aggregation.count(40900), 2);
    }

    #[test]
    fn test_counts_are_independent_per_station() {
        let aggregation = TurnstileAggregation::new();
        aggregation.apply(&event(40900));
        aggregation.apply(&event(40900));
        aggregation.apply(&event(40510));

        assert_eq!(aggregation.count(40900), 2);
        assert_eq!(aggregation.count(40510), 1);
        assert_eq!(aggregation.snapshot().len(), 2);
    }

    #[test]
    fn test_restore_folds_latest_summary_per_station() {
        let restored = TurnstileAggregation::restore(vec![
            TurnstileSummary {
                station_id: 40900,
                count: 3,
            },
            TurnstileSummary {
                station_id: 40510,
                count: 7,
            },
            TurnstileSummary {
                station_id: 40900,
                count: 5,
            },
        ]);

        assert_eq!(restored.count(40900), 5);
        assert_eq!(restored.count(40510), 7);
    }

    #[test]
    fn test_recovered_counts_resume_counting() {
        let restored = TurnstileAggregation::restore(vec![TurnstileSummary {
            station_id: 40900,
            count: 100,
        }]);

        let next = restored.apply(&event(40900));
        assert_eq!(next.count, 101);
        assert_eq!(restored.count(40900), 101);
    }

    #[test]
    fn test_replay_from_cold_start_yields_n() {
        let aggregation = TurnstileAggregation::new();
        let mut last = 0;
        for _ in 0..50 {
            let summary = aggregation.apply(&event(40900));
            // Monotonically non-decreasing across the replay.
            assert!(summary.count > last);
            last = summary.count;
        }
        assert_eq!(aggregation.count(40900), 50);
    }
}
