//! The station transform stage.
//!
//! A continuously running consumer that normalizes raw station records and
//! maintains the station state table. For every input record it derives the
//! categorical `line`, publishes a [`TransformedStationRecord`] keyed by
//! station id to the output topic, and applies that same output record to the
//! table — so the table is always derivable from the published changelog and
//! recovery replays the output topic, not the reverse.

use crate::transit::config::PipelineConfig;
use crate::transit::kafka::admin::{ClusterAdmin, TopicProvisioner};
use crate::transit::kafka::error::{ConsumerError, ProvisionError};
use crate::transit::kafka::serialization::{JsonSerializer, StringSerializer};
use crate::transit::kafka::{KafkaConsumer, RecordProducer, TopicSpec};
use crate::transit::model::{
    transformed_station_schema, StationRecord, TransformedStationRecord, ValidationError,
};
use crate::transit::table::StationStateTable;
use futures::StreamExt;
use log::{error, info, warn};
use rdkafka::error::KafkaError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

type StationConsumer = KafkaConsumer<String, StationRecord, StringSerializer, JsonSerializer>;
type TransformedProducer =
    RecordProducer<i64, TransformedStationRecord, JsonSerializer, JsonSerializer>;

/// Failure constructing the stage.
#[derive(Debug)]
pub enum StageError {
    Provision(ProvisionError),
    Kafka(KafkaError),
}

impl std::fmt::Display for StageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StageError::Provision(e) => write!(f, "Provisioning error: {}", e),
            StageError::Kafka(e) => write!(f, "Kafka error: {}", e),
        }
    }
}

impl std::error::Error for StageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StageError::Provision(e) => Some(e),
            StageError::Kafka(e) => Some(e),
        }
    }
}

impl From<ProvisionError> for StageError {
    fn from(err: ProvisionError) -> Self {
        StageError::Provision(err)
    }
}

impl From<KafkaError> for StageError {
    fn from(err: KafkaError) -> Self {
        StageError::Kafka(err)
    }
}

/// Continuously running transform over the raw station topic.
pub struct StationTransformStage {
    consumer: StationConsumer,
    producer: TransformedProducer,
    table: Arc<StationStateTable>,
    running: AtomicBool,
    poll_interval: std::time::Duration,
}

impl StationTransformStage {
    /// Builds the stage: subscribes to the station topic and provisions the
    /// output/changelog topic before the producer is handed out.
    pub async fn new<A: ClusterAdmin>(
        config: &PipelineConfig,
        provisioner: &TopicProvisioner<A>,
        table: Arc<StationStateTable>,
    ) -> Result<Self, StageError> {
        let consumer = StationConsumer::new(
            &config.brokers,
            &config.transform_group,
            StringSerializer,
            JsonSerializer,
        )?;
        consumer.subscribe(&[&config.stations_topic])?;

        // Single partition keeps per-station ordering trivially; the topic
        // doubles as the table changelog.
        let producer = TransformedProducer::connect(
            &config.brokers,
            provisioner,
            TopicSpec::compacted(&config.transformed_topic, 1, 1),
            None, // keyed by a bare station id, no record key schema
            transformed_station_schema(),
            JsonSerializer,
            JsonSerializer,
            config.send_timeout,
            config.flush_timeout,
        )
        .await?;

        Ok(StationTransformStage {
            consumer,
            producer,
            table,
            running: AtomicBool::new(false),
            poll_interval: config.poll_interval,
        })
    }

    /// Derives the normalized projection of one station record.
    ///
    /// Fails with [`ValidationError::UndefinedLine`] when no line flag is
    /// set; the run loop drops such records with a warning.
    pub fn transform(
        record: &StationRecord,
    ) -> Result<TransformedStationRecord, ValidationError> {
        let line = record.line()?;
        Ok(TransformedStationRecord {
            station_id: record.station_id,
            station_name: record.station_name.clone(),
            order: record.order,
            line,
        })
    }

    /// Runs until [`stop`](Self::stop) is called.
    ///
    /// Per-record failure policy: validation and schema errors abort only
    /// that record's processing; transport errors are logged and the record
    /// is not applied to the table (the table must stay derivable from the
    /// published log). Stopping lets the in-flight record complete before
    /// returning.
    pub async fn run(&self) -> Result<(), ConsumerError> {
        self.running.store(true, Ordering::Release);
        info!("station transform stage started");

        let mut stream = self.consumer.stream();

        while self.running.load(Ordering::Acquire) {
            let message = match tokio::time::timeout(self.poll_interval, stream.next()).await {
                Ok(Some(Ok(message))) => message,
                Ok(Some(Err(e))) => {
                    warn!("error reading station record: {}", e);
                    continue;
                }
                Ok(None) | Err(_) => continue,
            };

            match Self::transform(message.value()) {
                Ok(transformed) => {
                    match self.producer.publish(&transformed.station_id, &transformed).await {
                        Ok(()) => {
                            // Table state is derived from the record just
                            // published, never applied ahead of it.
                            self.table.apply(&transformed);
                            if let Err(e) = self.consumer.commit() {
                                warn!("offset commit failed: {}", e);
                            }
                        }
                        Err(e) => {
                            error!(
                                "failed to publish transformed record for station {}: {}",
                                transformed.station_id, e
                            );
                        }
                    }
                }
                Err(e) => warn!("dropping station record: {}", e),
            }
        }

        info!("station transform stage stopped");
        Ok(())
    }

    /// Stops pulling new records. The current record finishes processing.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Flushes and closes the output producer. Call after the run loop has
    /// exited.
    pub fn close(&self) -> Result<(), crate::transit::kafka::PublishError> {
        self.producer.close()
    }

    pub fn table(&self) -> &Arc<StationStateTable> {
        &self.table
    }
}
