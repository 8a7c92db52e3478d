//! Materialized station state, backed by the transform stage's output topic
//! as its changelog.

use crate::transit::kafka::serialization::JsonSerializer;
use crate::transit::kafka::{KafkaConsumer, GROUP_JOIN_GRACE};
use crate::transit::model::{StationStateEntry, TransformedStationRecord};
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, SystemTime};

/// Consumer type the table recovers from: the transform stage's output topic,
/// keyed by station id.
pub type ChangelogConsumer =
    KafkaConsumer<i64, TransformedStationRecord, JsonSerializer, JsonSerializer>;

/// A materialized key-value view of station state, keyed by station id.
///
/// One entry per station; every new record for a station overwrites its
/// entry (last-write-wins in source-offset order). Entries are never
/// deleted — compaction on the changelog topic retains the latest value per
/// key for the lifetime of the pipeline.
///
/// The table holds no durable state of its own. It is exclusively mutated by
/// the transform stage, which applies the same record it publishes; crash
/// recovery is therefore [`StationStateTable::recover`] replaying the output
/// topic, never the reverse.
#[derive(Default)]
pub struct StationStateTable {
    state: RwLock<HashMap<i64, StationStateEntry>>,
    last_updated: RwLock<Option<SystemTime>>,
}

/// Point-in-time statistics about the table.
#[derive(Debug, Clone)]
pub struct TableStats {
    pub key_count: usize,
    pub last_updated: Option<SystemTime>,
}

impl StationStateTable {
    pub fn new() -> Self {
        StationStateTable::default()
    }

    /// Rebuilds a table by replaying a finite changelog sequence in offset
    /// order.
    pub fn restore<I>(records: I) -> Self
    where
        I: IntoIterator<Item = TransformedStationRecord>,
    {
        let table = StationStateTable::new();
        for record in records {
            table.apply(&record);
        }
        table
    }

    /// Applies one changelog record, overwriting the entry for its station.
    pub fn apply(&self, record: &TransformedStationRecord) {
        let entry = StationStateEntry::from(record);
        self.state
            .write()
            .expect("station table lock poisoned")
            .insert(entry.station_id, entry);
        *self
            .last_updated
            .write()
            .expect("station table lock poisoned") = Some(SystemTime::now());
    }

    /// Replays the changelog topic until it has been idle for `idle`,
    /// applying every record. Returns the number of records applied.
    ///
    /// The consumer must be subscribed to the changelog topic with an
    /// earliest offset reset, so a restarted process sees the full compacted
    /// log and converges to the pre-crash table. The first wait is stretched
    /// to [`GROUP_JOIN_GRACE`] so a slow consumer group join cannot be
    /// mistaken for an empty log.
    pub async fn recover(&self, consumer: &ChangelogConsumer, idle: Duration) -> usize {
        consumer
            .replay(GROUP_JOIN_GRACE.max(idle), idle, |message| {
                self.apply(message.value())
            })
            .await
    }

    pub fn get(&self, station_id: i64) -> Option<StationStateEntry> {
        self.state
            .read()
            .expect("station table lock poisoned")
            .get(&station_id)
            .cloned()
    }

    pub fn contains(&self, station_id: i64) -> bool {
        self.state
            .read()
            .expect("station table lock poisoned")
            .contains_key(&station_id)
    }

    pub fn len(&self) -> usize {
        self.state.read().expect("station table lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Clones the entire table. Use with care once station cardinality grows.
    pub fn snapshot(&self) -> HashMap<i64, StationStateEntry> {
        self.state
            .read()
            .expect("station table lock poisoned")
            .clone()
    }

    pub fn stats(&self) -> TableStats {
        TableStats {
            key_count: self.len(),
            last_updated: *self
                .last_updated
                .read()
                .expect("station table lock poisoned"),
        }
    }
}
