//! Domain records flowing through the pipeline.

use crate::transit::schema::{FieldType, RecordSchema};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Raw station record as written by the upstream collector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationRecord {
    pub stop_id: i64,
    pub direction_id: String,
    pub stop_name: String,
    pub station_name: String,
    pub station_descriptive_name: String,
    pub station_id: i64,
    pub order: i64,
    pub red_line: bool,
    pub blue_line: bool,
    pub green_line: bool,
}

impl StationRecord {
    /// Derives the categorical line for this station: red wins over blue,
    /// blue over green.
    ///
    /// A record with no line flag set has no defined classification and is
    /// rejected with [`ValidationError::UndefinedLine`] rather than assigned
    /// a sentinel — an undefined category must never leak into the compacted
    /// output topic.
    pub fn line(&self) -> Result<Line, ValidationError> {
        if self.red_line {
            Ok(Line::Red)
        } else if self.blue_line {
            Ok(Line::Blue)
        } else if self.green_line {
            Ok(Line::Green)
        } else {
            Err(ValidationError::UndefinedLine {
                station_id: self.station_id,
            })
        }
    }
}

/// Station line color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Line {
    Red,
    Blue,
    Green,
}

impl Line {
    pub fn as_str(&self) -> &'static str {
        match self {
            Line::Red => "red",
            Line::Blue => "blue",
            Line::Green => "green",
        }
    }
}

impl fmt::Display for Line {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Normalized station record published by the transform stage, keyed by
/// `station_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformedStationRecord {
    pub station_id: i64,
    pub station_name: String,
    pub order: i64,
    pub line: Line,
}

/// One row of the materialized station state table. Last-write-wins per
/// `station_id`, ordered by source topic offset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationStateEntry {
    pub station_id: i64,
    pub station_name: String,
    pub order: i64,
    pub line: Line,
}

impl From<&TransformedStationRecord> for StationStateEntry {
    fn from(record: &TransformedStationRecord) -> Self {
        StationStateEntry {
            station_id: record.station_id,
            station_name: record.station_name.clone(),
            order: record.order,
            line: record.line,
        }
    }
}

/// One event per rider entry. Append-only, no inherent primary key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnstileEvent {
    pub station_id: i64,
    pub station_name: String,
    pub line: String,
    #[serde(default)]
    pub num_entries: i64,
}

/// Running per-station count produced by the aggregation query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnstileSummary {
    pub station_id: i64,
    pub count: i64,
}

/// A station record with an undefined categorical classification.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    UndefinedLine { station_id: i64 },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::UndefinedLine { station_id } => {
                write!(f, "station {} has no line flag set", station_id)
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// Value schema for the normalized station topic.
pub fn transformed_station_schema() -> RecordSchema {
    RecordSchema::new("transformed_station")
        .field("station_id", FieldType::Long)
        .field("station_name", FieldType::String)
        .field("order", FieldType::Long)
        .field("line", FieldType::String)
}

/// Value schema for the turnstile topic.
pub fn turnstile_value_schema() -> RecordSchema {
    RecordSchema::new("turnstile_entry")
        .field("station_id", FieldType::Long)
        .field("station_name", FieldType::String)
        .field("line", FieldType::String)
        .optional_field("num_entries", FieldType::Long)
}

/// Value schema for the aggregation output.
pub fn turnstile_summary_schema() -> RecordSchema {
    RecordSchema::new("turnstile_summary")
        .field("station_id", FieldType::Long)
        .field("count", FieldType::Long)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn station(red: bool, blue: bool, green: bool) -> StationRecord {
        StationRecord {
            stop_id: 30173,
            direction_id: "E".to_string(),
            stop_name: "Garfield (63rd-bound)".to_string(),
            station_name: "Garfield".to_string(),
            station_descriptive_name: "Garfield (Green Line)".to_string(),
            station_id: 40510,
            order: 14,
            red_line: red,
            blue_line: blue,
            green_line: green,
        }
    }

    #[test]
    fn test_line_derivation() {
        assert_eq!(station(true, false, false).line(), Ok(Line::Red));
        assert_eq!(station(false, true, false).line(), Ok(Line::Blue));
        assert_eq!(station(false, false, true).line(), Ok(Line::Green));
    }

    #[test]
    fn test_no_line_flag_is_rejected() {
        match station(false, false, false).line() {
            Err(ValidationError::UndefinedLine { station_id }) => assert_eq!(station_id, 40510),
            other => panic!("expected UndefinedLine, got {:?}", other),
        }
    }

    #[test]
    fn test_line_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Line::Red).unwrap(), "\"red\"");
        assert_eq!(serde_json::to_string(&Line::Blue).unwrap(), "\"blue\"");
        assert_eq!(serde_json::to_string(&Line::Green).unwrap(), "\"green\"");
    }

    #[test]
    fn test_transformed_record_satisfies_its_schema() {
        let record = TransformedStationRecord {
            station_id: 40510,
            station_name: "Garfield".to_string(),
            order: 14,
            line: Line::Green,
        };
        let value = serde_json::to_value(&record).unwrap();
        assert!(transformed_station_schema().validate(&value).is_ok());
    }

    #[test]
    fn test_turnstile_event_satisfies_its_schema() {
        let event = TurnstileEvent {
            station_id: 40900,
            station_name: "Howard".to_string(),
            line: "red".to_string(),
            num_entries: 2,
        };
        let value = serde_json::to_value(&event).unwrap();
        assert!(turnstile_value_schema().validate(&value).is_ok());
    }

    #[test]
    fn test_turnstile_event_missing_num_entries_defaults() {
        let event: TurnstileEvent = serde_json::from_str(
            r#"{"station_id": 1, "station_name": "Howard", "line": "red"}"#,
        )
        .unwrap();
        assert_eq!(event.num_entries, 0);
    }
}
