//! Structural record schemas.
//!
//! A [`RecordSchema`] declares the field set a topic's keys or values must
//! carry: field name, type, and whether the field is required. Producers
//! validate every outgoing record against its declared schema before handing
//! it to the transport, so a malformed record is dropped with a
//! [`SchemaError`] and never sent. The schema is deliberately independent of
//! the wire format — it is the contract any serialization of the record must
//! satisfy.

use serde_json::Value;
use std::fmt;

/// Field types a record schema can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Boolean,
    /// 32-bit signed integer.
    Int,
    /// 64-bit signed integer.
    Long,
    Double,
    String,
}

impl FieldType {
    fn matches(&self, value: &Value) -> bool {
        match self {
            FieldType::Boolean => value.is_boolean(),
            FieldType::Int => value
                .as_i64()
                .map(|n| i32::try_from(n).is_ok())
                .unwrap_or(false),
            FieldType::Long => value.is_i64(),
            FieldType::Double => value.is_number(),
            FieldType::String => value.is_string(),
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldType::Boolean => "boolean",
            FieldType::Int => "int",
            FieldType::Long => "long",
            FieldType::Double => "double",
            FieldType::String => "string",
        };
        write!(f, "{}", name)
    }
}

/// A single declared field.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaField {
    pub name: String,
    pub field_type: FieldType,
    pub required: bool,
}

/// A named, ordered set of declared fields.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordSchema {
    name: String,
    fields: Vec<SchemaField>,
}

impl RecordSchema {
    pub fn new(name: impl Into<String>) -> Self {
        RecordSchema {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    /// Declares a required field.
    pub fn field(mut self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.fields.push(SchemaField {
            name: name.into(),
            field_type,
            required: true,
        });
        self
    }

    /// Declares an optional field. Optional fields may be absent or null.
    pub fn optional_field(mut self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.fields.push(SchemaField {
            name: name.into(),
            field_type,
            required: false,
        });
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[SchemaField] {
        &self.fields
    }

    /// Validates a record (as its JSON value projection) against this schema.
    ///
    /// Checks that the value is a record, that every required field is present
    /// and non-null, that every present field matches its declared type, and
    /// that no undeclared field sneaks through.
    pub fn validate(&self, value: &Value) -> Result<(), SchemaError> {
        let object = match value {
            Value::Object(map) => map,
            other => {
                return Err(SchemaError::NotARecord {
                    schema: self.name.clone(),
                    found: json_type_name(other).to_string(),
                })
            }
        };

        for field in &self.fields {
            match object.get(&field.name) {
                None | Some(Value::Null) if field.required => {
                    return Err(SchemaError::MissingField {
                        schema: self.name.clone(),
                        field: field.name.clone(),
                    });
                }
                None | Some(Value::Null) => {}
                Some(present) => {
                    if !field.field_type.matches(present) {
                        return Err(SchemaError::TypeMismatch {
                            schema: self.name.clone(),
                            field: field.name.clone(),
                            expected: field.field_type,
                            found: json_type_name(present).to_string(),
                        });
                    }
                }
            }
        }

        for key in object.keys() {
            if !self.fields.iter().any(|f| &f.name == key) {
                return Err(SchemaError::UnknownField {
                    schema: self.name.clone(),
                    field: key.clone(),
                });
            }
        }

        Ok(())
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "record",
    }
}

/// Record shape mismatch. Fatal to the single publish call that produced it;
/// the record is dropped and never retried blindly.
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaError {
    NotARecord {
        schema: String,
        found: String,
    },
    MissingField {
        schema: String,
        field: String,
    },
    TypeMismatch {
        schema: String,
        field: String,
        expected: FieldType,
        found: String,
    },
    UnknownField {
        schema: String,
        field: String,
    },
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaError::NotARecord { schema, found } => {
                write!(f, "schema '{}': expected a record, found {}", schema, found)
            }
            SchemaError::MissingField { schema, field } => {
                write!(f, "schema '{}': required field '{}' is missing", schema, field)
            }
            SchemaError::TypeMismatch {
                schema,
                field,
                expected,
                found,
            } => write!(
                f,
                "schema '{}': field '{}' expected {}, found {}",
                schema, field, expected, found
            ),
            SchemaError::UnknownField { schema, field } => {
                write!(f, "schema '{}': field '{}' is not declared", schema, field)
            }
        }
    }
}

impl std::error::Error for SchemaError {}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn turnstile_schema() -> RecordSchema {
        RecordSchema::new("turnstile_entry")
            .field("station_id", FieldType::Int)
            .field("station_name", FieldType::String)
            .field("line", FieldType::String)
            .optional_field("num_entries", FieldType::Int)
    }

    #[test]
    fn test_valid_record_passes() {
        let record = json!({
            "station_id": 40900,
            "station_name": "Howard",
            "line": "red",
            "num_entries": 3
        });
        assert!(turnstile_schema().validate(&record).is_ok());
    }

    #[test]
    fn test_optional_field_may_be_absent_or_null() {
        let schema = turnstile_schema();
        let absent = json!({"station_id": 1, "station_name": "Howard", "line": "red"});
        assert!(schema.validate(&absent).is_ok());

        let null = json!({
            "station_id": 1,
            "station_name": "Howard",
            "line": "red",
            "num_entries": null
        });
        assert!(schema.validate(&null).is_ok());
    }

    #[test]
    fn test_missing_required_field() {
        let record = json!({"station_id": 1, "line": "red"});
        match turnstile_schema().validate(&record) {
            Err(SchemaError::MissingField { field, .. }) => assert_eq!(field, "station_name"),
            other => panic!("expected MissingField, got {:?}", other),
        }
    }

    #[test]
    fn test_type_mismatch() {
        let record = json!({
            "station_id": "not-a-number",
            "station_name": "Howard",
            "line": "red"
        });
        match turnstile_schema().validate(&record) {
            Err(SchemaError::TypeMismatch { field, .. }) => assert_eq!(field, "station_id"),
            other => panic!("expected TypeMismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_undeclared_field_rejected() {
        let record = json!({
            "station_id": 1,
            "station_name": "Howard",
            "line": "red",
            "color": "red"
        });
        match turnstile_schema().validate(&record) {
            Err(SchemaError::UnknownField { field, .. }) => assert_eq!(field, "color"),
            other => panic!("expected UnknownField, got {:?}", other),
        }
    }

    #[test]
    fn test_int_range_checked() {
        let schema = RecordSchema::new("key").field("timestamp", FieldType::Int);
        let too_big = json!({"timestamp": i64::from(i32::MAX) + 1});
        assert!(schema.validate(&too_big).is_err());

        let long_schema = RecordSchema::new("key").field("timestamp", FieldType::Long);
        assert!(long_schema.validate(&too_big).is_ok());
    }

    #[test]
    fn test_non_record_rejected() {
        let result = turnstile_schema().validate(&json!([1, 2, 3]));
        assert!(matches!(result, Err(SchemaError::NotARecord { .. })));
    }
}
