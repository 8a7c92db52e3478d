//! Pluggable serialization for Kafka keys and values.

use apache_avro::{
    from_avro_datum, to_avro_datum, types::Value as AvroValue, Schema as AvroSchema,
};
use serde::{Deserialize, Serialize};
use std::io::Cursor;

/// Trait for serializers that convert between objects and bytes.
pub trait Serializer<T> {
    /// Serialize an object to bytes.
    fn serialize(&self, value: &T) -> Result<Vec<u8>, SerializationError>;

    /// Deserialize bytes to an object.
    fn deserialize(&self, bytes: &[u8]) -> Result<T, SerializationError>;
}

/// Serialize a struct to JSON bytes.
pub fn to_json<T: Serialize>(value: &T) -> Result<Vec<u8>, SerializationError> {
    serde_json::to_vec(value).map_err(SerializationError::Json)
}

/// Deserialize JSON bytes to a struct.
pub fn from_json<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> Result<T, SerializationError> {
    serde_json::from_slice(bytes).map_err(SerializationError::Json)
}

/// JSON serializer, usable with any serde type.
#[derive(Clone, Copy, Default)]
pub struct JsonSerializer;

impl<T> Serializer<T> for JsonSerializer
where
    T: Serialize + for<'de> Deserialize<'de>,
{
    fn serialize(&self, value: &T) -> Result<Vec<u8>, SerializationError> {
        to_json(value)
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<T, SerializationError> {
        from_json(bytes)
    }
}

/// Avro serializer over schema'd datum values.
pub struct AvroSerializer {
    schema: AvroSchema,
}

impl AvroSerializer {
    pub fn new(schema: AvroSchema) -> Self {
        Self { schema }
    }

    pub fn from_schema_str(schema: &str) -> Result<Self, SerializationError> {
        let schema = AvroSchema::parse_str(schema).map_err(SerializationError::Avro)?;
        Ok(Self::new(schema))
    }
}

impl Serializer<AvroValue> for AvroSerializer {
    fn serialize(&self, value: &AvroValue) -> Result<Vec<u8>, SerializationError> {
        to_avro_datum(&self.schema, value.clone()).map_err(SerializationError::Avro)
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<AvroValue, SerializationError> {
        let mut cursor = Cursor::new(bytes);
        from_avro_datum(&self.schema, &mut cursor, None).map_err(SerializationError::Avro)
    }
}

/// String serializer converting to/from UTF-8 bytes.
#[derive(Clone, Copy, Default)]
pub struct StringSerializer;

impl Serializer<String> for StringSerializer {
    fn serialize(&self, value: &String) -> Result<Vec<u8>, SerializationError> {
        Ok(value.as_bytes().to_vec())
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<String, SerializationError> {
        String::from_utf8(bytes.to_vec()).map_err(SerializationError::InvalidUtf8)
    }
}

/// Raw bytes pass-through.
#[derive(Clone, Copy, Default)]
pub struct BytesSerializer;

impl Serializer<Vec<u8>> for BytesSerializer {
    fn serialize(&self, value: &Vec<u8>) -> Result<Vec<u8>, SerializationError> {
        Ok(value.clone())
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<Vec<u8>, SerializationError> {
        Ok(bytes.to_vec())
    }
}

/// Serialization/deserialization failure.
#[derive(Debug)]
pub enum SerializationError {
    Json(serde_json::Error),
    Avro(apache_avro::Error),
    InvalidUtf8(std::string::FromUtf8Error),
}

impl std::fmt::Display for SerializationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SerializationError::Json(e) => write!(f, "JSON error: {}", e),
            SerializationError::Avro(e) => write!(f, "Avro error: {}", e),
            SerializationError::InvalidUtf8(e) => write!(f, "Invalid UTF-8: {}", e),
        }
    }
}

impl std::error::Error for SerializationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SerializationError::Json(e) => Some(e),
            SerializationError::Avro(e) => Some(e),
            SerializationError::InvalidUtf8(e) => Some(e),
        }
    }
}

impl From<serde_json::Error> for SerializationError {
    fn from(err: serde_json::Error) -> Self {
        SerializationError::Json(err)
    }
}

impl From<apache_avro::Error> for SerializationError {
    fn from(err: apache_avro::Error) -> Self {
        SerializationError::Avro(err)
    }
}
