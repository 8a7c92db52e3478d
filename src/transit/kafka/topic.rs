//! Topic specifications.

use std::fmt;

/// Retention policy for a topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetentionPolicy {
    /// Retain only the latest record per key.
    Compact,
    /// Drop records past the retention window.
    Delete,
}

impl RetentionPolicy {
    pub fn as_config_value(&self) -> &'static str {
        match self {
            RetentionPolicy::Compact => "compact",
            RetentionPolicy::Delete => "delete",
        }
    }
}

/// Compression codec applied broker-side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionCodec {
    Lz4,
    Snappy,
    Gzip,
    Zstd,
    Uncompressed,
}

impl CompressionCodec {
    pub fn as_config_value(&self) -> &'static str {
        match self {
            CompressionCodec::Lz4 => "lz4",
            CompressionCodec::Snappy => "snappy",
            CompressionCodec::Gzip => "gzip",
            CompressionCodec::Zstd => "zstd",
            CompressionCodec::Uncompressed => "uncompressed",
        }
    }
}

/// Specification of a durable topic.
///
/// Immutable once provisioned: a later `ensure_topic` call with a different
/// spec for the same name is a configuration conflict, never silently
/// honored.
#[derive(Debug, Clone, PartialEq)]
pub struct TopicSpec {
    /// Globally unique, dotted-hierarchical name, e.g. `org.chicago.cta.stations`.
    pub name: String,
    pub partitions: i32,
    pub replication: i32,
    pub retention: RetentionPolicy,
    pub compression: CompressionCodec,
}

impl TopicSpec {
    pub fn new(
        name: impl Into<String>,
        partitions: i32,
        replication: i32,
        retention: RetentionPolicy,
        compression: CompressionCodec,
    ) -> Self {
        let spec = TopicSpec {
            name: name.into(),
            partitions,
            replication,
            retention,
            compression,
        };
        debug_assert!(spec.partitions > 0, "partition count must be positive");
        debug_assert!(spec.replication > 0, "replication factor must be positive");
        spec
    }

    /// The pipeline default: compacted, lz4-compressed.
    pub fn compacted(name: impl Into<String>, partitions: i32, replication: i32) -> Self {
        TopicSpec::new(
            name,
            partitions,
            replication,
            RetentionPolicy::Compact,
            CompressionCodec::Lz4,
        )
    }

    /// Topic-level configuration as `(key, value)` pairs for the admin API.
    pub fn topic_config(&self) -> Vec<(&'static str, &'static str)> {
        vec![
            ("cleanup.policy", self.retention.as_config_value()),
            ("compression.type", self.compression.as_config_value()),
        ]
    }
}

impl fmt::Display for TopicSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (partitions={}, replication={}, cleanup.policy={}, compression.type={})",
            self.name,
            self.partitions,
            self.replication,
            self.retention.as_config_value(),
            self.compression.as_config_value()
        )
    }
}
