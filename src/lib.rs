//! # transit-streams
//!
//! An event-streaming pipeline for Chicago Transit Authority station and
//! turnstile data, built on `rdkafka` and `tokio`.
//!
//! The pipeline has three moving parts:
//!
//! - **Topic provisioning**: [`transit::kafka::TopicProvisioner`] guarantees
//!   that every durable, partitioned, compacted topic exists (exactly once)
//!   before a producer touches it.
//! - **Station transform stage**: [`transit::stream::StationTransformStage`]
//!   consumes raw station records, derives the categorical `line` attribute,
//!   republishes a normalized record per input, and maintains the
//!   changelog-backed [`transit::table::StationStateTable`].
//! - **Turnstile aggregation**: [`transit::query::TurnstileAggregation`] keeps
//!   a cumulative per-station count over the turnstile event stream,
//!   registered idempotently through [`transit::query::AggregationRegistry`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use transit_streams::transit::kafka::{KafkaClusterAdmin, TopicProvisioner, TopicSpec};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let admin = KafkaClusterAdmin::new("localhost:9092")?;
//!     let provisioner = TopicProvisioner::new(admin);
//!
//!     provisioner
//!         .ensure_topic(&TopicSpec::compacted("org.chicago.cta.stations", 1, 1))
//!         .await?;
//!     Ok(())
//! }
//! ```

pub mod transit;
