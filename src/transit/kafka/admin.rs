//! Topic provisioning: cluster admin access, the process-local registry of
//! confirmed topics, and the idempotent `ensure_topic` path.

use crate::transit::kafka::error::ProvisionError;
use crate::transit::kafka::topic::TopicSpec;
use log::{info, warn};
use rdkafka::admin::{AdminClient, AdminOptions, NewTopic, TopicReplication};
use rdkafka::client::DefaultClientContext;
use rdkafka::config::ClientConfig;
use rdkafka::types::RDKafkaErrorCode;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;

/// Cluster-side topic operations the provisioner needs.
///
/// The seam exists so provisioning logic can be exercised against an
/// in-memory cluster in tests; production code uses [`KafkaClusterAdmin`].
#[allow(async_fn_in_trait)]
pub trait ClusterAdmin: Send + Sync {
    /// Checks whether the topic exists in the cluster metadata.
    async fn topic_exists(&self, name: &str) -> Result<bool, ProvisionError>;

    /// Issues a creation request for the topic. A concurrent creation by
    /// another process resolves to success.
    async fn create_topic(&self, spec: &TopicSpec) -> Result<(), ProvisionError>;
}

/// rdkafka-backed [`ClusterAdmin`].
pub struct KafkaClusterAdmin {
    admin: AdminClient<DefaultClientContext>,
    request_timeout: Duration,
}

impl KafkaClusterAdmin {
    pub fn new(brokers: &str) -> Result<Self, ProvisionError> {
        let admin: AdminClient<DefaultClientContext> = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("client.id", "transit-admin-client")
            .create()?;

        Ok(Self {
            admin,
            request_timeout: Duration::from_secs(30),
        })
    }
}

impl ClusterAdmin for KafkaClusterAdmin {
    async fn topic_exists(&self, name: &str) -> Result<bool, ProvisionError> {
        let metadata = self
            .admin
            .inner()
            .fetch_metadata(Some(name), Duration::from_secs(10))?;

        // Metadata for an unknown topic comes back as an errored entry, not
        // an absent one.
        Ok(metadata
            .topics()
            .iter()
            .any(|topic| topic.name() == name && topic.error().is_none()))
    }

    async fn create_topic(&self, spec: &TopicSpec) -> Result<(), ProvisionError> {
        let mut new_topic = NewTopic::new(
            &spec.name,
            spec.partitions,
            TopicReplication::Fixed(spec.replication),
        );
        for (key, value) in spec.topic_config() {
            new_topic = new_topic.set(key, value);
        }

        let options = AdminOptions::new()
            .operation_timeout(Some(self.request_timeout))
            .request_timeout(Some(self.request_timeout));

        let results = self.admin.create_topics(&[new_topic], &options).await?;

        for result in results {
            match result {
                Ok(topic) => info!("created topic {}", topic),
                Err((topic, RDKafkaErrorCode::TopicAlreadyExists)) => {
                    // Another process won the creation race.
                    info!("topic {} already exists, continuing", topic);
                }
                Err((topic, code)) => {
                    return Err(ProvisionError::Creation {
                        topic,
                        reason: code.to_string(),
                    });
                }
            }
        }

        Ok(())
    }
}

/// Process-local cache of topics whose provisioning has been confirmed,
/// keyed by name with the spec they were confirmed under.
///
/// Owned by a [`TopicProvisioner`] rather than living in a process-wide
/// global, so every test gets fresh state.
#[derive(Default)]
pub struct TopicRegistry {
    confirmed: Mutex<HashMap<String, TopicSpec>>,
}

impl TopicRegistry {
    pub fn new() -> Self {
        TopicRegistry::default()
    }

    /// Whether the topic has been confirmed by this process.
    pub async fn contains(&self, name: &str) -> bool {
        self.confirmed.lock().await.contains_key(name)
    }

    /// The spec the topic was confirmed under, if any.
    pub async fn get(&self, name: &str) -> Option<TopicSpec> {
        self.confirmed.lock().await.get(name).cloned()
    }
}

/// Ensures topics exist before producers publish to them.
///
/// `ensure_topic` is idempotent and safe to call repeatedly and concurrently:
/// the registry check and the create request run under one lock, so two
/// concurrent calls for the same name from this process can never both issue
/// a creation request. Topics created by other processes are detected via
/// cluster metadata and recorded as confirmed.
pub struct TopicProvisioner<A: ClusterAdmin> {
    admin: A,
    registry: TopicRegistry,
}

impl<A: ClusterAdmin> TopicProvisioner<A> {
    pub fn new(admin: A) -> Self {
        TopicProvisioner {
            admin,
            registry: TopicRegistry::new(),
        }
    }

    pub fn registry(&self) -> &TopicRegistry {
        &self.registry
    }

    pub fn admin(&self) -> &A {
        &self.admin
    }

    /// Ensures the topic described by `spec` exists with that configuration.
    ///
    /// - Registry hit with an identical spec: success, no network round-trip.
    /// - Registry hit with a different spec: [`ProvisionError::Conflict`].
    /// - Exists remotely: recorded as confirmed, success.
    /// - Absent: created with the spec's partitions, replication, and
    ///   retention/compression config.
    ///
    /// A creation failure is logged and surfaced to the caller; the registry
    /// stays usable for other topics.
    pub async fn ensure_topic(&self, spec: &TopicSpec) -> Result<(), ProvisionError> {
        // Single coarse lock serializes check-then-create; provisioning is
        // rare and topic cardinality is low.
        let mut confirmed = self.registry.confirmed.lock().await;

        if let Some(existing) = confirmed.get(&spec.name) {
            if existing == spec {
                return Ok(());
            }
            return Err(ProvisionError::Conflict {
                requested: spec.clone(),
                existing: existing.clone(),
            });
        }

        if self.admin.topic_exists(&spec.name).await? {
            confirmed.insert(spec.name.clone(), spec.clone());
            return Ok(());
        }

        match self.admin.create_topic(spec).await {
            Ok(()) => {
                confirmed.insert(spec.name.clone(), spec.clone());
                Ok(())
            }
            Err(e) => {
                warn!("provisioning {} failed: {}", spec.name, e);
                Err(e)
            }
        }
    }
}
