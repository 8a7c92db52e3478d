use log::{error, info, warn};
use std::sync::Arc;
use transit_streams::transit::config::PipelineConfig;
use transit_streams::transit::kafka::serialization::JsonSerializer;
use transit_streams::transit::kafka::{KafkaClusterAdmin, TopicProvisioner, TopicSpec};
use transit_streams::transit::query::{
    AggregationRegistry, SummaryConsumer, TurnstileAggregation, TurnstileQuery,
};
use transit_streams::transit::stream::StationTransformStage;
use transit_streams::transit::table::{ChangelogConsumer, StationStateTable};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init();

    let config = PipelineConfig::from_env();
    info!("starting transit pipeline against {}", config.brokers);

    let admin = KafkaClusterAdmin::new(&config.brokers)?;
    let provisioner = TopicProvisioner::new(admin);

    // Source topics are normally created by the upstream collectors; ensure
    // them anyway so a fresh cluster comes up in one step. An unreachable
    // cluster here is fatal.
    for spec in [
        TopicSpec::compacted(&config.stations_topic, 1, 1),
        TopicSpec::compacted(&config.turnstile_topic, 4, 1),
    ] {
        if let Err(e) = provisioner.ensure_topic(&spec).await {
            error!("cannot provision {}: {}", spec.name, e);
            return Err(e.into());
        }
    }

    // Rebuild the station state table from the changelog before processing
    // new records.
    let table = Arc::new(StationStateTable::new());
    let recovery_consumer = ChangelogConsumer::new(
        &config.brokers,
        &format!("{}-recovery", config.transform_group),
        JsonSerializer,
        JsonSerializer,
    )?;
    recovery_consumer.subscribe(&[&config.transformed_topic])?;
    let applied = table
        .recover(&recovery_consumer, config.poll_interval * 4)
        .await;
    info!("station state table recovered with {} entries", applied);

    // Rebuild the turnstile counts from the compacted summary topic so a
    // restart resumes counting instead of resetting to zero.
    let aggregation = Arc::new(TurnstileAggregation::new());
    let summary_consumer = SummaryConsumer::new(
        &config.brokers,
        &format!("{}-recovery", config.query_group),
        JsonSerializer,
        JsonSerializer,
    )?;
    summary_consumer.subscribe(&[&config.summary_topic])?;
    let absorbed = aggregation
        .recover(&summary_consumer, config.poll_interval * 4)
        .await;
    info!("turnstile counts recovered for {} summary rows", absorbed);

    let stage = Arc::new(StationTransformStage::new(&config, &provisioner, table).await?);
    let registry = AggregationRegistry::new(KafkaClusterAdmin::new(&config.brokers)?);
    let query =
        Arc::new(TurnstileQuery::new(&config, &provisioner, &registry, aggregation).await?);

    let stage_task = {
        let stage = Arc::clone(&stage);
        tokio::spawn(async move { stage.run().await })
    };
    let query_task = {
        let query = Arc::clone(&query);
        tokio::spawn(async move { query.run().await })
    };

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");

    // Stop pulling new records; in-flight processing completes first.
    stage.stop();
    query.stop();
    let _ = stage_task.await;
    let _ = query_task.await;

    if let Err(e) = stage.close() {
        warn!("transform producer close failed: {}", e);
    }
    if let Err(e) = query.close() {
        warn!("summary producer close failed: {}", e);
    }

    info!("transit pipeline stopped");
    Ok(())
}
