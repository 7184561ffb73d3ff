//!
//! One collection cycle: leadership probe, fetch, map, derive
//!
use crate::entities::map_entities;
use crate::telemetry::Integration;
use crate::{api, metrics, Client, Error, Result};
use std::time::Duration;

/// Integration name reported to the agent
pub const INTEGRATION_NAME: &str = "com.redis.redisenterprise";

/// Integration version reported to the agent
pub const INTEGRATION_VERSION: &str = env!("CARGO_PKG_VERSION");

/// What to collect
#[derive(Debug, Clone)]
pub struct Options {
    /// Derive and attach gauges
    pub metrics: bool,
    /// Tag entities with their kind
    pub inventory: bool,
    /// Length of the replication stats window
    pub event_time: Duration,
    /// Bound on the whole cycle
    pub deadline: Option<Duration>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            metrics: true,
            inventory: true,
            event_time: Duration::from_secs(60),
            deadline: None,
        }
    }
}

/// Outcome of a cycle
#[derive(Debug)]
pub enum Cycle {
    /// The polled node is not the leader, nothing was collected
    Skipped,
    /// Telemetry ready to be published
    Collected(Integration),
}

/// Run one cycle against `client`. Any error aborts the whole cycle.
pub async fn run(client: &Client, options: &Options) -> Result<Cycle> {
    match options.deadline {
        Some(deadline) => tokio::time::timeout(deadline, collect(client, options))
            .await
            .map_err(|_| Error::Timeout(deadline))?,
        None => collect(client, options).await,
    }
}

async fn collect(client: &Client, options: &Options) -> Result<Cycle> {
    if !api::is_leader(client).await? {
        tracing::info!("{} is not the cluster leader, skipping", client.base_url());
        return Ok(Cycle::Skipped);
    }

    let snapshot = api::snapshot(client).await?;
    let mut entities = map_entities(&snapshot.cluster, &snapshot.databases)?;

    if options.inventory {
        entities.tag_inventory();
    }

    if options.metrics {
        let totals = metrics::derive(
            &mut entities,
            &snapshot,
            client,
            options.event_time,
            chrono::Utc::now(),
        )
        .await?;
        tracing::debug!(
            "Cluster totals: {} shards, {} bytes used, {} requests",
            totals.shards_used,
            totals.memory_used,
            totals.requests
        );
    }

    tracing::info!(
        "Collected cluster {} with {} databases",
        snapshot.cluster.name,
        snapshot.databases.len()
    );

    let mut integration = Integration::new(INTEGRATION_NAME, INTEGRATION_VERSION);
    entities.add_to(&mut integration);
    Ok(Cycle::Collected(integration))
}
