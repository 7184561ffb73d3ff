//!
//! Management API resources
//!
use crate::{Client, Error, Result};
use chrono::{DateTime, Utc};

pub mod types;

pub use types::{
    ClusterConfig, Database, DatabaseStats, DatabaseStatsMap, License, NodeAggregate,
    ReplicationStats,
};

const CLUSTER: &str = "v1/cluster";
const LICENSE: &str = "v1/license";
const NODES: &str = "v1/nodes";
const BDBS: &str = "v1/bdbs";
const BDBS_STATS_LAST: &str = "v1/bdbs/stats/last";

/// Returns true if the polled node is the cluster leader.
///
/// Non-leader nodes redirect API calls to the leader, only the leader submits
/// telemetry.
#[tracing::instrument(level = "debug", skip(client))]
pub async fn is_leader(client: &Client) -> Result<bool> {
    let status = client.probe(CLUSTER).await?;
    if status.is_redirection() {
        Ok(false)
    } else if status.is_success() {
        Ok(true)
    } else {
        Err(Error::UnexpectedStatus {
            status: status.as_u16(),
            path: CLUSTER.to_string(),
        })
    }
}

/// Cluster configuration
pub async fn cluster(client: &Client) -> Result<ClusterConfig> {
    client.get_json(CLUSTER, None).await
}

/// Cluster license
pub async fn license(client: &Client) -> Result<License> {
    client.get_json(LICENSE, None).await
}

/// Memory, cores and node counts summed over all nodes
pub async fn nodes(client: &Client) -> Result<NodeAggregate> {
    let nodes: Vec<types::Node> = client.get_json(NODES, None).await?;
    for node in nodes.iter().filter(|n| n.status != types::NodeStatus::Active) {
        tracing::debug!(
            "Node {} ({}) is {:?}",
            node.uid,
            node.addr.as_deref().unwrap_or("no address"),
            node.status
        );
    }
    Ok(NodeAggregate::from_nodes(&nodes))
}

/// All configured databases
pub async fn databases(client: &Client) -> Result<Vec<Database>> {
    client.get_json(BDBS, None).await
}

/// Latest stats of all databases
pub async fn database_stats(client: &Client) -> Result<DatabaseStatsMap> {
    client.get_json(BDBS_STATS_LAST, None).await
}

/// Time range of a stats query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl StatsWindow {
    /// Sampling granularity
    pub const INTERVAL: &'static str = "10sec";

    const FORMAT: &'static str = "%Y-%m-%dT%H:%M:%SZ";

    /// The window `[end - length, end]`. Fails if the start is not a
    /// representable time.
    pub fn ending_at(end: DateTime<Utc>, length: std::time::Duration) -> Result<Self> {
        let start = chrono::Duration::from_std(length)
            .ok()
            .and_then(|length| end.checked_sub_signed(length))
            .ok_or_else(|| {
                Error::Precondition(format!(
                    "stats window of {length:?} before {end} is out of range"
                ))
            })?;
        Ok(Self { start, end })
    }

    /// Formatted start time
    #[must_use]
    pub fn stime(&self) -> String {
        self.start.format(Self::FORMAT).to_string()
    }

    /// Formatted end time
    #[must_use]
    pub fn etime(&self) -> String {
        self.end.format(Self::FORMAT).to_string()
    }
}

/// Active-Active traffic of database `uid` over `window`.
/// This is a point in time query and must not be cached.
pub async fn replication_stats(
    client: &Client,
    uid: u64,
    window: &StatsWindow,
) -> Result<ReplicationStats> {
    let path = format!("{BDBS}/stats/{uid}");
    let stime = window.stime();
    let etime = window.etime();
    let samples: types::ReplicationSamples = client
        .get_json(
            &path,
            Some(&[
                ("interval", StatsWindow::INTERVAL),
                ("stime", stime.as_str()),
                ("etime", etime.as_str()),
            ]),
        )
        .await?;
    samples.latest(uid)
}

/// Everything fetched from the API in one cycle, except replication stats
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub cluster: ClusterConfig,
    pub license: License,
    pub nodes: NodeAggregate,
    pub databases: Vec<Database>,
    pub stats: DatabaseStatsMap,
}

/// Fetch a fresh [`Snapshot`]
pub async fn snapshot(client: &Client) -> Result<Snapshot> {
    let cluster = cluster(client).await?;
    let license = license(client).await?;
    let nodes = nodes(client).await?;
    let databases = databases(client).await?;
    let stats = database_stats(client).await?;

    tracing::debug!(
        "Fetched cluster {} with {} databases on {} nodes",
        cluster.name,
        databases.len(),
        nodes.nodes
    );

    Ok(Snapshot {
        cluster,
        license,
        nodes,
        databases,
        stats,
    })
}
