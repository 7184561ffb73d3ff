//!
//! Records returned from the management API.
//!
//! NOTE: The types here are not exhaustive to the APIs.
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::BTreeMap;

/// Returned from /v1/cluster
#[derive(Debug, Clone, Deserialize)]
pub struct ClusterConfig {
    /// Cluster name
    pub name: String,
}

/// Returned from /v1/license
#[derive(Debug, Clone, Deserialize)]
pub struct License {
    /// License expiration
    pub expiration_date: DateTime<Utc>,
    /// Number of shards the license allows
    pub shards_limit: u64,
    /// Set by the cluster once the license has expired
    #[serde(default)]
    pub expired: bool,
}

impl License {
    /// Whole days left until the license expires, negative once expired.
    #[must_use]
    pub fn days_until_expiration(&self, now: DateTime<Utc>) -> i64 {
        let days = (self.expiration_date - now).num_seconds().div_euclid(86_400);
        if self.expired {
            days.min(-1)
        } else {
            days
        }
    }
}

/// Node state
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum NodeStatus {
    Active,
    Provisioning,
    Decommissioning,
    Down,
    #[serde(other)]
    Unknown,
}

/// Returned as a list from /v1/nodes
#[derive(Debug, Clone, Deserialize)]
pub struct Node {
    pub uid: u64,
    pub addr: Option<String>,
    pub status: NodeStatus,
    /// Memory in bytes
    pub total_memory: u64,
    pub cores: u64,
}

/// Capacity of the whole cluster, summed over its nodes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NodeAggregate {
    /// Memory in bytes
    pub total_memory: u64,
    pub cores: u64,
    pub active_nodes: u64,
    pub nodes: u64,
}

impl NodeAggregate {
    /// Sum up a node list
    #[must_use]
    pub fn from_nodes(nodes: &[Node]) -> Self {
        nodes.iter().fold(Self::default(), |agg, node| Self {
            total_memory: agg.total_memory + node.total_memory,
            cores: agg.cores + node.cores,
            active_nodes: agg.active_nodes + u64::from(node.status == NodeStatus::Active),
            nodes: agg.nodes + 1,
        })
    }
}

/// Active-Active synchronization state of a database
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Disabled,
    Enabled,
    Paused,
    #[serde(other)]
    Unknown,
}

impl SyncStatus {
    /// Numeric code reported as a gauge
    #[must_use]
    pub fn code(self) -> f64 {
        match self {
            Self::Disabled => 0.0,
            Self::Enabled => 1.0,
            Self::Paused => 2.0,
            Self::Unknown => -1.0,
        }
    }
}

/// Returned as a list from /v1/bdbs
#[derive(Debug, Clone, Deserialize)]
pub struct Database {
    /// Database id, also the key into the stats
    pub uid: u64,
    pub name: String,
    /// Memory limit in bytes
    pub memory_size: u64,
    pub shards_count: u64,
    /// Number of endpoints
    #[serde(default, deserialize_with = "endpoint_count")]
    pub endpoints: u64,
    /// Redis on Flash
    #[serde(default)]
    pub bigstore: bool,
    /// Active-Active database
    #[serde(default)]
    pub crdt: bool,
    pub crdt_sync: Option<SyncStatus>,
}

// The API returns the endpoint objects, older versions only a count.
fn endpoint_count<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Endpoints {
        Count(u64),
        List(Vec<serde::de::IgnoredAny>),
    }

    Ok(match Endpoints::deserialize(deserializer)? {
        Endpoints::Count(n) => n,
        Endpoints::List(l) => l.len() as u64,
    })
}

/// Per database entry of /v1/bdbs/stats/last
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseStats {
    pub avg_latency: f64,
    pub avg_read_latency: f64,
    pub avg_write_latency: f64,
    pub conns: f64,
    pub egress_bytes: f64,
    pub evicted_objects: f64,
    pub expired_objects: f64,
    pub ingress_bytes: f64,
    pub other_req: f64,
    pub read_hits: f64,
    pub read_misses: f64,
    pub read_req: f64,
    pub shard_cpu_system: f64,
    pub shard_cpu_user: f64,
    pub total_req: f64,
    pub used_memory: f64,
    pub write_hits: f64,
    pub write_misses: f64,
    pub write_req: f64,

    // Only reported for Redis on Flash databases
    pub bigstore_objs_ram: Option<f64>,
    pub bigstore_objs_flash: Option<f64>,
    pub bigstore_io_reads: Option<f64>,
    pub bigstore_io_writes: Option<f64>,
    pub bigstore_throughput: Option<f64>,
    pub big_write_ram: Option<f64>,
    pub big_write_flash: Option<f64>,
    pub big_del_ram: Option<f64>,
    pub big_del_flash: Option<f64>,
}

/// /v1/bdbs/stats/last, keyed by database uid
pub type DatabaseStatsMap = BTreeMap<u64, DatabaseStats>;

/// One sampling interval of /v1/bdbs/stats/{uid}
#[derive(Debug, Clone, Deserialize)]
pub struct ReplicationInterval {
    pub interval: Option<String>,
    pub stime: Option<DateTime<Utc>>,
    pub etime: Option<DateTime<Utc>>,
    pub crdt_egress_bytes: Option<f64>,
    pub crdt_egress_bytes_decompressed: Option<f64>,
    pub crdt_ingress_bytes: Option<f64>,
    pub crdt_ingress_bytes_decompressed: Option<f64>,
    pub crdt_pending_local_writes_max: Option<f64>,
    pub crdt_pending_local_writes_min: Option<f64>,
    pub crdt_local_ingress_lag_time: Option<f64>,
}

/// Returned from /v1/bdbs/stats/{uid}
#[derive(Debug, Clone, Deserialize)]
pub struct ReplicationSamples {
    #[serde(default)]
    pub intervals: Vec<ReplicationInterval>,
}

/// Active-Active traffic of a database over the requested window
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReplicationStats {
    pub egress_bytes: f64,
    pub egress_bytes_decompressed: f64,
    pub ingress_bytes: f64,
    pub ingress_bytes_decompressed: f64,
    pub pending_local_writes_max: f64,
    pub pending_local_writes_min: f64,
    pub local_ingress_lag_time: f64,
}

impl ReplicationSamples {
    /// Most recent interval carrying replication values
    pub fn latest(&self, uid: u64) -> crate::Result<ReplicationStats> {
        let last = self
            .intervals
            .iter()
            .rev()
            .find(|i| i.crdt_egress_bytes.is_some())
            .ok_or_else(|| {
                crate::Error::Precondition(format!("no replication samples for database {uid}"))
            })?;
        tracing::debug!(
            "Database {} replication sample {} from {:?} to {:?}",
            uid,
            last.interval.as_deref().unwrap_or("?"),
            last.stime,
            last.etime
        );

        let field = |value: Option<f64>, name: &str| {
            value.ok_or_else(|| {
                crate::Error::Precondition(format!("database {uid} is missing {name}"))
            })
        };

        Ok(ReplicationStats {
            egress_bytes: field(last.crdt_egress_bytes, "crdt_egress_bytes")?,
            egress_bytes_decompressed: field(
                last.crdt_egress_bytes_decompressed,
                "crdt_egress_bytes_decompressed",
            )?,
            ingress_bytes: field(last.crdt_ingress_bytes, "crdt_ingress_bytes")?,
            ingress_bytes_decompressed: field(
                last.crdt_ingress_bytes_decompressed,
                "crdt_ingress_bytes_decompressed",
            )?,
            pending_local_writes_max: field(
                last.crdt_pending_local_writes_max,
                "crdt_pending_local_writes_max",
            )?,
            pending_local_writes_min: field(
                last.crdt_pending_local_writes_min,
                "crdt_pending_local_writes_min",
            )?,
            local_ingress_lag_time: field(
                last.crdt_local_ingress_lag_time,
                "crdt_local_ingress_lag_time",
            )?,
        })
    }
}
