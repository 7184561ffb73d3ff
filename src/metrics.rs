//!
//! Database and cluster gauges derived from a [`Snapshot`]
//!
use crate::api::{
    self, Database, DatabaseStats, DatabaseStatsMap, License, NodeAggregate, ReplicationStats,
    Snapshot, StatsWindow,
};
use crate::entities::EntityMap;
use crate::telemetry::MetricSet;
use crate::{Client, Error, Result};
use chrono::{DateTime, Utc};

/// Event type of every metric set
pub const EVENT_TYPE: &str = "RedisEnterprise";

type Gauge = (&'static str, fn(&DatabaseStats) -> f64);
type OptionalGauge = (&'static str, fn(&DatabaseStats) -> Option<f64>);

/// Reported for every database
pub const DATABASE_GAUGES: [Gauge; 19] = [
    ("bdb.AvgLatency", |s| s.avg_latency),
    ("bdb.AvgReadLatency", |s| s.avg_read_latency),
    ("bdb.AvgWriteLatency", |s| s.avg_write_latency),
    ("bdb.Conns", |s| s.conns),
    ("bdb.EgressBytes", |s| s.egress_bytes),
    ("bdb.EvictedObjects", |s| s.evicted_objects),
    ("bdb.ExpiredObjects", |s| s.expired_objects),
    ("bdb.IngressBytes", |s| s.ingress_bytes),
    ("bdb.OtherReq", |s| s.other_req),
    ("bdb.ReadHits", |s| s.read_hits),
    ("bdb.ReadMisses", |s| s.read_misses),
    ("bdb.ReadReq", |s| s.read_req),
    ("bdb.ShardCPUSystem", |s| s.shard_cpu_system),
    ("bdb.ShardCPUUser", |s| s.shard_cpu_user),
    ("bdb.TotalReq", |s| s.total_req),
    ("bdb.UsedMemory", |s| s.used_memory),
    ("bdb.WriteHits", |s| s.write_hits),
    ("bdb.WriteMisses", |s| s.write_misses),
    ("bdb.WriteReq", |s| s.write_req),
];

/// Reported for Redis on Flash databases only
pub const TIERED_GAUGES: [OptionalGauge; 9] = [
    ("bdb.BigstoreObjsRam", |s| s.bigstore_objs_ram),
    ("bdb.BigstoreObjsFlash", |s| s.bigstore_objs_flash),
    ("bdb.BigstoreIoReads", |s| s.bigstore_io_reads),
    ("bdb.BigstoreIoWrites", |s| s.bigstore_io_writes),
    ("bdb.BigstoreThroughput", |s| s.bigstore_throughput),
    ("bdb.BigWriteRam", |s| s.big_write_ram),
    ("bdb.BigWriteFlash", |s| s.big_write_flash),
    ("bdb.BigDelRam", |s| s.big_del_ram),
    ("bdb.BigDelFlash", |s| s.big_del_flash),
];

/// Source of Active-Active stats
#[allow(async_fn_in_trait)]
pub trait ReplicationSource {
    async fn replication_stats(&self, uid: u64, window: &StatsWindow) -> Result<ReplicationStats>;
}

impl ReplicationSource for Client {
    async fn replication_stats(&self, uid: u64, window: &StatsWindow) -> Result<ReplicationStats> {
        api::replication_stats(self, uid, window).await
    }
}

/// Sums over all databases
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ClusterTotals {
    pub shards_used: u64,
    pub memory_used: f64,
    pub requests: f64,
}

/// `100 * part / whole`, `None` when `whole` is zero
#[must_use]
pub fn percent(part: f64, whole: f64) -> Option<f64> {
    if whole == 0.0 {
        None
    } else {
        Some(100.0 * part / whole)
    }
}

fn set_percent(set: &mut MetricSet, name: &str, part: f64, whole: f64) -> Result<()> {
    match percent(part, whole) {
        Some(value) => set.set_gauge(name, value),
        None => {
            tracing::warn!("Skipping {}, the denominator is zero", name);
            Ok(())
        }
    }
}

/// Attach the gauges of `db` and add it to `totals`
#[allow(clippy::cast_precision_loss)]
pub async fn attach_database<R: ReplicationSource>(
    set: &mut MetricSet,
    db: &Database,
    stats: &DatabaseStatsMap,
    replication: &R,
    window: &StatsWindow,
    totals: &mut ClusterTotals,
) -> Result<()> {
    let stats = stats
        .get(&db.uid)
        .ok_or_else(|| Error::Precondition(format!("no stats for database {}", db.uid)))?;

    set.set_gauge("bdb.ShardCount", db.shards_count as f64)?;
    set.set_gauge("bdb.Endpoints", db.endpoints as f64)?;
    set.set_gauge("bdb.MemoryLimit", db.memory_size as f64)?;

    for (name, value) in DATABASE_GAUGES {
        set.set_gauge(name, value(stats))?;
    }

    if db.bigstore {
        for (name, value) in TIERED_GAUGES {
            let value = value(stats).ok_or_else(|| {
                Error::Precondition(format!("database {} is missing {}", db.uid, name))
            })?;
            set.set_gauge(name, value)?;
        }
    }

    set_percent(
        set,
        "bdb.UsedMemoryPercent",
        stats.used_memory,
        db.memory_size as f64,
    )?;

    totals.shards_used += db.shards_count;
    totals.memory_used += stats.used_memory;
    totals.requests += stats.total_req;

    if db.crdt {
        let sync = db.crdt_sync.map_or(-1.0, api::types::SyncStatus::code);
        set.set_gauge("bdb.CrdtSyncStatus", sync)?;

        tracing::debug!("Fetching replication stats of {} from {}", db.name, window.stime());
        let crdt = replication.replication_stats(db.uid, window).await?;
        set.set_gauge("crdt.CrdtEgressBytes", crdt.egress_bytes)?;
        set.set_gauge(
            "crdt.CrdtEgressBytesDecompressed",
            crdt.egress_bytes_decompressed,
        )?;
        set.set_gauge("crdt.CrdtIngressBytes", crdt.ingress_bytes)?;
        set.set_gauge(
            "crdt.CrdtIngressBytesDecompressed",
            crdt.ingress_bytes_decompressed,
        )?;
        set.set_gauge(
            "crdt.CrdtPendingLocalWritesMax",
            crdt.pending_local_writes_max,
        )?;
        set.set_gauge(
            "crdt.CrdtPendingLocalWritesMin",
            crdt.pending_local_writes_min,
        )?;
        set.set_gauge("crdt.CrdtLocalIngressLagTime", crdt.local_ingress_lag_time)?;
    }

    Ok(())
}

/// Attach license, capacity and the aggregated gauges to the cluster set
#[allow(clippy::cast_precision_loss)]
pub fn attach_cluster(
    set: &mut MetricSet,
    license: &License,
    nodes: &NodeAggregate,
    totals: &ClusterTotals,
    now: DateTime<Utc>,
) -> Result<()> {
    set.set_gauge(
        "cluster.DaysUntilExpiration",
        license.days_until_expiration(now) as f64,
    )?;
    set.set_gauge("cluster.ShardsLicense", license.shards_limit as f64)?;
    set.set_gauge("cluster.ClusterTotalMemory", nodes.total_memory as f64)?;
    set.set_gauge("cluster.ClusterTotalCores", nodes.cores as f64)?;
    set.set_gauge("cluster.ClusterActiveNodes", nodes.active_nodes as f64)?;
    set.set_gauge("cluster.ClusterNodes", nodes.nodes as f64)?;

    set.set_gauge("cluster.TotalShardsUsed", totals.shards_used as f64)?;
    set.set_gauge("cluster.TotalMemoryUsed", totals.memory_used)?;
    set_percent(
        set,
        "cluster.TotalMemoryUsedPercent",
        totals.memory_used,
        nodes.total_memory as f64,
    )?;
    set.set_gauge("cluster.TotalReqs", totals.requests)?;
    Ok(())
}

/// Derive all gauges and attach them to `entities`. Replication stats cover
/// the `event_time` leading up to `now`.
pub async fn derive<R: ReplicationSource>(
    entities: &mut EntityMap,
    snapshot: &Snapshot,
    replication: &R,
    event_time: std::time::Duration,
    now: DateTime<Utc>,
) -> Result<ClusterTotals> {
    let window = StatsWindow::ending_at(now, event_time)?;
    let mut totals = ClusterTotals::default();

    for db in &snapshot.databases {
        let entity = entities
            .databases
            .get_mut(&db.uid)
            .ok_or_else(|| Error::Precondition(format!("no entity for database {}", db.uid)))?;
        let set = entity.new_metric_set(EVENT_TYPE);
        attach_database(set, db, &snapshot.stats, replication, &window, &mut totals).await?;
    }

    let set = entities.cluster.new_metric_set(EVENT_TYPE);
    attach_cluster(set, &snapshot.license, &snapshot.nodes, &totals, now)?;
    Ok(totals)
}
