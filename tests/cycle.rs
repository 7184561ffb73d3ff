use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use redis_enterprise_telemetry::cycle::{self, Cycle, Options};
use redis_enterprise_telemetry::telemetry::{Integration, JsonPublisher, Publisher};
use redis_enterprise_telemetry::{api, Client, Error};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const USERNAME: &str = "admin@example.com";
const PASSWORD: &str = "secret";

struct Api {
    leader: bool,
    databases: Value,
    stats: Value,
    // path -> status and raw body
    broken: Option<(&'static str, StatusCode, &'static str)>,
    slow: Option<(&'static str, Duration)>,
    requests: Mutex<Vec<String>>,
    auth: Mutex<Vec<Option<String>>>,
}

impl Default for Api {
    fn default() -> Self {
        Self {
            leader: true,
            databases: json!([
                {"uid": 1, "name": "cache", "memory_size": 200, "shards_count": 2,
                 "endpoints": [{"uid": "1:1"}], "bigstore": false, "crdt": false},
                {"uid": 2, "name": "flash", "memory_size": 1000, "shards_count": 4,
                 "endpoints": [{"uid": "2:1"}, {"uid": "2:2"}], "bigstore": true, "crdt": false},
                {"uid": 3, "name": "geo", "memory_size": 600, "shards_count": 1,
                 "endpoints": [], "bigstore": false, "crdt": true, "crdt_sync": "enabled"}
            ]),
            stats: json!({
                "1": stats(50, 10, None),
                "2": stats(150, 20, Some(3)),
                "3": stats(300, 30, None)
            }),
            broken: None,
            slow: None,
            requests: Mutex::new(Vec::new()),
            auth: Mutex::new(Vec::new()),
        }
    }
}

fn stats(used_memory: u64, total_req: u64, bigstore: Option<u64>) -> Value {
    let mut s = json!({
        "avg_latency": 0.001, "avg_read_latency": 0.001, "avg_write_latency": 0.002,
        "conns": 5, "egress_bytes": 100, "evicted_objects": 0, "expired_objects": 1,
        "ingress_bytes": 200, "other_req": 1, "read_hits": 8, "read_misses": 2,
        "read_req": 10, "shard_cpu_system": 0.5, "shard_cpu_user": 1.5,
        "total_req": total_req, "used_memory": used_memory, "write_hits": 4,
        "write_misses": 1, "write_req": 5
    });
    if let Some(v) = bigstore {
        for name in [
            "bigstore_objs_ram",
            "bigstore_objs_flash",
            "bigstore_io_reads",
            "bigstore_io_writes",
            "bigstore_throughput",
            "big_write_ram",
            "big_write_flash",
            "big_del_ram",
            "big_del_flash",
        ] {
            s[name] = json!(v);
        }
    }
    s
}

async fn handler(State(api): State<Arc<Api>>, headers: HeaderMap, uri: Uri) -> Response {
    api.requests.lock().unwrap().push(uri.to_string());
    api.auth.lock().unwrap().push(
        headers
            .get(header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .map(str::to_string),
    );

    if let Some((path, delay)) = api.slow {
        if uri.path() == path {
            tokio::time::sleep(delay).await;
        }
    }

    if let Some((path, status, body)) = api.broken {
        if uri.path() == path {
            return (status, body).into_response();
        }
    }

    match uri.path() {
        "/v1/cluster" if !api.leader => (
            StatusCode::TEMPORARY_REDIRECT,
            [(header::LOCATION, "https://leader.cluster.local:9443/v1/cluster")],
        )
            .into_response(),
        "/v1/cluster" => Json(json!({"name": "cluster.local"})).into_response(),
        "/v1/license" => Json(json!({
            "expiration_date": "2099-01-01T00:00:00Z",
            "shards_limit": 16,
            "expired": false
        }))
        .into_response(),
        "/v1/nodes" => Json(json!([
            {"uid": 1, "status": "active", "total_memory": 1000, "cores": 4},
            {"uid": 2, "status": "active", "total_memory": 1000, "cores": 4},
            {"uid": 3, "status": "provisioning", "total_memory": 500, "cores": 2}
        ]))
        .into_response(),
        "/v1/bdbs" => Json(api.databases.clone()).into_response(),
        "/v1/bdbs/stats/last" => Json(api.stats.clone()).into_response(),
        p if p.starts_with("/v1/bdbs/stats/") => Json(json!({
            "intervals": [{
                "interval": "10sec",
                "crdt_egress_bytes": 11, "crdt_egress_bytes_decompressed": 22,
                "crdt_ingress_bytes": 33, "crdt_ingress_bytes_decompressed": 44,
                "crdt_pending_local_writes_max": 5, "crdt_pending_local_writes_min": 1,
                "crdt_local_ingress_lag_time": 0.25
            }]
        }))
        .into_response(),
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn serve(api: Api) -> anyhow::Result<(Client, Arc<Api>)> {
    let api = Arc::new(api);
    let app = Router::new().fallback(handler).with_state(api.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move { axum::serve(listener, app).await });

    let client = Client::builder()
        .timeout(Duration::from_secs(5))
        .connect(&format!("http://{addr}"), USERNAME, PASSWORD)?;
    Ok((client, api))
}

fn collected(cycle: Cycle) -> Integration {
    match cycle {
        Cycle::Collected(integration) => integration,
        Cycle::Skipped => panic!("cycle was skipped"),
    }
}

#[tokio::test]
async fn full_cycle() -> anyhow::Result<()> {
    let (client, api) = serve(Api::default()).await?;
    let integration = collected(cycle::run(&client, &Options::default()).await?);

    // cluster plus one entity per database
    assert_eq!(integration.entities().len(), 4);
    let cluster = integration
        .entity("cluster.local", "redisecluster")
        .expect("cluster entity");
    assert_eq!(
        cluster.inventory_item("RedisEnterpriseType", "value"),
        Some("cluster")
    );

    let gauges = &cluster.metric_sets()[0];
    assert_eq!(gauges.get("cluster.ClusterTotalMemory"), Some(2500.0));
    assert_eq!(gauges.get("cluster.ClusterTotalCores"), Some(10.0));
    assert_eq!(gauges.get("cluster.ClusterActiveNodes"), Some(2.0));
    assert_eq!(gauges.get("cluster.ClusterNodes"), Some(3.0));
    assert_eq!(gauges.get("cluster.ShardsLicense"), Some(16.0));
    assert_eq!(gauges.get("cluster.TotalShardsUsed"), Some(7.0));
    assert_eq!(gauges.get("cluster.TotalMemoryUsed"), Some(500.0));
    assert_eq!(gauges.get("cluster.TotalMemoryUsedPercent"), Some(20.0));
    assert_eq!(gauges.get("cluster.TotalReqs"), Some(60.0));
    assert!(gauges.get("cluster.DaysUntilExpiration").unwrap() > 0.0);

    let cache = integration
        .entity("cluster.local:cache", "redisedb")
        .expect("cache entity");
    assert_eq!(
        cache.inventory_item("RedisEnterpriseType", "value"),
        Some("database")
    );
    let gauges = &cache.metric_sets()[0];
    assert_eq!(gauges.get("bdb.UsedMemoryPercent"), Some(25.0));
    assert_eq!(gauges.get("bdb.Endpoints"), Some(1.0));
    assert!(gauges.get("bdb.BigstoreObjsRam").is_none());
    assert!(gauges.get("crdt.CrdtEgressBytes").is_none());

    let flash = &integration
        .entity("cluster.local:flash", "redisedb")
        .expect("flash entity")
        .metric_sets()[0];
    assert_eq!(flash.get("bdb.BigstoreObjsRam"), Some(3.0));
    assert_eq!(flash.get("bdb.BigDelFlash"), Some(3.0));
    assert_eq!(flash.get("bdb.Endpoints"), Some(2.0));

    let geo = &integration
        .entity("cluster.local:geo", "redisedb")
        .expect("geo entity")
        .metric_sets()[0];
    assert_eq!(geo.get("bdb.CrdtSyncStatus"), Some(1.0));
    assert_eq!(geo.get("crdt.CrdtEgressBytes"), Some(11.0));
    assert_eq!(geo.get("crdt.CrdtLocalIngressLagTime"), Some(0.25));
    assert_eq!(geo.get("bdb.UsedMemoryPercent"), Some(50.0));

    // only the Active-Active database is asked for replication stats
    let requests = api.requests.lock().unwrap().clone();
    let replication: Vec<_> = requests
        .iter()
        .filter(|r| r.starts_with("/v1/bdbs/stats/") && !r.starts_with("/v1/bdbs/stats/last"))
        .collect();
    assert_eq!(replication.len(), 1);
    assert!(replication[0].starts_with("/v1/bdbs/stats/3?"));

    let query = replication[0].split_once('?').unwrap().1;
    let params: std::collections::HashMap<String, String> =
        url::form_urlencoded::parse(query.as_bytes()).into_owned().collect();
    assert_eq!(params["interval"], "10sec");
    let stime = chrono::NaiveDateTime::parse_from_str(&params["stime"], "%Y-%m-%dT%H:%M:%SZ")?;
    let etime = chrono::NaiveDateTime::parse_from_str(&params["etime"], "%Y-%m-%dT%H:%M:%SZ")?;
    assert_eq!(etime - stime, chrono::Duration::seconds(60));

    // admin@example.com:secret
    let expected = "Basic YWRtaW5AZXhhbXBsZS5jb206c2VjcmV0";
    assert!(api
        .auth
        .lock()
        .unwrap()
        .iter()
        .all(|a| a.as_deref() == Some(expected)));

    let mut publisher = JsonPublisher::new(Vec::new());
    publisher.publish(&integration)?;
    let json: Value = serde_json::from_slice(&publisher.into_inner())?;
    assert_eq!(json["name"], "com.redis.redisenterprise");
    assert_eq!(json["data"].as_array().map(Vec::len), Some(4));
    assert_eq!(json["data"][0]["entity"]["type"], "redisecluster");
    Ok(())
}

#[tokio::test]
async fn not_leader_is_skipped() -> anyhow::Result<()> {
    let (client, api) = serve(Api {
        leader: false,
        ..Default::default()
    })
    .await?;

    let cycle = cycle::run(&client, &Options::default()).await?;
    assert!(matches!(cycle, Cycle::Skipped));
    assert_eq!(*api.requests.lock().unwrap(), vec!["/v1/cluster".to_string()]);
    Ok(())
}

#[tokio::test]
async fn probe_failure_is_fatal() -> anyhow::Result<()> {
    let (client, _) = serve(Api {
        broken: Some(("/v1/cluster", StatusCode::INTERNAL_SERVER_ERROR, "oops")),
        ..Default::default()
    })
    .await?;

    let res = cycle::run(&client, &Options::default()).await;
    assert!(matches!(
        res,
        Err(Error::UnexpectedStatus { status: 500, .. })
    ));
    Ok(())
}

#[tokio::test]
async fn malformed_body() -> anyhow::Result<()> {
    let (client, _) = serve(Api {
        broken: Some(("/v1/license", StatusCode::OK, "{\"shards_limit\": ")),
        ..Default::default()
    })
    .await?;

    match cycle::run(&client, &Options::default()).await {
        Err(Error::Decode { path, .. }) => assert_eq!(path, "v1/license"),
        other => panic!("expected a decode error, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn unexpected_status() -> anyhow::Result<()> {
    let (client, _) = serve(Api {
        broken: Some(("/v1/nodes", StatusCode::SERVICE_UNAVAILABLE, "")),
        ..Default::default()
    })
    .await?;

    match api::nodes(&client).await {
        Err(Error::UnexpectedStatus { status, path }) => {
            assert_eq!(status, 503);
            assert_eq!(path, "v1/nodes");
        }
        other => panic!("expected a status error, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn replication_failure_aborts_cycle() -> anyhow::Result<()> {
    let (client, _) = serve(Api {
        broken: Some(("/v1/bdbs/stats/3", StatusCode::INTERNAL_SERVER_ERROR, "")),
        ..Default::default()
    })
    .await?;

    assert!(matches!(
        cycle::run(&client, &Options::default()).await,
        Err(Error::UnexpectedStatus { status: 500, .. })
    ));
    Ok(())
}

#[tokio::test]
async fn inventory_only() -> anyhow::Result<()> {
    let (client, api) = serve(Api::default()).await?;
    let options = Options {
        metrics: false,
        ..Default::default()
    };
    let integration = collected(cycle::run(&client, &options).await?);

    assert_eq!(integration.entities().len(), 4);
    assert!(integration
        .entities()
        .iter()
        .all(|e| e.metric_sets().is_empty()
            && e.inventory_item("RedisEnterpriseType", "value").is_some()));
    assert!(!api
        .requests
        .lock()
        .unwrap()
        .iter()
        .any(|r| r.starts_with("/v1/bdbs/stats/3")));
    Ok(())
}

#[tokio::test]
async fn no_databases() -> anyhow::Result<()> {
    let (client, _) = serve(Api {
        databases: json!([]),
        stats: json!({}),
        ..Default::default()
    })
    .await?;

    let integration = collected(cycle::run(&client, &Options::default()).await?);
    assert_eq!(integration.entities().len(), 1);
    let gauges = &integration.entities()[0].metric_sets()[0];
    assert_eq!(gauges.get("cluster.TotalShardsUsed"), Some(0.0));
    assert_eq!(gauges.get("cluster.TotalMemoryUsed"), Some(0.0));
    assert_eq!(gauges.get("cluster.TotalReqs"), Some(0.0));
    Ok(())
}

#[tokio::test]
async fn cycle_deadline() -> anyhow::Result<()> {
    let (client, _) = serve(Api {
        slow: Some(("/v1/bdbs", Duration::from_secs(2))),
        ..Default::default()
    })
    .await?;

    let options = Options {
        deadline: Some(Duration::from_millis(200)),
        ..Default::default()
    };
    assert!(matches!(
        cycle::run(&client, &options).await,
        Err(Error::Timeout(_))
    ));
    Ok(())
}

#[tokio::test]
async fn connection_refused() -> anyhow::Result<()> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    let addr = listener.local_addr()?;
    drop(listener);

    let client = Client::builder().connect(&format!("http://{addr}"), USERNAME, PASSWORD)?;
    assert!(matches!(
        cycle::run(&client, &Options::default()).await,
        Err(Error::Transport(_))
    ));
    Ok(())
}
