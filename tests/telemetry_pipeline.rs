//! Telemetry delivery through the service, end to end.

use std::time::{Duration, Instant};

use moniker_svc::catalog::load_catalog_str;
use moniker_svc::events::{
    BroadcastSinkConfig, FileSinkConfig, Operation, Outcome, PipelineState, RotationPolicy,
};
use moniker_svc::{
    CallerIdentity, MonikerService, ServiceConfig, SourceType, TelemetryConfig, TelemetryPipeline,
    UsageEvent,
};
use serde_json::json;
use tokio::net::UdpSocket;
use uuid::Uuid;

const CATALOG: &str = r#"
market-data:
  ownership:
    accountable_owner: jane@firm.com
market-data/prices/equity:
  source_binding:
    type: snowflake
    query: "SELECT * FROM equity_prices WHERE symbol='{path}'"
"#;

fn service(telemetry: TelemetryConfig) -> MonikerService {
    let config = ServiceConfig::default().with_telemetry(telemetry);
    MonikerService::new(load_catalog_str(CATALOG).unwrap(), &config).unwrap()
}

fn failed(n: usize) -> UsageEvent {
    UsageEvent::resolve_failed(
        Uuid::new_v4(),
        CallerIdentity::anonymous(),
        format!("bonds/{}", n),
        true,
        "no catalog entry",
        Duration::ZERO,
    )
}

#[tokio::test]
async fn test_file_sink_receives_resolve_and_access_events() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("usage.jsonl");
    let svc = service(
        TelemetryConfig::with_file_sink(FileSinkConfig {
            path: path.clone(),
            rotation: RotationPolicy::Daily,
            max_files: 3,
        })
        .flush_interval(Duration::from_secs(3600)),
    );
    svc.start().await.unwrap();

    let caller = CallerIdentity::from_headers([("X-App-Id", "risk-dashboard"), ("X-Team", "risk")]);
    svc.resolve("market-data/prices/equity/AAPL", &caller).unwrap();
    svc.resolve("bonds/UST10Y", &caller).unwrap_err();
    svc.record_access(
        json!({
            "timestamp": "2026-01-15T10:00:00Z",
            "moniker": "market-data/prices/equity/AAPL",
            "operation": "access",
            "outcome": "success",
            "source_type": "snowflake",
            "row_count": 250
        }),
        &caller,
    )
    .unwrap();

    svc.shutdown().await;
    let stats = svc.health().telemetry;
    assert_eq!(stats.state, PipelineState::Stopped);
    assert_eq!((stats.emitted, stats.delivered, stats.dropped), (3, 3, 0));

    // Daily rotation writes to a dated file next to the configured path
    let mut written = Vec::new();
    let mut entries = tokio::fs::read_dir(dir.path()).await.unwrap();
    while let Some(entry) = entries.next_entry().await.unwrap() {
        written.push(entry.path());
    }
    assert_eq!(written.len(), 1);
    let content = tokio::fs::read_to_string(&written[0]).await.unwrap();
    let events: Vec<UsageEvent> = content
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(events.len(), 3);

    assert_eq!(events[0].operation, Operation::Resolve);
    assert_eq!(events[0].outcome, Outcome::Success);
    assert_eq!(events[0].source_type, Some(SourceType::Snowflake));
    assert_eq!(events[0].caller.app_id.as_deref(), Some("risk-dashboard"));
    assert_eq!(
        events[0]
            .ownership
            .as_ref()
            .and_then(|o| o.accountable_owner.as_deref()),
        Some("jane@firm.com")
    );

    assert_eq!(events[1].outcome, Outcome::NotFound);
    assert!(events[1].error.is_some());

    assert_eq!(events[2].operation, Operation::Access);
    assert_eq!(events[2].row_count, Some(250));
    assert_eq!(events[2].caller.team.as_deref(), Some("risk"));
}

#[tokio::test]
async fn test_broadcast_sink_publishes_topic_prefixed_datagrams() {
    let listener = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let endpoint = listener.local_addr().unwrap().to_string();

    let svc = service(
        TelemetryConfig::with_broadcast_sink(BroadcastSinkConfig {
            endpoint,
            topic: "moniker.usage".to_string(),
        })
        .batch_size(1),
    );
    svc.start().await.unwrap();
    svc.resolve("market-data/prices/equity/MSFT", &CallerIdentity::anonymous())
        .unwrap();

    let mut buf = vec![0u8; 64 * 1024];
    let len = tokio::time::timeout(Duration::from_secs(5), listener.recv(&mut buf))
        .await
        .expect("no datagram received")
        .unwrap();
    let datagram = std::str::from_utf8(&buf[..len]).unwrap();
    let (topic, body) = datagram.split_once(' ').unwrap();
    assert_eq!(topic, "moniker.usage");
    let event: UsageEvent = serde_json::from_str(body).unwrap();
    assert_eq!(event.moniker, "market-data/prices/equity/MSFT");

    svc.shutdown().await;
}

#[tokio::test]
async fn test_resolution_unaffected_by_unreachable_sink() {
    // Nothing listens on the endpoint; UDP sends still succeed or fail
    // silently, and resolution never notices.
    let svc = service(
        TelemetryConfig::with_broadcast_sink(BroadcastSinkConfig {
            endpoint: "127.0.0.1:9".to_string(),
            topic: "moniker.usage".to_string(),
        })
        .batch_size(1),
    );
    svc.start().await.unwrap();
    for _ in 0..20 {
        assert!(svc
            .resolve("market-data/prices/equity/AAPL", &CallerIdentity::anonymous())
            .is_ok());
    }
    svc.shutdown().await;
    assert_eq!(svc.health().telemetry.emitted, 20);
}

#[test]
fn test_emit_is_bounded_and_counts_drops_when_nothing_drains() {
    // Never started: the buffer fills and every further event is dropped.
    let pipeline = TelemetryPipeline::new(TelemetryConfig::default().buffer_size(8)).unwrap();
    let events: Vec<UsageEvent> = (0..1_000).map(failed).collect();

    let started = Instant::now();
    let mut slowest = Duration::ZERO;
    for event in events {
        let t = Instant::now();
        pipeline.emit(event);
        slowest = slowest.max(t.elapsed());
    }
    let total = started.elapsed();

    let stats = pipeline.stats();
    assert_eq!(stats.emitted, 8);
    assert_eq!(stats.dropped, 992);
    assert_eq!(stats.pending, 8);
    assert!(slowest < Duration::from_millis(10), "slowest emit took {slowest:?}");
    assert!(total < Duration::from_millis(250), "1000 emits took {total:?}");
}

#[tokio::test]
async fn test_shutdown_flushes_buffered_events() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("usage.jsonl");
    let pipeline = TelemetryPipeline::new(
        TelemetryConfig::with_file_sink(FileSinkConfig {
            path: path.clone(),
            rotation: RotationPolicy::Size { max_bytes: 1 << 20 },
            max_files: 1,
        })
        .batch_size(1_000)
        .flush_interval(Duration::from_secs(3600)),
    )
    .unwrap();
    pipeline.start().await.unwrap();

    for n in 0..50 {
        pipeline.emit(failed(n));
    }
    pipeline.shutdown().await;

    let content = tokio::fs::read_to_string(&path).await.unwrap();
    assert_eq!(content.lines().count(), 50);
    let stats = pipeline.stats();
    assert_eq!((stats.delivered, stats.lost), (50, 0));
}
