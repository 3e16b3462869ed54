//! End-to-end pipeline tests
//!
//! Drive the pipeline through its public handle with an in-memory
//! store and assert on the objects the flush protocol leaves behind.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

use telemetry_sink::broker::InboundMessage;
use telemetry_sink::config::BatchConfig;
use telemetry_sink::pipeline::spawn_pipeline;
use telemetry_sink::store::InMemoryComposeStore;

fn record(identity: &str, observed_at: &str, speed: f64) -> InboundMessage {
    let payload = json!({
        "identity": identity,
        "observed_at": observed_at,
        "position": {"lat": 48.137, "lon": 11.575},
        "measurements": {
            "speed_kmh": speed,
            "fuel_level_pct": 57.5,
            "engine_temp_c": 90.1,
            "odometer_km": 120_500.0
        }
    });
    InboundMessage::new(format!("fleet/{}/telemetry", identity), payload.to_string())
}

/// Poll until the store holds exactly the expected daily object or time out
async fn wait_for_object(store: &InMemoryComposeStore, key: &str) -> Vec<u8> {
    for _ in 0..200 {
        if let Some(data) = store.object(key) {
            return data;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("object {} never appeared; store has {:?}", key, store.keys());
}

fn lines_of(data: &[u8]) -> Vec<Value> {
    let text = String::from_utf8(data.to_vec()).unwrap();
    assert!(text.ends_with('\n'), "daily object must end with a newline");
    text.lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

#[tokio::test]
async fn test_batch_threshold_creates_daily_object() {
    let store = InMemoryComposeStore::new();
    let batch = BatchConfig {
        batch_max: 2,
        batch_max_interval: Duration::from_secs(60),
    };
    let (handle, task) = spawn_pipeline(Arc::new(store.clone()), batch);

    handle.ingest(record("TRUCK-001", "2025-01-01T08:00:00Z", 61.0));
    handle.ingest(record("TRUCK-001", "2025-01-01T08:00:05Z", 62.5));

    let data = wait_for_object(&store, "TRUCK-001/2025-01-01/data.jsonl").await;
    let lines = lines_of(&data);
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["measurements"]["speed_kmh"], json!(61.0));
    assert_eq!(lines[1]["measurements"]["speed_kmh"], json!(62.5));

    // No part or temp objects survive a clean flush
    assert_eq!(store.keys(), vec!["TRUCK-001/2025-01-01/data.jsonl"]);

    handle.shutdown().await;
    task.await.unwrap();
}

#[tokio::test]
async fn test_repeated_flushes_append_in_order() {
    let store = InMemoryComposeStore::new();
    let batch = BatchConfig {
        batch_max: 1,
        batch_max_interval: Duration::from_secs(60),
    };
    let (handle, task) = spawn_pipeline(Arc::new(store.clone()), batch);

    for (i, speed) in [40.0, 50.0, 60.0].iter().enumerate() {
        handle.ingest(record(
            "TRUCK-007",
            &format!("2025-03-10T09:00:0{}Z", i),
            *speed,
        ));
        // Each record reaches batch_max on its own; wait for it to land
        // before sending the next so the append order is deterministic.
        let mut settled = false;
        for _ in 0..200 {
            let data = store.object("TRUCK-007/2025-03-10/data.jsonl");
            if data.map(|d| lines_of(&d).len()) == Some(i + 1) {
                settled = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(settled, "flush {} never landed", i);
    }

    let data = store.object("TRUCK-007/2025-03-10/data.jsonl").unwrap();
    let lines = lines_of(&data);
    assert_eq!(lines.len(), 3);
    // Older batches stay above newer ones
    assert_eq!(lines[0]["measurements"]["speed_kmh"], json!(40.0));
    assert_eq!(lines[1]["measurements"]["speed_kmh"], json!(50.0));
    assert_eq!(lines[2]["measurements"]["speed_kmh"], json!(60.0));
    assert_eq!(store.keys(), vec!["TRUCK-007/2025-03-10/data.jsonl"]);

    handle.shutdown().await;
    task.await.unwrap();
}

#[tokio::test]
async fn test_invalid_records_never_reach_the_store() {
    let store = InMemoryComposeStore::new();
    let (handle, task) = spawn_pipeline(Arc::new(store.clone()), BatchConfig::test());

    // Not JSON at all
    handle.ingest(InboundMessage::new("fleet/X/telemetry", "not json"));
    // Valid JSON, bad timestamp
    handle.ingest(InboundMessage::new(
        "fleet/X/telemetry",
        json!({
            "identity": "TRUCK-002",
            "observed_at": "yesterday-ish",
            "position": {"lat": 1.0, "lon": 2.0},
            "measurements": {
                "speed_kmh": 1.0, "fuel_level_pct": 1.0,
                "engine_temp_c": 1.0, "odometer_km": 1.0
            }
        })
        .to_string(),
    ));
    // Missing measurement field
    handle.ingest(InboundMessage::new(
        "fleet/X/telemetry",
        json!({
            "identity": "TRUCK-002",
            "observed_at": "2025-01-01T00:00:00Z",
            "position": {"lat": 1.0, "lon": 2.0},
            "measurements": {"speed_kmh": 1.0}
        })
        .to_string(),
    ));

    assert!(handle.depths().await.is_empty());
    handle.shutdown().await;
    task.await.unwrap();

    assert!(store.is_empty());
}

#[tokio::test]
async fn test_shutdown_drains_pending_batches() {
    let store = InMemoryComposeStore::new();
    let batch = BatchConfig {
        batch_max: 100,
        batch_max_interval: Duration::from_secs(3600),
    };
    let (handle, task) = spawn_pipeline(Arc::new(store.clone()), batch);

    handle.ingest(record("TRUCK-001", "2025-01-01T08:00:00Z", 10.0));
    handle.ingest(record("TRUCK-002", "2025-01-01T08:00:00Z", 20.0));
    handle.ingest(record("TRUCK-002", "2025-01-02T08:00:00Z", 30.0));

    // Well under batch_max and before any timer fires
    let depths = handle.depths().await;
    assert_eq!(depths.iter().map(|(_, d)| d).sum::<usize>(), 3);

    handle.shutdown().await;
    task.await.unwrap();

    assert_eq!(
        store.keys(),
        vec![
            "TRUCK-001/2025-01-01/data.jsonl",
            "TRUCK-002/2025-01-01/data.jsonl",
            "TRUCK-002/2025-01-02/data.jsonl",
        ]
    );
    for key in store.keys() {
        assert_eq!(lines_of(&store.object(&key).unwrap()).len(), 1);
    }
}

#[tokio::test]
async fn test_interval_flush_for_slow_producers() {
    let store = InMemoryComposeStore::new();
    let batch = BatchConfig {
        batch_max: 1000,
        batch_max_interval: Duration::from_millis(30),
    };
    let (handle, task) = spawn_pipeline(Arc::new(store.clone()), batch);

    handle.ingest(record("TRUCK-009", "2025-06-15T12:00:00Z", 77.0));

    let data = wait_for_object(&store, "TRUCK-009/2025-06-15/data.jsonl").await;
    assert_eq!(lines_of(&data).len(), 1);

    handle.shutdown().await;
    task.await.unwrap();
}

#[tokio::test]
async fn test_utc_day_partitioning_across_offsets() {
    let store = InMemoryComposeStore::new();
    let batch = BatchConfig {
        batch_max: 1,
        batch_max_interval: Duration::from_secs(60),
    };
    let (handle, task) = spawn_pipeline(Arc::new(store.clone()), batch);

    // 01:30 at +05:00 is 20:30 UTC the previous day
    handle.ingest(record("TRUCK-003", "2025-01-01T01:30:00+05:00", 55.0));

    let data = wait_for_object(&store, "TRUCK-003/2024-12-31/data.jsonl").await;
    assert_eq!(lines_of(&data).len(), 1);

    handle.shutdown().await;
    task.await.unwrap();
}
