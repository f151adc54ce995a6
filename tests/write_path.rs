//! Integration tests for queued writes reaching the PLC.

use beckhoff_bridge::PlcRuntime;
use bridge_core::{BridgeEvent, ConnectionState, PlcConfig, PlcValue};
use bridge_driver_mock::{ErrorConfig, ErrorScenario, MockPlc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

const WAIT: Duration = Duration::from_secs(5);

/// Poll `cond` every few milliseconds until it holds or [`WAIT`] elapses.
async fn eventually(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + WAIT;
    while tokio::time::Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    cond()
}

fn statuses(rx: &mut mpsc::UnboundedReceiver<BridgeEvent>) -> Vec<String> {
    let mut out = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let Some(status) = event.as_status() {
            out.push(status.message.clone());
        }
    }
    out
}

fn device() -> Arc<MockPlc> {
    Arc::new(
        MockPlc::builder()
            .symbol("MAIN.setpoint", 0.0)
            .symbol("MAIN.mode", 0)
            .symbol("MAIN.run", false)
            .build(),
    )
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_queued_write_reaches_device() {
    let plc = device();
    let config = PlcConfig::new("PLC1").with_enabled(true);
    let runtime = PlcRuntime::spawn(&config, plc.clone(), Arc::new(bridge_core::NullSink)).unwrap();

    runtime.queue_write("MAIN.setpoint", 12.5).unwrap();
    runtime.queue_write("MAIN.run", true).unwrap();

    assert!(eventually(|| plc.symbol("MAIN.run") == Some(PlcValue::Bool(true))).await);
    assert_eq!(plc.symbol("MAIN.setpoint"), Some(PlcValue::Float(12.5)));
    assert_eq!(runtime.pending_writes(), 0);

    runtime.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_writes_wait_for_connection() {
    let plc = device();
    let runtime =
        PlcRuntime::spawn(&PlcConfig::new("PLC1"), plc.clone(), Arc::new(bridge_core::NullSink))
            .unwrap();

    runtime.queue_write("MAIN.mode", 1).unwrap();
    runtime.queue_write("MAIN.mode", 2).unwrap();
    runtime.queue_write("MAIN.mode", 3).unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(plc.writes().is_empty());
    assert_eq!(runtime.pending_writes(), 1);

    runtime.set_enabled(true);
    assert!(eventually(|| !plc.writes().is_empty()).await);

    let writes = plc.writes();
    assert_eq!(writes.len(), 1, "coalesced into a single batch");
    assert_eq!(writes[0]["MAIN.mode"], PlcValue::Int(3));

    runtime.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_unknown_symbol_drops_batch() {
    let plc = device();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let config = PlcConfig::new("PLC1").with_enabled(true);
    let runtime = PlcRuntime::spawn(&config, plc.clone(), Arc::new(tx)).unwrap();
    assert!(eventually(|| runtime.connection_state() == ConnectionState::Connected).await);

    runtime.queue_write("MAIN.nope", 1).unwrap();
    let mut seen = Vec::new();
    assert!(
        eventually(|| {
            seen.extend(statuses(&mut rx));
            seen.iter().any(|m| m.starts_with("Error writing one of:"))
        })
        .await
    );
    assert!(seen.iter().any(|m| m.starts_with("Error writing: ")));
    assert!(seen.contains(&"Error writing one of: [MAIN.nope]".to_string()));
    assert!(plc.writes().is_empty());
    assert_eq!(runtime.pending_writes(), 0, "failed batch is not retried");

    // Later writes are unaffected.
    runtime.queue_write("MAIN.mode", 9).unwrap();
    assert!(eventually(|| plc.symbol("MAIN.mode") == Some(PlcValue::Int(9))).await);

    runtime.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_write_timeout_is_reported() {
    let plc = Arc::new(
        MockPlc::builder()
            .symbol("MAIN.mode", 0)
            .error_config(ErrorConfig::scenario(ErrorScenario::Timeout { operation: "write" }))
            .build(),
    );
    let (tx, mut rx) = mpsc::unbounded_channel();
    let runtime =
        PlcRuntime::spawn(&PlcConfig::new("PLC1").with_enabled(true), plc.clone(), Arc::new(tx))
            .unwrap();

    runtime.queue_write("MAIN.mode", 5).unwrap();
    let mut seen = Vec::new();
    assert!(
        eventually(|| {
            seen.extend(statuses(&mut rx));
            seen.iter().any(|m| m.starts_with("Error writing: "))
        })
        .await
    );
    assert!(!seen.iter().any(|m| m.starts_with("Error writing one of:")));
    assert_eq!(plc.symbol("MAIN.mode"), Some(PlcValue::Int(0)));
    assert_eq!(runtime.connection_state(), ConnectionState::Connected);

    runtime.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_writers_lose_nothing() {
    let plc = Arc::new(MockPlc::new());
    for i in 0..64 {
        plc.set_symbol(format!("GVL.v[{i}]"), 0);
    }
    let runtime = Arc::new(
        PlcRuntime::spawn(
            &PlcConfig::new("PLC1").with_enabled(true),
            plc.clone(),
            Arc::new(bridge_core::NullSink),
        )
        .unwrap(),
    );

    let writers: Vec<_> = (0..4)
        .map(|t| {
            let runtime = runtime.clone();
            tokio::spawn(async move {
                for i in (t..64).step_by(4) {
                    runtime.queue_write(&format!("GVL.v[{i}]"), i as i64 + 1).unwrap();
                    tokio::task::yield_now().await;
                }
            })
        })
        .collect();
    for writer in writers {
        writer.await.unwrap();
    }

    assert!(
        eventually(|| {
            (0..64).all(|i| plc.symbol(&format!("GVL.v[{i}]")) == Some(PlcValue::Int(i + 1)))
        })
        .await
    );

    let written: usize = plc.writes().iter().map(|batch| batch.len()).sum();
    assert_eq!(written, 64, "every write delivered exactly once");

    runtime.stop().await;
}
