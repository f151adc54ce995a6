//! End-to-end tests of a PLC runtime against the mock driver.

use async_trait::async_trait;
use beckhoff_bridge::PlcRuntime;
use bridge_core::{
    BridgeEvent, BridgeEventKind, CommunicationDriver, ConnectionState, DriverResult,
    FlatValues, LifecycleEvent, PlcConfig, PlcValue,
};
use bridge_driver_mock::{ErrorConfig, ErrorScenario, MockPlc};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

fn spawn(
    config: PlcConfig,
    plc: &Arc<MockPlc>,
) -> (PlcRuntime, mpsc::UnboundedReceiver<BridgeEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let runtime = PlcRuntime::spawn(&config, plc.clone(), Arc::new(tx)).unwrap();
    (runtime, rx)
}

/// Receive events until `pred` matches one, returning everything seen.
async fn wait_for(
    rx: &mut mpsc::UnboundedReceiver<BridgeEvent>,
    mut pred: impl FnMut(&BridgeEvent) -> bool,
) -> Vec<BridgeEvent> {
    let mut seen = Vec::new();
    let found = timeout(WAIT, async {
        while let Some(event) = rx.recv().await {
            let done = pred(&event);
            seen.push(event);
            if done {
                return true;
            }
        }
        false
    })
    .await;

    match found {
        Ok(true) => seen,
        Ok(false) => panic!("event channel closed"),
        Err(_) => panic!(
            "timed out; saw {:?}",
            seen.iter().map(|e| &e.kind).collect::<Vec<_>>()
        ),
    }
}

fn drain(rx: &mut mpsc::UnboundedReceiver<BridgeEvent>) -> Vec<BridgeEvent> {
    let mut out = Vec::new();
    while let Ok(event) = rx.try_recv() {
        out.push(event);
    }
    out
}

fn statuses(events: &[BridgeEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| e.as_status().map(|s| s.message.clone()))
        .collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_single_variable_tree() {
    let plc = Arc::new(MockPlc::builder().symbol("M.x", 7).build());
    let config = PlcConfig::new("PLC1")
        .with_enabled(true)
        .with_refresh_ms(50)
        .with_read_variables(["M.x"]);
    let (runtime, mut rx) = spawn(config, &plc);

    let events = wait_for(&mut rx, |e| e.as_data().is_some()).await;
    assert_eq!(events[0].kind, BridgeEventKind::Initialized);
    assert!(events.iter().all(|e| e.plc == "PLC1"));

    let tree = events.last().and_then(|e| e.as_data()).unwrap();
    assert_eq!(tree.to_json(), json!({"M": {"x": 7}}));
    assert_eq!(runtime.latest_data().unwrap().to_json(), json!({"M": {"x": 7}}));
    assert_eq!(runtime.connection_state(), ConnectionState::Connected);

    runtime.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_nested_paths_and_counters() {
    let plc = Arc::new(
        MockPlc::builder()
            .symbol("MAIN.counter", 0)
            .symbol("MAIN.axis[1].pos", 2.5)
            .counters(["MAIN.counter"])
            .build(),
    );
    let config = PlcConfig::new("PLC1")
        .with_enabled(true)
        .with_refresh_ms(10)
        .with_read_variables(["MAIN.counter", "MAIN.axis[1].pos"]);
    let (runtime, mut rx) = spawn(config, &plc);

    let mut data = 0;
    let events = wait_for(&mut rx, |e| {
        if e.as_data().is_some() {
            data += 1;
        }
        data == 3
    })
    .await;

    let tree = events.last().and_then(|e| e.as_data()).unwrap();
    let counter = tree.to_json()["MAIN"]["counter"].as_i64().unwrap();
    assert!(counter >= 3);
    assert_eq!(tree.to_json()["MAIN"]["axis"], json!([null, {"pos": 2.5}]));

    runtime.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_variables_added_later_are_read() {
    let plc = Arc::new(MockPlc::builder().symbol("A.x", 1).symbol("B.y", true).build());
    let config = PlcConfig::new("PLC1")
        .with_enabled(true)
        .with_refresh_ms(10)
        .with_read_variables(["A.x"]);
    let (runtime, mut rx) = spawn(config, &plc);

    wait_for(&mut rx, |e| e.as_data().is_some()).await;
    assert!(runtime.add_cyclic_read_variable("B.y").unwrap());

    let events = wait_for(&mut rx, |e| {
        e.as_data()
            .is_some_and(|t| t.to_json().get("B").is_some())
    })
    .await;
    let tree = events.last().and_then(|e| e.as_data()).unwrap();
    assert_eq!(tree.to_json(), json!({"A": {"x": 1}, "B": {"y": true}}));
    assert_eq!(plc.registered_reads(), vec!["A.x", "B.y"]);

    runtime.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stale_fields_are_retained() {
    let plc = Arc::new(MockPlc::builder().symbol("A.x", 1).symbol("A.y", 2).build());
    let config = PlcConfig::new("PLC1")
        .with_enabled(true)
        .with_refresh_ms(10)
        .with_read_variables(["A.x"]);
    let (runtime, mut rx) = spawn(config, &plc);

    wait_for(&mut rx, |e| e.as_data().is_some()).await;
    plc.set_symbol("A.x", 10);
    runtime.add_cyclic_read_variable("A.y").unwrap();

    let events = wait_for(&mut rx, |e| {
        e.as_data()
            .is_some_and(|t| t.to_json() == json!({"A": {"x": 10, "y": 2}}))
    })
    .await;
    assert!(events.last().is_some());

    runtime.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_unknown_symbol_reports_status() {
    let plc = Arc::new(MockPlc::builder().symbol("A.x", 1).build());
    let config = PlcConfig::new("PLC1")
        .with_enabled(true)
        .with_refresh_ms(10)
        .with_read_variables(["A.x", "A.missing"]);
    let (runtime, mut rx) = spawn(config, &plc);

    let events = wait_for(&mut rx, |e| {
        e.as_status()
            .is_some_and(|s| s.message.starts_with("Error reading one of:"))
    })
    .await;

    let messages = statuses(&events);
    assert!(messages.iter().any(|m| m.starts_with("Error reading: ")));
    assert_eq!(
        messages.last().unwrap(),
        "Error reading one of: [A.x, A.missing]"
    );
    assert!(events.iter().all(|e| e.as_data().is_none()));
    assert_eq!(runtime.connection_state(), ConnectionState::Connected);

    runtime.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_disable_emits_one_disconnect() {
    let plc = Arc::new(MockPlc::builder().symbol("A.x", 1).build());
    let config = PlcConfig::new("PLC1")
        .with_enabled(true)
        .with_refresh_ms(10)
        .with_read_variables(["A.x"]);
    let (runtime, mut rx) = spawn(config, &plc);

    wait_for(&mut rx, |e| e.as_data().is_some()).await;
    runtime.set_enabled(false);

    let events = wait_for(&mut rx, |e| {
        e.as_lifecycle() == Some(LifecycleEvent::Disconnected)
    })
    .await;
    assert!(events
        .iter()
        .any(|e| e.kind == BridgeEventKind::Enabled(false)));

    tokio::time::sleep(Duration::from_millis(100)).await;
    let later = drain(&mut rx);
    assert!(later.iter().all(|e| e.as_lifecycle().is_none()));
    assert!(later.iter().all(|e| e.as_data().is_none()));
    assert_eq!(plc.connect_attempts(), 1);
    assert_eq!(runtime.connection_state(), ConnectionState::Disabled);

    runtime.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_disabled_runtime_never_connects() {
    let plc = Arc::new(MockPlc::builder().symbol("A.x", 1).build());
    let (runtime, mut rx) = spawn(PlcConfig::new("PLC1").with_read_variables(["A.x"]), &plc);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(plc.connect_attempts(), 0);
    let events = drain(&mut rx);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, BridgeEventKind::Initialized);

    runtime.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_refused_connect_retries() {
    let plc = Arc::new(
        MockPlc::builder()
            .symbol("A.x", 1)
            .error_config(ErrorConfig::scenario(ErrorScenario::RefuseConnect { attempts: 1 }))
            .build(),
    );
    let config = PlcConfig::new("PLC1")
        .with_enabled(true)
        .with_read_variables(["A.x"]);
    let (runtime, mut rx) = spawn(config, &plc);

    let events = wait_for(&mut rx, |e| e.as_data().is_some()).await;
    let messages = statuses(&events);
    assert_eq!(messages.len(), 1);
    assert!(messages[0].starts_with("Error connecting: "));
    assert_eq!(plc.connect_attempts(), 2);

    runtime.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_communication_loss_reconnects() {
    let plc = Arc::new(
        MockPlc::builder()
            .symbol("A.x", 1)
            .error_config(ErrorConfig::scenario(ErrorScenario::CommunicationLoss))
            .build(),
    );
    let config = PlcConfig::new("PLC1")
        .with_enabled(true)
        .with_refresh_ms(10)
        .with_read_variables(["A.x"]);
    let (runtime, mut rx) = spawn(config, &plc);

    let events = wait_for(&mut rx, |e| e.as_data().is_some()).await;
    let lifecycle: Vec<_> = events.iter().filter_map(|e| e.as_lifecycle()).collect();
    assert_eq!(
        lifecycle,
        vec![
            LifecycleEvent::Connecting,
            LifecycleEvent::Connected,
            LifecycleEvent::Disconnected,
            LifecycleEvent::Connecting,
            LifecycleEvent::Connected
        ]
    );
    let messages = statuses(&events);
    assert_eq!(messages.len(), 1);
    assert!(messages[0].starts_with("Error reading: "));
    assert_eq!(plc.connect_attempts(), 2);

    runtime.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_device_side_drop_reconnects() {
    let plc = Arc::new(MockPlc::builder().symbol("A.x", 1).build());
    let config = PlcConfig::new("PLC1")
        .with_enabled(true)
        .with_refresh_ms(10)
        .with_read_variables(["A.x"]);
    let (runtime, mut rx) = spawn(config, &plc);

    wait_for(&mut rx, |e| e.as_data().is_some()).await;
    plc.drop_session();

    wait_for(&mut rx, |e| {
        e.as_lifecycle() == Some(LifecycleEvent::Disconnected)
    })
    .await;
    wait_for(&mut rx, |e| e.as_data().is_some()).await;
    assert_eq!(plc.connect_attempts(), 2);
    assert_eq!(runtime.connection_state(), ConnectionState::Connected);

    runtime.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_refresh_rate_paces_reads() {
    let plc = Arc::new(MockPlc::builder().symbol("A.x", 1).build());
    let config = PlcConfig::new("PLC1")
        .with_enabled(true)
        .with_refresh_ms(100)
        .with_read_variables(["A.x"]);
    let (runtime, mut rx) = spawn(config, &plc);

    wait_for(&mut rx, |e| e.as_data().is_some()).await;
    let before = plc.read_cycles();
    tokio::time::sleep(Duration::from_millis(550)).await;
    let cycles = plc.read_cycles() - before;
    assert!((3..=7).contains(&cycles), "{cycles} cycles in 550 ms at 100 ms");

    runtime.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stop_is_idempotent_and_disconnects() {
    let plc = Arc::new(MockPlc::builder().symbol("A.x", PlcValue::Int(1)).build());
    let config = PlcConfig::new("PLC1")
        .with_enabled(true)
        .with_refresh_ms(10)
        .with_read_variables(["A.x"]);
    let (runtime, mut rx) = spawn(config, &plc);

    wait_for(&mut rx, |e| e.as_data().is_some()).await;
    timeout(WAIT, runtime.stop()).await.unwrap();
    timeout(WAIT, runtime.stop()).await.unwrap();

    assert!(!runtime.is_running());
    assert_eq!(runtime.connection_state(), ConnectionState::Disabled);
    let lifecycle: Vec<_> = drain(&mut rx).iter().filter_map(|e| e.as_lifecycle()).collect();
    assert_eq!(lifecycle, vec![LifecycleEvent::Disconnected]);

    let cycles = plc.read_cycles();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(plc.read_cycles(), cycles);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_endpoint_change_moves_session() {
    let plc = Arc::new(MockPlc::builder().symbol("A.x", 1).build());
    let config = PlcConfig::new("PLC1")
        .with_enabled(true)
        .with_refresh_ms(10)
        .with_read_variables(["A.x"]);
    let (runtime, mut rx) = spawn(config, &plc);

    wait_for(&mut rx, |e| e.as_data().is_some()).await;
    runtime.set_endpoint("10.1.1.1.1.1");
    wait_for(&mut rx, |e| {
        e.as_lifecycle() == Some(LifecycleEvent::Connected)
    })
    .await;
    assert_eq!(plc.connected_endpoint().as_deref(), Some("10.1.1.1.1.1"));

    runtime.stop().await;
}

/// Mock PLC whose read results also carry names the bridge cannot parse,
/// like a device with a symbol table the path syntax does not cover.
struct UnparseableNames {
    plc: Arc<MockPlc>,
    extra: FlatValues,
}

#[async_trait]
impl CommunicationDriver for UnparseableNames {
    async fn connect(&self, endpoint: &str) -> DriverResult<()> {
        self.plc.connect(endpoint).await
    }

    async fn disconnect(&self) {
        self.plc.disconnect().await;
    }

    async fn is_connected(&self) -> bool {
        self.plc.is_connected().await
    }

    async fn add_read(&self, path: &str) -> DriverResult<()> {
        self.plc.add_read(path).await
    }

    async fn read_data(&self) -> DriverResult<FlatValues> {
        let mut values = self.plc.read_data().await?;
        values.extend(self.extra.clone());
        Ok(values)
    }

    async fn write_data(&self, values: &FlatValues) -> DriverResult<()> {
        self.plc.write_data(values).await
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_unparseable_names_are_skipped_and_reading_continues() {
    let plc = Arc::new(
        MockPlc::builder()
            .symbol("M.x", 0)
            .counters(["M.x"])
            .build(),
    );
    let extra = FlatValues::from([
        ("M..bad".to_string(), PlcValue::Int(1)),
        ("M.a[18446744073709551615]".to_string(), PlcValue::Int(2)),
    ]);
    let driver = Arc::new(UnparseableNames {
        plc: plc.clone(),
        extra,
    });
    let (tx, mut rx) = mpsc::unbounded_channel();
    let config = PlcConfig::new("PLC1")
        .with_enabled(true)
        .with_refresh_ms(10)
        .with_read_variables(["M.x"]);
    let runtime = PlcRuntime::spawn(&config, driver, Arc::new(tx)).unwrap();

    let mut data = 0;
    let events = wait_for(&mut rx, |e| {
        if e.as_data().is_some() {
            data += 1;
        }
        data == 3
    })
    .await;

    let messages = statuses(&events);
    assert!(messages
        .iter()
        .any(|m| m.starts_with("Invalid variable path 'M..bad': ")));
    assert!(messages
        .iter()
        .any(|m| m.starts_with("Invalid variable path 'M.a[18446744073709551615]': ")));

    let tree = events.last().and_then(|e| e.as_data()).unwrap().to_json();
    assert_eq!(tree.as_object().unwrap().len(), 1);
    assert_eq!(tree["M"].as_object().unwrap().len(), 1);
    assert!(tree["M"]["x"].as_i64().unwrap() >= 3);
    assert!(plc.read_cycles() >= 3);

    timeout(WAIT, runtime.stop()).await.unwrap();
    assert!(!plc.is_connected().await);
    let lifecycle: Vec<_> = drain(&mut rx).iter().filter_map(|e| e.as_lifecycle()).collect();
    assert_eq!(lifecycle, vec![LifecycleEvent::Disconnected]);
}
