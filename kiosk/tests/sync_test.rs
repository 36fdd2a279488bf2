use pixxel8_lib::booth::{BoothConfig, BoothIdentity, BoothMode, BoothStore, ConfigDecision};
use pixxel8_lib::storage::MemoryStore;
use pixxel8_lib::sync::{
    BoothSync, SimulatedBackend, SyncError, SyncOptions, check_pending_config, send_heartbeat,
};
use std::sync::Arc;
use std::time::Duration;

fn registered() -> Arc<BoothStore> {
    let store = BoothStore::open(Arc::new(MemoryStore::new()));
    store
        .register(BoothIdentity::new("booth-9", "Food Court"))
        .unwrap();
    Arc::new(store)
}

fn options() -> SyncOptions {
    SyncOptions {
        heartbeat_interval: Duration::from_secs(30),
        config_poll_interval: Duration::from_secs(60),
        request_timeout: Duration::from_secs(10),
    }
}

fn event_config() -> BoothConfig {
    BoothConfig {
        mode: BoothMode::Event,
        active_grid_id: "grid_3x2".to_string(),
        ..BoothConfig::default_for("booth-9")
    }
}

#[tokio::test(start_paused = true)]
async fn test_heartbeat_schedule() {
    let backend = Arc::new(SimulatedBackend::new());
    let store = registered();

    let sync = BoothSync::start(Arc::clone(&backend), Arc::clone(&store), options());
    assert!(sync.is_running());

    // t0 与 t30 各一次
    tokio::time::sleep(Duration::from_secs(31)).await;
    assert_eq!(backend.heartbeats().len(), 2);
    assert!(backend.heartbeats().iter().all(|h| h.booth_id == "booth-9"));

    sync.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_polled_config_applied_outside_session() {
    let backend = Arc::new(SimulatedBackend::new());
    let store = registered();
    let sync = BoothSync::start(Arc::clone(&backend), Arc::clone(&store), options());

    // 1. 首次轮询在 t0 已经完成
    tokio::time::sleep(Duration::from_secs(1)).await;
    backend.push_config(event_config());

    // 2. t60 的轮询拿到配置
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(backend.queued_configs(), 0);
    assert_eq!(store.active_config().unwrap().mode, BoothMode::Event);

    sync.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_polled_config_queued_in_session() {
    let backend = Arc::new(SimulatedBackend::new());
    let store = registered();
    store.on_session_start();
    backend.push_config(event_config());

    let sync = BoothSync::start(Arc::clone(&backend), Arc::clone(&store), options());
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert_eq!(store.active_config().unwrap().mode, BoothMode::Normal);
    assert_eq!(store.pending_config().unwrap().active_grid_id, "grid_3x2");

    store.on_session_end();
    assert_eq!(store.active_config().unwrap().mode, BoothMode::Event);

    sync.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_late_response_ignored_after_stop() {
    let backend = Arc::new(SimulatedBackend::new().with_latency(Duration::from_secs(5)));
    let store = registered();
    backend.push_config(event_config());

    let mut sync = BoothSync::start(Arc::clone(&backend), Arc::clone(&store), options());

    // 心跳在 t5 完成，配置请求在 t5..t10 之间进行
    tokio::time::sleep(Duration::from_secs(7)).await;
    sync.stop().await;
    sync.shutdown().await;

    assert_eq!(backend.queued_configs(), 0);
    assert_eq!(store.active_config().unwrap().mode, BoothMode::Normal);
    assert!(!store.has_pending_changes());
}

#[tokio::test(start_paused = true)]
async fn test_drop_stops_task() {
    let backend = Arc::new(SimulatedBackend::new());
    let store = registered();

    let sync = BoothSync::start(Arc::clone(&backend), Arc::clone(&store), options());
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(backend.heartbeats().len(), 1);

    drop(sync);
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(backend.heartbeats().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_offline_backend_keeps_running() {
    let backend = Arc::new(SimulatedBackend::new());
    backend.set_offline(true);
    let store = registered();

    let sync = BoothSync::start(Arc::clone(&backend), Arc::clone(&store), options());
    tokio::time::sleep(Duration::from_secs(31)).await;
    assert!(backend.heartbeats().is_empty());
    assert!(sync.is_running());

    backend.set_offline(false);
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(backend.heartbeats().len(), 1);

    sync.shutdown().await;
}

#[tokio::test]
async fn test_on_demand_requests() {
    let backend = SimulatedBackend::new();
    let store = registered();

    send_heartbeat(&backend, store.as_ref(), Duration::from_secs(1))
        .await
        .unwrap();
    assert_eq!(backend.heartbeats().len(), 1);

    backend.push_config(event_config());
    let decision = check_pending_config(&backend, store.as_ref(), Duration::from_secs(1))
        .await
        .unwrap();
    assert_eq!(decision, Some(ConfigDecision::Applied));

    // 其他展台的配置不会被取走
    backend.push_config(BoothConfig::default_for("booth-1"));
    let decision = check_pending_config(&backend, store.as_ref(), Duration::from_secs(1))
        .await
        .unwrap();
    assert_eq!(decision, None);
    assert_eq!(backend.queued_configs(), 1);
}

#[tokio::test]
async fn test_unregistered_booth_skips_sync() {
    let backend = SimulatedBackend::new();
    let store = BoothStore::open(Arc::new(MemoryStore::new()));

    let result = check_pending_config(&backend, &store, Duration::from_secs(1)).await;
    assert_eq!(result, Err(SyncError::NotRegistered));
}
