use pixxel8_lib::booth::{BoothConfig, BoothMode, ConfigDecision};
use pixxel8_lib::flow::{FlowSnapshot, MachineEvent, MachineMode, MachineState};
use pixxel8_lib::gate::GateDecision;
use pixxel8_lib::settings::{KioskSettings, SettingsManager};
use pixxel8_lib::storage::{
    FileStore, KeyValueStore, MACHINE_STATE_KEY, MemoryStore, load_json, save_json,
};
use pixxel8_lib::sync::{BoothSync, SimulatedBackend, SyncOptions};
use pixxel8_lib::{Kiosk, KioskStatus};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn settings() -> KioskSettings {
    let mut settings = KioskSettings::default();
    settings.booth.booth_id = Some("booth-77".to_string());
    settings.booth.booth_name = Some("Airport T2".to_string());
    settings
}

fn file_settings(dir: &TempDir) -> KioskSettings {
    let mut settings = settings();
    settings.storage.dir = Some(dir.path().join("storage"));
    settings
}

fn event_config(grid: &str) -> BoothConfig {
    BoothConfig {
        mode: BoothMode::Event,
        active_grid_id: grid.to_string(),
        ..BoothConfig::default_for("booth-77")
    }
}

fn start_session(kiosk: &Kiosk) {
    kiosk.send(MachineEvent::Start).unwrap();
    kiosk.send(MachineEvent::SetupComplete).unwrap();
}

#[test]
fn test_session_tracks_flow() {
    let kiosk = Kiosk::with_store(Arc::new(MemoryStore::new()), &settings()).unwrap();

    // SETUP 还不是会话
    kiosk.send(MachineEvent::Start).unwrap();
    assert!(!kiosk.status().is_in_session);

    kiosk.send(MachineEvent::SetupComplete).unwrap();
    assert!(kiosk.status().is_in_session);
    assert!(!kiosk.grid().can_apply_immediately());

    kiosk.send(MachineEvent::CaptureComplete).unwrap();
    kiosk.send(MachineEvent::PaymentComplete).unwrap();
    kiosk.send(MachineEvent::PrintingComplete).unwrap();
    kiosk.send(MachineEvent::QrComplete).unwrap();
    assert_eq!(kiosk.flow().state(), MachineState::ThankYou);
    assert!(!kiosk.status().is_in_session);
}

#[test]
fn test_config_during_session_applies_at_thank_you() {
    let kiosk = Kiosk::with_store(Arc::new(MemoryStore::new()), &settings()).unwrap();
    start_session(&kiosk);

    // 1. 会话中提交两次，只保留最后一次
    assert_eq!(kiosk.propose_config(event_config("grid_2x2_classic")), ConfigDecision::Queued);
    assert_eq!(kiosk.propose_config(event_config("grid_3x2")), ConfigDecision::Queued);

    // 2. 会话中生效配置和流程模式不变
    let status = kiosk.status();
    assert!(status.has_pending_config);
    assert_eq!(status.active_grid_id.as_deref(), Some("single_portrait"));
    assert_eq!(status.context.mode, MachineMode::Normal);

    // 3. 拍摄完成后仍走支付
    assert_eq!(kiosk.send(MachineEvent::CaptureComplete), Ok(MachineState::Payment));
    kiosk.send(MachineEvent::PaymentComplete).unwrap();
    kiosk.send(MachineEvent::PrintingComplete).unwrap();
    kiosk.send(MachineEvent::SkipQr).unwrap();

    // 4. 进入致谢页，配置生效
    let status = kiosk.status();
    assert!(!status.has_pending_config);
    assert_eq!(status.active_grid_id.as_deref(), Some("grid_3x2"));
    assert_eq!(status.context.mode, MachineMode::Event);
    assert_eq!(kiosk.booth().active_config().unwrap().active_grid_id, "grid_3x2");

    // 5. 下一次会话跳过支付
    kiosk.send(MachineEvent::ThankYouComplete).unwrap();
    start_session(&kiosk);
    assert_eq!(kiosk.send(MachineEvent::CaptureComplete), Ok(MachineState::Printing));
}

#[test]
fn test_cancel_ends_session_and_promotes() {
    let kiosk = Kiosk::with_store(Arc::new(MemoryStore::new()), &settings()).unwrap();
    start_session(&kiosk);
    kiosk.propose_config(event_config("strip_4_vertical"));

    kiosk.send(MachineEvent::Cancel).unwrap();
    assert_eq!(kiosk.status().active_grid_id.as_deref(), Some("strip_4_vertical"));
    assert_eq!(kiosk.flow().context().mode, MachineMode::Event);
}

#[test]
fn test_error_keeps_session_until_reset() {
    let kiosk = Kiosk::with_store(Arc::new(MemoryStore::new()), &settings()).unwrap();
    start_session(&kiosk);
    kiosk.propose_config(event_config("grid_3x2"));

    kiosk.send(MachineEvent::error("camera disconnected")).unwrap();
    assert!(kiosk.status().is_in_session);
    assert!(kiosk.status().has_pending_config);

    kiosk.send(MachineEvent::Reset).unwrap();
    assert!(!kiosk.status().is_in_session);
    assert_eq!(kiosk.status().active_grid_id.as_deref(), Some("grid_3x2"));
}

#[test]
fn test_grid_switch_queued_in_session() {
    let kiosk = Kiosk::with_store(Arc::new(MemoryStore::new()), &settings()).unwrap();
    start_session(&kiosk);

    assert_eq!(kiosk.grid().set_active("split_2_vertical"), Ok(GateDecision::Queued));
    assert_eq!(kiosk.status().pending_grid_id.as_deref(), Some("split_2_vertical"));

    kiosk.reset();
    let status = kiosk.status();
    assert_eq!(status.active_grid_id.as_deref(), Some("split_2_vertical"));
    assert!(status.pending_grid_id.is_none());
}

#[test]
fn test_status_json_shape() {
    let kiosk = Kiosk::with_store(Arc::new(MemoryStore::new()), &settings()).unwrap();
    let status: KioskStatus = kiosk.status();

    let json = serde_json::to_value(&status).unwrap();
    assert_eq!(json["state"], "IDLE");
    assert_eq!(json["boothId"], "booth-77");
    assert_eq!(json["isInSession"], false);
    assert_eq!(json["activeGridId"], "single_portrait");
    assert_eq!(json["context"]["qrEnabled"], true);
}

#[test]
fn test_restart_mid_session_resumes() {
    let dir = TempDir::new().unwrap();
    let settings = file_settings(&dir);

    {
        let kiosk = Kiosk::open(&settings).unwrap();
        start_session(&kiosk);
        kiosk.propose_config(event_config("grid_3x2"));
    }

    // 重启后恢复到 CAPTURE，会话继续，排队配置仍在
    let kiosk = Kiosk::open(&settings).unwrap();
    let status = kiosk.status();
    assert_eq!(status.state, MachineState::Capture);
    assert!(status.is_in_session);
    assert!(status.has_pending_config);
    assert_eq!(status.active_grid_id.as_deref(), Some("single_portrait"));

    kiosk.send(MachineEvent::Cancel).unwrap();
    assert_eq!(kiosk.status().active_grid_id.as_deref(), Some("grid_3x2"));
}

#[test]
fn test_restart_after_stale_session_promotes_queued_config() {
    let dir = TempDir::new().unwrap();
    let settings = file_settings(&dir);

    {
        let kiosk = Kiosk::open(&settings).unwrap();
        start_session(&kiosk);
        let config = BoothConfig {
            price: 999,
            ..event_config("grid_3x2")
        };
        assert_eq!(kiosk.propose_config(config), ConfigDecision::Queued);
    }

    // 快照停留在 CAPTURE 已超过恢复窗口
    {
        let store = FileStore::open(dir.path().join("storage")).unwrap();
        let mut snapshot: FlowSnapshot = load_json(&store, MACHINE_STATE_KEY).unwrap().unwrap();
        assert_eq!(snapshot.state, MachineState::Capture);
        snapshot.timestamp -= 10 * 60 * 1000;
        save_json(&store, MACHINE_STATE_KEY, &snapshot).unwrap();
    }

    let kiosk = Kiosk::open(&settings).unwrap();
    let status = kiosk.status();
    assert_eq!(status.state, MachineState::Idle);
    assert!(!status.is_in_session);
    assert!(!status.has_pending_config);
    assert_eq!(status.active_grid_id.as_deref(), Some("grid_3x2"));
    assert_eq!(status.context.mode, MachineMode::Event);
    assert_eq!(kiosk.booth().active_config().unwrap().price, 999);

    // 下一位顾客按活动模式跳过支付
    start_session(&kiosk);
    assert_eq!(kiosk.send(MachineEvent::CaptureComplete), Ok(MachineState::Printing));
}

#[test]
fn test_restart_when_idle_applies_stored_config() {
    let dir = TempDir::new().unwrap();
    let settings = file_settings(&dir);

    {
        let kiosk = Kiosk::open(&settings).unwrap();
        assert_eq!(kiosk.propose_config(event_config("grid_3x2")), ConfigDecision::Applied);
    }

    let kiosk = Kiosk::open(&settings).unwrap();
    assert_eq!(kiosk.flow().context().mode, MachineMode::Event);
    assert_eq!(kiosk.grid().active_id().as_deref(), Some("grid_3x2"));
}

#[test]
fn test_identity_from_settings_is_write_once() {
    let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
    Kiosk::with_store(Arc::clone(&store), &settings()).unwrap();

    let mut other = settings();
    other.booth.booth_id = Some("booth-99".to_string());
    let kiosk = Kiosk::with_store(store, &other).unwrap();
    assert_eq!(kiosk.booth().booth_id().as_deref(), Some("booth-77"));
}

#[test]
fn test_open_with_settings_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("settings.json");
    SettingsManager::save_to(&path, &file_settings(&dir)).unwrap();

    let loaded = SettingsManager::load_from(&path).unwrap();
    let kiosk = Kiosk::open(&loaded).unwrap();
    assert_eq!(kiosk.booth().booth_id().as_deref(), Some("booth-77"));
    assert!(dir.path().join("storage").is_dir());
}

#[test]
fn test_detach_stops_session_tracking() {
    let kiosk = Kiosk::with_store(Arc::new(MemoryStore::new()), &settings()).unwrap();
    assert!(kiosk.detach());
    assert!(!kiosk.detach());

    start_session(&kiosk);
    assert!(!kiosk.status().is_in_session);
}

#[tokio::test(start_paused = true)]
async fn test_sync_through_kiosk_moves_grid() {
    let kiosk = Arc::new(Kiosk::with_store(Arc::new(MemoryStore::new()), &settings()).unwrap());
    let backend = Arc::new(SimulatedBackend::new());
    backend.push_config(event_config("grid_2x2_classic"));

    let sync = BoothSync::start(
        Arc::clone(&backend),
        Arc::clone(&kiosk),
        SyncOptions::default(),
    );
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert_eq!(kiosk.grid().active_id().as_deref(), Some("grid_2x2_classic"));
    assert_eq!(kiosk.flow().context().mode, MachineMode::Event);
    assert_eq!(backend.heartbeats().len(), 1);

    sync.shutdown().await;
}
