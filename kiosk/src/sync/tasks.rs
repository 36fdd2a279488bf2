/// Periodic heartbeat and config polling
///
/// `BoothSync` owns a background task that reports liveness and polls for
/// admin-pushed configuration. Both requests also exist as standalone
/// functions for callers that want to sync on demand.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::booth::{BoothConfig, BoothHeartbeat, BoothStore, ConfigDecision};
use crate::sync::backend::BoothBackend;
use crate::sync::error::{SyncError, SyncResult};

/// Default heartbeat period
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Default config poll period
pub const DEFAULT_CONFIG_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Default per-request timeout
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Timing of the sync task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncOptions {
    pub heartbeat_interval: Duration,
    pub config_poll_interval: Duration,
    pub request_timeout: Duration,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            config_poll_interval: DEFAULT_CONFIG_POLL_INTERVAL,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

/// Receiver of synced state
///
/// Implemented by `BoothStore` directly and by `Kiosk`, which also moves the
/// grid catalog and flow context along when a config is applied.
pub trait SyncTarget: Send + Sync + 'static {
    /// Current heartbeat, `None` while unregistered
    fn heartbeat(&self) -> Option<BoothHeartbeat>;

    /// Registered booth id
    fn booth_id(&self) -> Option<String>;

    /// Hand a fetched config to the session-safe proposal path
    fn propose_config(&self, config: BoothConfig) -> ConfigDecision;
}

impl SyncTarget for BoothStore {
    fn heartbeat(&self) -> Option<BoothHeartbeat> {
        BoothStore::heartbeat(self)
    }

    fn booth_id(&self) -> Option<String> {
        BoothStore::booth_id(self)
    }

    fn propose_config(&self, config: BoothConfig) -> ConfigDecision {
        BoothStore::propose_config(self, config)
    }
}

async fn with_timeout<T>(
    timeout: Duration,
    request: impl std::future::Future<Output = SyncResult<T>>,
) -> SyncResult<T> {
    tokio::time::timeout(timeout, request)
        .await
        .map_err(|_| SyncError::Timeout(timeout.as_millis() as u64))?
}

/// Send one heartbeat
///
/// # Errors
/// `SyncError::NotRegistered` before the booth has an identity, otherwise
/// whatever the backend reports.
pub async fn send_heartbeat<B, T>(backend: &B, target: &T, timeout: Duration) -> SyncResult<()>
where
    B: BoothBackend,
    T: SyncTarget + ?Sized,
{
    let heartbeat = target.heartbeat().ok_or(SyncError::NotRegistered)?;
    with_timeout(timeout, backend.send_heartbeat(heartbeat)).await
}

async fn fetch_config<B, T>(backend: &B, target: &T, timeout: Duration) -> SyncResult<Option<BoothConfig>>
where
    B: BoothBackend,
    T: SyncTarget + ?Sized,
{
    let booth_id = target.booth_id().ok_or(SyncError::NotRegistered)?;
    with_timeout(timeout, backend.check_pending_config(&booth_id)).await
}

/// Poll once for a pushed config and propose it
///
/// Returns the proposal outcome, or `None` when nothing was pending.
pub async fn check_pending_config<B, T>(
    backend: &B,
    target: &T,
    timeout: Duration,
) -> SyncResult<Option<ConfigDecision>>
where
    B: BoothBackend,
    T: SyncTarget + ?Sized,
{
    let config = fetch_config(backend, target, timeout).await?;
    Ok(config.map(|config| propose(target, config)))
}

fn propose<T: SyncTarget + ?Sized>(target: &T, config: BoothConfig) -> ConfigDecision {
    let decision = target.propose_config(config);
    match &decision {
        ConfigDecision::Applied => info!("Fetched config applied immediately"),
        ConfigDecision::Queued => info!("Fetched config queued until session ends"),
        ConfigDecision::Unchanged => debug!("Fetched config matches active config"),
        ConfigDecision::Rejected { reason } => warn!(reason = %reason, "Fetched config rejected"),
    }
    decision
}

/// Background sync handle
///
/// The task stops when [`BoothSync::stop`] is called or the handle is dropped.
/// A response that arrives after stopping is discarded.
pub struct BoothSync {
    /// Stop signal sender
    stop_tx: Option<mpsc::Sender<()>>,
    stopped: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl BoothSync {
    /// Spawn the sync task
    ///
    /// Both requests fire once immediately, then on their intervals.
    /// Must be called from within a tokio runtime.
    pub fn start<B, T>(backend: Arc<B>, target: Arc<T>, options: SyncOptions) -> Self
    where
        B: BoothBackend,
        T: SyncTarget + ?Sized,
    {
        let (stop_tx, mut stop_rx) = mpsc::channel::<()>(1);
        let stopped = Arc::new(AtomicBool::new(false));
        let task_stopped = Arc::clone(&stopped);

        let handle = tokio::spawn(async move {
            let mut heartbeat_tick = tokio::time::interval(options.heartbeat_interval);
            heartbeat_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut poll_tick = tokio::time::interval(options.config_poll_interval);
            poll_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;

                    _ = stop_rx.recv() => {
                        debug!("Booth sync stop signal received");
                        break;
                    }
                    _ = heartbeat_tick.tick() => {
                        match send_heartbeat(backend.as_ref(), target.as_ref(), options.request_timeout).await {
                            Ok(()) => debug!("Heartbeat sent"),
                            Err(SyncError::NotRegistered) => debug!("Heartbeat skipped: booth not registered"),
                            Err(e) => warn!(error = %e, "Heartbeat failed"),
                        }
                    }
                    _ = poll_tick.tick() => {
                        match fetch_config(backend.as_ref(), target.as_ref(), options.request_timeout).await {
                            Ok(Some(config)) => {
                                if task_stopped.load(Ordering::SeqCst) {
                                    debug!("Config arrived after sync stopped, ignoring");
                                    break;
                                }
                                propose(target.as_ref(), config);
                            }
                            Ok(None) => {}
                            Err(SyncError::NotRegistered) => debug!("Config check skipped: booth not registered"),
                            Err(e) => warn!(error = %e, "Config check failed"),
                        }
                    }
                }

                if task_stopped.load(Ordering::SeqCst) {
                    break;
                }
            }

            info!("Booth sync task finished");
        });

        info!(
            heartbeat_secs = options.heartbeat_interval.as_secs(),
            poll_secs = options.config_poll_interval.as_secs(),
            "Booth sync started"
        );

        Self {
            stop_tx: Some(stop_tx),
            stopped,
            handle: Some(handle),
        }
    }

    /// Whether the background task is still alive
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop the sync task
    pub async fn stop(&mut self) {
        self.stopped.store(true, Ordering::SeqCst);
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(()).await;
        }
    }

    /// Stop and wait for the task to exit
    pub async fn shutdown(mut self) {
        self.stop().await;
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                warn!(error = %e, "Booth sync task ended abnormally");
            }
        }
    }
}

impl Drop for BoothSync {
    fn drop(&mut self) {
        self.stopped.store(true, Ordering::SeqCst);
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.try_send(());
        }
    }
}
