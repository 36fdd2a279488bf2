/// Backend abstraction for heartbeat and config delivery
///
/// `BoothBackend` is the seam between the kiosk and whatever management
/// service it reports to. `SimulatedBackend` is an in-process implementation
/// used by the headless driver and by tests.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::debug;

use crate::booth::{BoothConfig, BoothHeartbeat};
use crate::sync::error::{SyncError, SyncResult};

/// Booth management backend
///
/// Implementations must be safe to call from a background task.
pub trait BoothBackend: Send + Sync + 'static {
    /// Report booth liveness
    fn send_heartbeat(&self, heartbeat: BoothHeartbeat) -> impl Future<Output = SyncResult<()>> + Send;

    /// Fetch a configuration pushed for this booth, if any
    fn check_pending_config(
        &self,
        booth_id: &str,
    ) -> impl Future<Output = SyncResult<Option<BoothConfig>>> + Send;
}

/// In-process backend
///
/// Configs queued with [`SimulatedBackend::push_config`] are handed out one
/// per poll, in order. Heartbeats are recorded for inspection.
#[derive(Debug, Default)]
pub struct SimulatedBackend {
    configs: Mutex<VecDeque<BoothConfig>>,
    heartbeats: Mutex<Vec<BoothHeartbeat>>,
    offline: AtomicBool,
    latency: Duration,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SimulatedBackend {
    /// Create an online backend with no latency
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every response by `latency`
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Queue a config to be delivered on a later poll
    pub fn push_config(&self, config: BoothConfig) {
        lock(&self.configs).push_back(config);
    }

    /// Number of configs not yet delivered
    pub fn queued_configs(&self) -> usize {
        lock(&self.configs).len()
    }

    /// Heartbeats received so far
    pub fn heartbeats(&self) -> Vec<BoothHeartbeat> {
        lock(&self.heartbeats).clone()
    }

    /// Simulate losing connectivity
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    async fn round_trip(&self) -> SyncResult<()> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if self.offline.load(Ordering::SeqCst) {
            return Err(SyncError::Unavailable("simulated backend offline".to_string()));
        }
        Ok(())
    }
}

impl BoothBackend for SimulatedBackend {
    async fn send_heartbeat(&self, heartbeat: BoothHeartbeat) -> SyncResult<()> {
        self.round_trip().await?;
        debug!(booth_id = %heartbeat.booth_id, status = ?heartbeat.status, "Heartbeat received");
        lock(&self.heartbeats).push(heartbeat);
        Ok(())
    }

    async fn check_pending_config(&self, booth_id: &str) -> SyncResult<Option<BoothConfig>> {
        self.round_trip().await?;
        let mut configs = lock(&self.configs);
        let position = configs.iter().position(|c| c.booth_id == booth_id);
        Ok(position.and_then(|i| configs.remove(i)))
    }
}
