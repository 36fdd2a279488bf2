/// Background synchronisation with the booth management backend
///
/// This module sends periodic heartbeats and polls for configuration
/// pushed by an administrator. Fetched configs go through the session-safe
/// proposal path, so they are queued while a customer session is running.

/// Backend abstraction and the simulated backend
pub mod backend;

/// Sync error types
pub mod error;

/// Periodic heartbeat and config polling tasks
pub mod tasks;

// Re-export commonly used types
pub use backend::{BoothBackend, SimulatedBackend};
pub use error::{SyncError, SyncResult};
pub use tasks::{
    BoothSync, DEFAULT_CONFIG_POLL_INTERVAL, DEFAULT_HEARTBEAT_INTERVAL, DEFAULT_REQUEST_TIMEOUT,
    SyncOptions, SyncTarget, check_pending_config, send_heartbeat,
};
