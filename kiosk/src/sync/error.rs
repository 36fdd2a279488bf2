/// Sync error types
///
/// Errors raised while talking to the booth management backend.

use thiserror::Error;

/// Backend communication errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// Backend could not be reached
    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    /// Request did not complete in time
    #[error("Backend request timed out after {0}ms")]
    Timeout(u64),

    /// Backend answered with an error
    #[error("Backend error: {0}")]
    Server(String),

    /// Booth has no identity yet, nothing to sync
    #[error("Booth is not registered")]
    NotRegistered,
}

/// Result type for sync operations
pub type SyncResult<T> = Result<T, SyncError>;

impl SyncError {
    /// Whether retrying on the next tick may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Timeout(_))
    }
}
