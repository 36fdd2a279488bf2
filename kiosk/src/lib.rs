/// Persistent key-value storage
pub mod storage;

/// Booth flow state machine
pub mod flow;

/// Session-safe value gate
pub mod gate;

/// Booth identity and configuration
pub mod booth;

/// Grid template catalog
pub mod grid;

/// Flow-to-session bridge
pub mod bridge;

/// Backend sync
pub mod sync;

/// Idle timeout
pub mod idle;

/// Runtime settings
pub mod settings;

/// Kiosk wiring
pub mod kiosk;

/// Headless stdin driver
pub mod driver;

/// Utility modules
pub mod utils;

pub use driver::run;
pub use kiosk::{Kiosk, KioskStatus};
