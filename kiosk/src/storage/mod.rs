//! 持久化键值存储模块
//!
//! 为状态机、展台配置和模板目录提供单键原子读写
//!
//! # 模块结构
//!
//! - `error` - 存储相关错误类型
//! - `kv` - `KeyValueStore` trait、JSON 辅助函数和内存实现
//! - `file` - 基于目录的文件实现（每个键一个 JSON 文件）

mod error;
mod file;
mod kv;

pub use error::{StorageError, StorageResult};
pub use file::FileStore;
pub use kv::{KeyValueStore, MemoryStore, load_json, save_json};

/// 状态机快照的存储键
pub const MACHINE_STATE_KEY: &str = "machine-fsm-state";

/// 展台身份与配置的存储键
pub const BOOTH_STORAGE_KEY: &str = "pixxel8-booth-storage";

/// 模板目录的存储键
pub const GRID_STORAGE_KEY: &str = "grid-storage";
