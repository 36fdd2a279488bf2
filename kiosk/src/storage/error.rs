use thiserror::Error;

/// 持久化存储错误
#[derive(Error, Debug)]
pub enum StorageError {
    /// IO 错误
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON 序列化/反序列化错误
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// 非法的键名
    #[error("Invalid storage key: {0:?}")]
    InvalidKey(String),

    /// 存储后端不可用（锁中毒等）
    #[error("Storage backend unavailable: {0}")]
    Unavailable(String),
}

/// 存储模块的结果类型
pub type StorageResult<T> = Result<T, StorageError>;
