use thiserror::Error;

/// 模板目录错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GridError {
    /// 模板不存在
    #[error("Grid template '{0}' not found")]
    NotFound(String),

    /// 模板 ID 重复
    #[error("Grid template '{0}' already exists")]
    DuplicateId(String),

    /// 模板内容无效
    #[error("Invalid grid template '{id}': {reason}")]
    Invalid { id: String, reason: String },

    /// 模板已禁用，不能设为当前模板
    #[error("Grid template '{0}' is disabled")]
    Disabled(String),

    /// 会话进行中，当前模板被锁定
    #[error("Grid template '{0}' is in use by the current session")]
    ActiveLocked(String),
}

/// 模板模块的结果类型
pub type GridResult<T> = Result<T, GridError>;
