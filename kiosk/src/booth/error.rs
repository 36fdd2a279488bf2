use thiserror::Error;

/// 展台相关错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BoothError {
    /// 展台身份已设置，不能改为其他 ID
    #[error("Booth identity already set to '{existing}', refusing '{requested}'")]
    IdentityAlreadySet { existing: String, requested: String },

    /// 身份字段无效
    #[error("Invalid booth identity: {0}")]
    InvalidIdentity(String),

    /// 尚未完成首次安装
    #[error("Booth is not registered")]
    NotRegistered,
}

/// 展台模块的结果类型
pub type BoothResult<T> = Result<T, BoothError>;
