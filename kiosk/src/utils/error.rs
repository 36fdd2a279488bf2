//! 全局错误处理模块
//!
//! 提供统一的应用错误类型和面向顾客/运营人员的错误消息
//!
//! # 功能
//!
//! - 统一的 `AppError` 类型，聚合所有模块错误
//! - 可直接显示在展台屏幕上的错误消息
//! - 错误代码用于界面处理
//! - 错误恢复建议
//!
//! # 使用示例
//!
//! ```
//! use pixxel8_lib::grid::GridError;
//! use pixxel8_lib::utils::error::{AppError, ErrorCode};
//!
//! fn example() -> Result<(), AppError> {
//!     Err(GridError::NotFound("grid_9x9".to_string()).into())
//! }
//!
//! assert_eq!(example().unwrap_err().code(), ErrorCode::GridNotFound);
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::booth::BoothError;
use crate::flow::FlowError;
use crate::grid::GridError;
use crate::settings::SettingsError;
use crate::storage::StorageError;
use crate::sync::SyncError;

/// 应用错误类型
///
/// 聚合所有模块的错误类型，提供统一的错误处理接口
#[derive(Error, Debug)]
pub enum AppError {
    /// 流程错误
    #[error("Flow error: {0}")]
    Flow(#[from] FlowError),

    /// 存储错误
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// 展台错误
    #[error("Booth error: {0}")]
    Booth(#[from] BoothError),

    /// 模板错误
    #[error("Grid error: {0}")]
    Grid(#[from] GridError),

    /// 设置错误
    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),

    /// 同步错误
    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),
}

/// 错误代码
///
/// 用于界面识别和处理特定错误
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // 流程错误 (1xxx)
    /// 当前状态不接受该事件
    FlowInvalidTransition,
    /// 无法识别的事件
    FlowUnknownEvent,
    /// 会话中流程设置被锁定
    FlowSessionLocked,

    // 存储错误 (2xxx)
    /// 读写失败
    StorageIoFailed,
    /// 数据格式错误
    StorageCorrupted,
    /// 存储不可用
    StorageUnavailable,

    // 展台错误 (3xxx)
    /// 展台尚未注册
    BoothNotRegistered,
    /// 身份已设置
    BoothIdentityLocked,
    /// 身份无效
    BoothInvalidIdentity,

    // 模板错误 (4xxx)
    /// 模板不存在
    GridNotFound,
    /// 模板无效
    GridInvalid,
    /// 会话中模板被锁定
    GridLocked,

    // 设置错误 (5xxx)
    /// 设置加载失败
    SettingsLoadFailed,
    /// 设置无效
    SettingsInvalid,

    // 同步错误 (6xxx)
    /// 后台不可达
    SyncUnavailable,
    /// 后台请求超时
    SyncTimeout,
    /// 后台返回错误
    SyncServerError,
}

/// 错误上下文信息
///
/// 提供可显示的错误信息和恢复建议
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorContext {
    /// 错误代码
    pub code: ErrorCode,
    /// 可显示的错误消息
    pub message: String,
    /// 详细错误信息（用于日志）
    pub detail: Option<String>,
    /// 恢复建议
    pub recovery_hint: Option<String>,
    /// 是否可恢复
    pub recoverable: bool,
}

impl ErrorContext {
    /// 创建新的错误上下文
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            detail: None,
            recovery_hint: None,
            recoverable: true,
        }
    }

    /// 设置详细信息
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// 设置恢复建议
    pub fn with_recovery_hint(mut self, hint: impl Into<String>) -> Self {
        self.recovery_hint = Some(hint.into());
        self
    }

    /// 标记为不可恢复
    pub fn not_recoverable(mut self) -> Self {
        self.recoverable = false;
        self
    }
}

impl AppError {
    /// 获取错误代码
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Flow(FlowError::NoTransition { .. }) => ErrorCode::FlowInvalidTransition,
            AppError::Flow(FlowError::UnknownEvent(_)) => ErrorCode::FlowUnknownEvent,
            AppError::Flow(FlowError::SessionLocked(_)) => ErrorCode::FlowSessionLocked,

            AppError::Storage(StorageError::Json(_)) => ErrorCode::StorageCorrupted,
            AppError::Storage(StorageError::Unavailable(_)) => ErrorCode::StorageUnavailable,
            AppError::Storage(_) => ErrorCode::StorageIoFailed,

            AppError::Booth(BoothError::NotRegistered) => ErrorCode::BoothNotRegistered,
            AppError::Booth(BoothError::IdentityAlreadySet { .. }) => {
                ErrorCode::BoothIdentityLocked
            }
            AppError::Booth(BoothError::InvalidIdentity(_)) => ErrorCode::BoothInvalidIdentity,

            AppError::Grid(GridError::NotFound(_)) => ErrorCode::GridNotFound,
            AppError::Grid(GridError::ActiveLocked(_)) => ErrorCode::GridLocked,
            AppError::Grid(_) => ErrorCode::GridInvalid,

            AppError::Settings(SettingsError::Invalid(_) | SettingsError::Json(_)) => {
                ErrorCode::SettingsInvalid
            }
            AppError::Settings(_) => ErrorCode::SettingsLoadFailed,

            AppError::Sync(SyncError::Timeout(_)) => ErrorCode::SyncTimeout,
            AppError::Sync(SyncError::Server(_)) => ErrorCode::SyncServerError,
            AppError::Sync(SyncError::NotRegistered) => ErrorCode::BoothNotRegistered,
            AppError::Sync(_) => ErrorCode::SyncUnavailable,
        }
    }

    /// 获取可显示的错误消息
    pub fn user_message(&self) -> String {
        match self {
            AppError::Flow(FlowError::NoTransition { .. }) => {
                "That action isn't available right now".to_string()
            }
            AppError::Flow(FlowError::SessionLocked(_)) => {
                "Settings can't change while a customer is using the booth".to_string()
            }
            AppError::Flow(_) => "Unrecognised action".to_string(),

            AppError::Storage(StorageError::Json(_)) => {
                "Saved booth data is damaged and was ignored".to_string()
            }
            AppError::Storage(_) => "Booth data could not be saved".to_string(),

            AppError::Booth(BoothError::NotRegistered) => {
                "This booth has not been set up yet".to_string()
            }
            AppError::Booth(BoothError::IdentityAlreadySet { existing, .. }) => {
                format!("This booth is already registered as {}", existing)
            }
            AppError::Booth(BoothError::InvalidIdentity(reason)) => {
                format!("Booth details are incomplete: {}", reason)
            }

            AppError::Grid(GridError::NotFound(id)) => format!("Layout {} does not exist", id),
            AppError::Grid(GridError::Disabled(id)) => format!("Layout {} is turned off", id),
            AppError::Grid(GridError::ActiveLocked(_)) => {
                "The current layout is in use by a customer".to_string()
            }
            AppError::Grid(_) => "Layout is not valid".to_string(),

            AppError::Settings(_) => "Kiosk settings could not be loaded".to_string(),

            AppError::Sync(SyncError::NotRegistered) => {
                "This booth has not been set up yet".to_string()
            }
            AppError::Sync(_) => "Booth is offline".to_string(),
        }
    }

    /// 获取完整的错误上下文
    pub fn context(&self) -> ErrorContext {
        let mut ctx = ErrorContext::new(self.code(), self.user_message()).with_detail(self.to_string());
        ctx.recovery_hint = self.recovery_hint();

        if !self.is_recoverable() {
            ctx = ctx.not_recoverable();
        }
        ctx
    }

    /// 获取恢复建议
    pub fn recovery_hint(&self) -> Option<String> {
        match self {
            AppError::Flow(FlowError::NoTransition { .. }) => {
                Some("Finish the current step or cancel to start over".to_string())
            }
            AppError::Booth(BoothError::NotRegistered) | AppError::Sync(SyncError::NotRegistered) => {
                Some("Set booth id and name in the kiosk settings".to_string())
            }
            AppError::Grid(GridError::ActiveLocked(_))
            | AppError::Flow(FlowError::SessionLocked(_)) => {
                Some("Try again after the current session ends".to_string())
            }
            AppError::Sync(SyncError::Unavailable(_) | SyncError::Timeout(_)) => {
                Some("Check the network connection; sync retries automatically".to_string())
            }
            AppError::Storage(_) => Some("Check free disk space and permissions".to_string()),
            _ => None,
        }
    }

    /// 检查错误是否可恢复
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            AppError::Settings(_)
                | AppError::Booth(BoothError::IdentityAlreadySet { .. })
                | AppError::Storage(StorageError::Unavailable(_))
        )
    }

    /// 检查是否是非法状态转换
    pub fn is_invalid_transition(&self) -> bool {
        matches!(self, AppError::Flow(FlowError::NoTransition { .. }))
    }
}

/// 应用结果类型
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::{MachineEventKind, MachineState};

    fn no_transition() -> AppError {
        AppError::Flow(FlowError::NoTransition {
            state: MachineState::Idle,
            event: MachineEventKind::PrintingComplete,
        })
    }

    #[test]
    fn test_error_code() {
        assert_eq!(no_transition().code(), ErrorCode::FlowInvalidTransition);

        let err = AppError::Grid(GridError::ActiveLocked("grid_3x2".to_string()));
        assert_eq!(err.code(), ErrorCode::GridLocked);

        let err = AppError::Sync(SyncError::Timeout(10_000));
        assert_eq!(err.code(), ErrorCode::SyncTimeout);

        let err = AppError::Booth(BoothError::NotRegistered);
        assert_eq!(err.code(), ErrorCode::BoothNotRegistered);
    }

    #[test]
    fn test_user_message() {
        let err = AppError::Grid(GridError::NotFound("grid_9x9".to_string()));
        assert!(err.user_message().contains("grid_9x9"));

        let err = AppError::Booth(BoothError::IdentityAlreadySet {
            existing: "booth-1".to_string(),
            requested: "booth-2".to_string(),
        });
        assert!(err.user_message().contains("booth-1"));
    }

    #[test]
    fn test_error_context() {
        let ctx = no_transition().context();

        assert_eq!(ctx.code, ErrorCode::FlowInvalidTransition);
        assert!(!ctx.message.is_empty());
        assert!(ctx.detail.unwrap().contains("PRINTING_COMPLETE"));
        assert!(ctx.recovery_hint.is_some());
        assert!(ctx.recoverable);
    }

    #[test]
    fn test_recoverable() {
        let err = AppError::Sync(SyncError::Unavailable("offline".to_string()));
        assert!(err.is_recoverable());

        let err = AppError::Settings(SettingsError::Invalid("idle timeout".to_string()));
        assert!(!err.is_recoverable());
        assert!(!err.context().recoverable);
    }

    #[test]
    fn test_invalid_transition_predicate() {
        assert!(no_transition().is_invalid_transition());
        assert!(!AppError::Sync(SyncError::Timeout(5000)).is_invalid_transition());
    }

    #[test]
    fn test_session_locked() {
        let err = AppError::Flow(FlowError::SessionLocked(MachineState::Capture));
        assert_eq!(err.code(), ErrorCode::FlowSessionLocked);
        assert!(err.is_recoverable());
        assert!(err.recovery_hint().is_some());
        assert!(!err.is_invalid_transition());
    }

    #[test]
    fn test_error_code_serialization() {
        let code = ErrorCode::GridNotFound;
        let json = serde_json::to_string(&code).unwrap();
        assert_eq!(json, "\"GRID_NOT_FOUND\"");

        let deserialized: ErrorCode = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, code);
    }

    #[test]
    fn test_error_context_serialization() {
        let ctx = ErrorContext::new(ErrorCode::SyncUnavailable, "Test message")
            .with_detail("Detailed error")
            .with_recovery_hint("Try again");

        let json = serde_json::to_string(&ctx).unwrap();
        assert!(json.contains("SYNC_UNAVAILABLE"));
        assert!(json.contains("Test message"));

        let deserialized: ErrorContext = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized.code, ErrorCode::SyncUnavailable);
    }
}
