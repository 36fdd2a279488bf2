use thiserror::Error;

use super::state::{MachineEventKind, MachineState};

/// 流程状态机错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FlowError {
    /// 当前状态下事件没有对应的转换
    #[error("No transition for {state} -> {event}")]
    NoTransition {
        state: MachineState,
        event: MachineEventKind,
    },

    /// 无法识别的事件名称
    #[error("Unknown event: {0:?}")]
    UnknownEvent(String),

    /// 会话进行中不能修改流程上下文
    #[error("Flow context is locked during a session (state {0})")]
    SessionLocked(MachineState),
}

/// 流程模块的结果类型
pub type FlowResult<T> = Result<T, FlowError>;
