//! 展台流程状态机模块
//!
//! 约束自助机屏幕的合法顺序（空闲 → 设置 → 拍摄 → 支付 → 打印 → 二维码 → 致谢），
//! 并在每次变更后持久化快照，重启时恢复进行中的流程
//!
//! # 模块结构
//!
//! - `state` - 状态、事件、上下文定义和转换表
//! - `snapshot` - 持久化快照与恢复策略
//! - `machine` - `BoothFlow` 状态机实例和订阅者通知
//! - `error` - 流程相关错误类型

mod error;
mod machine;
mod snapshot;
mod state;

pub use error::{FlowError, FlowResult};
pub use machine::{BoothFlow, ChangeCause, FlowChange, FlowStatus, Subscription};
pub use snapshot::{FlowSnapshot, RESTORE_WINDOW_MS, is_restorable};
pub use state::{
    ContextUpdate, MachineContext, MachineEvent, MachineEventKind, MachineMode, MachineState,
    can_transition, resolve, should_skip_payment, should_skip_qr,
};
