//! 展台身份与会话安全配置模块
//!
//! # 模块结构
//!
//! - `types` - 身份、配置、心跳等数据类型
//! - `store` - `BoothStore`：身份、生效/排队配置、会话标志及持久化
//! - `error` - 展台相关错误类型

mod error;
mod store;
mod types;

pub use error::{BoothError, BoothResult};
pub use store::{BoothStore, ConfigDecision, SessionFlag};
pub use types::{
    BoothConfig, BoothConfigState, BoothHeartbeat, BoothIdentity, BoothMode, BoothStatus,
    BoothTheme, DEFAULT_GRID_ID, DEFAULT_PRICE,
};
