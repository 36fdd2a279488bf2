//! 照片模板目录模块
//!
//! 管理打印模板（槽位布局、价格、张数），当前模板的切换与展台配置一样受会话保护
//!
//! # 模块结构
//!
//! - `template` - 模板数据类型、校验和内置模板
//! - `catalog` - `GridCatalog`：模板增删改、当前模板切换与持久化
//! - `error` - 模板相关错误类型

mod catalog;
mod error;
mod template;

pub use catalog::GridCatalog;
pub use error::{GridError, GridResult};
pub use template::{
    AspectRatio, GridLogo, GridSlot, GridTemplate, GridTemplateUpdate, PreviewType,
    builtin_templates,
};
