use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::{BoothError, BoothResult};
use crate::flow::MachineMode;

/// 新展台默认使用的模板
pub const DEFAULT_GRID_ID: &str = "single_portrait";

/// 新展台默认价格（INR）
pub const DEFAULT_PRICE: u32 = 50;

/// 展台运营模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoothMode {
    #[default]
    Normal,
    Event,
}

impl From<BoothMode> for MachineMode {
    fn from(mode: BoothMode) -> Self {
        match mode {
            BoothMode::Normal => MachineMode::Normal,
            BoothMode::Event => MachineMode::Event,
        }
    }
}

/// 展台运行状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BoothStatus {
    Online,
    #[default]
    Offline,
    InSession,
    Error,
}

/// 界面主题
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BoothTheme {
    #[default]
    DarkPremium,
}

/// 展台身份
///
/// 首次安装时创建，之后不可修改
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoothIdentity {
    pub booth_id: String,
    pub booth_name: String,
    pub install_date: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hardware_id: Option<String>,
}

impl BoothIdentity {
    /// 以当前时间作为安装日期创建身份
    pub fn new(booth_id: impl Into<String>, booth_name: impl Into<String>) -> Self {
        Self {
            booth_id: booth_id.into(),
            booth_name: booth_name.into(),
            install_date: Utc::now(),
            hardware_id: None,
        }
    }

    /// 设置硬件指纹
    pub fn with_hardware_id(mut self, hardware_id: impl Into<String>) -> Self {
        self.hardware_id = Some(hardware_id.into());
        self
    }

    /// 校验必填字段
    pub fn validate(&self) -> BoothResult<()> {
        if self.booth_id.trim().is_empty() {
            return Err(BoothError::InvalidIdentity("booth id is empty".to_string()));
        }
        if self.booth_name.trim().is_empty() {
            return Err(BoothError::InvalidIdentity("booth name is empty".to_string()));
        }
        Ok(())
    }
}

/// 展台配置快照
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoothConfig {
    pub booth_id: String,
    pub mode: BoothMode,
    pub active_grid_id: String,
    /// 每次打印价格（INR）
    pub price: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_prints: Option<u32>,
    #[serde(default)]
    pub theme: BoothTheme,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_by: Option<String>,
}

impl BoothConfig {
    /// 新展台的默认配置
    pub fn default_for(booth_id: impl Into<String>) -> Self {
        Self {
            booth_id: booth_id.into(),
            mode: BoothMode::Normal,
            active_grid_id: DEFAULT_GRID_ID.to_string(),
            price: DEFAULT_PRICE,
            max_prints: None,
            theme: BoothTheme::DarkPremium,
            updated_at: Utc::now(),
            updated_by: None,
        }
    }
}

/// 持久化形式的配置状态
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoothConfigState {
    pub active_config: BoothConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_config: Option<BoothConfig>,
    #[serde(default)]
    pub has_pending_changes: bool,
}

/// 心跳（展台 → 后台）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoothHeartbeat {
    pub booth_id: String,
    pub status: BoothStatus,
    pub is_in_session: bool,
    pub timestamp: DateTime<Utc>,
}
