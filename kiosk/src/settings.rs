//! 展台运行设置
//!
//! 提供设置的加载、保存和管理功能
//!
//! # 设置文件位置
//!
//! 优先使用环境变量 `PIXXEL8_CONFIG` 指定的路径，否则为
//! `<config_dir>/pixxel8/settings.json`：
//!
//! - Windows: `%APPDATA%/pixxel8/settings.json`
//! - macOS: `~/Library/Application Support/pixxel8/settings.json`
//! - Linux: `~/.config/pixxel8/settings.json`
//!
//! # 使用示例
//!
//! ```no_run
//! use pixxel8_lib::settings::SettingsManager;
//!
//! let mut settings = SettingsManager::load()?;
//! settings.idle.timeout_secs = 90;
//! SettingsManager::save(&settings)?;
//! # Ok::<(), pixxel8_lib::settings::SettingsError>(())
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::flow::{MachineContext, MachineMode};
use crate::idle::IdleOptions;
use crate::sync::SyncOptions;

/// 覆盖设置文件路径的环境变量
pub const CONFIG_ENV_VAR: &str = "PIXXEL8_CONFIG";

/// 应用目录名
const APP_DIR: &str = "pixxel8";

/// 设置错误类型
#[derive(Error, Debug)]
pub enum SettingsError {
    /// IO 错误
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON 序列化/反序列化错误
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// 路径错误
    #[error("Path error: {0}")]
    Path(String),

    /// 设置值无效
    #[error("Invalid setting: {0}")]
    Invalid(String),
}

/// 设置结果类型
pub type SettingsResult<T> = Result<T, SettingsError>;

/// 展台运行设置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KioskSettings {
    /// 存储设置
    pub storage: StorageSettings,
    /// 首次启动的展台身份
    pub booth: BoothSettings,
    /// 流程设置
    pub flow: FlowSettings,
    /// 后台同步设置
    pub sync: SyncSettings,
    /// 空闲超时设置
    pub idle: IdleSettings,
    /// 日志设置
    pub logging: LoggingSettings,
}

impl KioskSettings {
    /// 检查设置值
    pub fn validate(&self) -> SettingsResult<()> {
        if self.sync.heartbeat_interval_secs == 0 || self.sync.config_poll_interval_secs == 0 {
            return Err(SettingsError::Invalid(
                "sync intervals must be at least 1 second".to_string(),
            ));
        }
        if self.idle.timeout_secs == 0 {
            return Err(SettingsError::Invalid(
                "idle timeout must be at least 1 second".to_string(),
            ));
        }
        Ok(())
    }
}

/// 存储设置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// 状态文件目录（None 表示 `<data_dir>/pixxel8/storage`）
    pub dir: Option<PathBuf>,
}

impl StorageSettings {
    /// 解析存储目录
    pub fn resolve_dir(&self) -> SettingsResult<PathBuf> {
        if let Some(dir) = &self.dir {
            return Ok(dir.clone());
        }
        dirs::data_dir()
            .map(|dir| dir.join(APP_DIR).join("storage"))
            .ok_or_else(|| SettingsError::Path("no data directory on this platform".to_string()))
    }
}

/// 展台身份设置，仅在尚未注册时使用
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoothSettings {
    pub booth_id: Option<String>,
    pub booth_name: Option<String>,
    pub hardware_id: Option<String>,
}

/// 流程设置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowSettings {
    /// 初始模式
    pub mode: MachineMode,
    /// 是否显示二维码界面
    pub qr_enabled: bool,
}

impl Default for FlowSettings {
    fn default() -> Self {
        Self {
            mode: MachineMode::Normal,
            qr_enabled: true,
        }
    }
}

impl FlowSettings {
    /// 无快照可恢复时的初始上下文
    pub fn initial_context(&self) -> MachineContext {
        MachineContext::new(self.mode, self.qr_enabled)
    }
}

/// 后台同步设置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// 是否启用后台同步
    pub enabled: bool,
    /// 心跳间隔（秒）
    pub heartbeat_interval_secs: u64,
    /// 配置轮询间隔（秒）
    pub config_poll_interval_secs: u64,
    /// 单次请求超时（秒）
    pub request_timeout_secs: u64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            heartbeat_interval_secs: 30,
            config_poll_interval_secs: 60,
            request_timeout_secs: 10,
        }
    }
}

impl SyncSettings {
    /// 转换为同步任务参数
    pub fn options(&self) -> SyncOptions {
        SyncOptions {
            heartbeat_interval: Duration::from_secs(self.heartbeat_interval_secs),
            config_poll_interval: Duration::from_secs(self.config_poll_interval_secs),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
        }
    }
}

/// 空闲超时设置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdleSettings {
    /// 是否启用空闲超时
    pub enabled: bool,
    /// 超时时间（秒）
    pub timeout_secs: u64,
    /// 超时前警告时间（秒）
    pub warning_secs: u64,
}

impl Default for IdleSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_secs: 120,
            warning_secs: 30,
        }
    }
}

impl IdleSettings {
    /// 转换为监视器参数
    pub fn options(&self) -> IdleOptions {
        IdleOptions {
            timeout: Duration::from_secs(self.timeout_secs),
            warning: Duration::from_secs(self.warning_secs),
        }
    }
}

/// 日志设置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// 日志过滤规则，`RUST_LOG` 优先
    pub filter: Option<String>,
}

/// 设置管理器
pub struct SettingsManager;

impl SettingsManager {
    /// 加载设置，文件不存在时返回默认设置
    pub fn load() -> SettingsResult<KioskSettings> {
        Self::load_from(&Self::settings_path()?)
    }

    /// 从指定路径加载设置
    pub fn load_from(path: &Path) -> SettingsResult<KioskSettings> {
        tracing::debug!(path = %path.display(), "Loading settings");

        if !path.exists() {
            tracing::info!("Settings file not found, using defaults");
            return Ok(KioskSettings::default());
        }

        let content = std::fs::read_to_string(path)?;
        let settings: KioskSettings = serde_json::from_str(&content)?;
        settings.validate()?;
        tracing::info!(path = %path.display(), "Settings loaded successfully");
        Ok(settings)
    }

    /// 保存设置
    pub fn save(settings: &KioskSettings) -> SettingsResult<()> {
        Self::save_to(&Self::settings_path()?, settings)
    }

    /// 保存设置到指定路径
    pub fn save_to(path: &Path, settings: &KioskSettings) -> SettingsResult<()> {
        settings.validate()?;
        tracing::debug!(path = %path.display(), "Saving settings");

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let content = serde_json::to_string_pretty(settings)?;
        std::fs::write(path, content)?;

        tracing::info!(path = %path.display(), "Settings saved successfully");
        Ok(())
    }

    /// 重置为默认设置并保存
    pub fn reset() -> SettingsResult<KioskSettings> {
        Self::reset_at(&Self::settings_path()?)
    }

    /// 在指定路径重置为默认设置
    pub fn reset_at(path: &Path) -> SettingsResult<KioskSettings> {
        let settings = KioskSettings::default();
        Self::save_to(path, &settings)?;
        tracing::info!("Settings reset to defaults");
        Ok(settings)
    }

    /// 设置文件路径
    pub fn settings_path() -> SettingsResult<PathBuf> {
        if let Some(path) = std::env::var_os(CONFIG_ENV_VAR) {
            return Ok(PathBuf::from(path));
        }
        dirs::config_dir()
            .map(|dir| dir.join(APP_DIR).join("settings.json"))
            .ok_or_else(|| SettingsError::Path("no config directory on this platform".to_string()))
    }
}

/// 全局设置
///
/// 使用 ArcSwap 实现无锁读取
pub struct GlobalSettings {
    settings: ArcSwap<KioskSettings>,
}

impl GlobalSettings {
    /// 创建全局设置
    pub fn new(settings: KioskSettings) -> Self {
        Self {
            settings: ArcSwap::new(Arc::new(settings)),
        }
    }

    /// 获取当前设置
    pub fn get(&self) -> Arc<KioskSettings> {
        self.settings.load_full()
    }

    /// 替换设置
    pub fn update(&self, settings: KioskSettings) {
        self.settings.store(Arc::new(settings));
    }

    /// 修改部分设置
    pub fn modify(&self, f: impl FnOnce(&mut KioskSettings)) {
        let mut settings = (*self.settings.load_full()).clone();
        f(&mut settings);
        self.settings.store(Arc::new(settings));
    }
}

impl Default for GlobalSettings {
    fn default() -> Self {
        Self::new(KioskSettings::default())
    }
}
