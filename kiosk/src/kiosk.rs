//! 自助机装配
//!
//! 显式构造存储、流程状态机、展台存储、模板目录和会话桥接，
//! 不使用任何全局单例

use std::sync::Arc;

use serde::Serialize;

use crate::booth::{
    BoothConfig, BoothError, BoothIdentity, BoothStatus, BoothStore, ConfigDecision,
};
use crate::bridge::{SessionBridge, apply_config};
use crate::flow::{
    BoothFlow, ContextUpdate, FlowError, FlowResult, MachineContext, MachineEvent,
    MachineEventKind, MachineState,
};
use crate::grid::GridCatalog;
use crate::settings::KioskSettings;
use crate::storage::{FileStore, KeyValueStore};
use crate::sync::SyncTarget;
use crate::utils::error::AppResult;

/// 自助机状态概览
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KioskStatus {
    pub state: MachineState,
    pub context: MachineContext,
    pub booth_id: Option<String>,
    pub booth_status: BoothStatus,
    pub is_in_session: bool,
    pub active_grid_id: Option<String>,
    pub pending_grid_id: Option<String>,
    pub has_pending_config: bool,
}

/// 自助机
pub struct Kiosk {
    flow: Arc<BoothFlow>,
    booth: Arc<BoothStore>,
    grid: Arc<GridCatalog>,
    bridge: SessionBridge,
}

impl Kiosk {
    /// 以文件存储打开自助机
    ///
    /// # Errors
    ///
    /// - 存储目录无法解析或创建
    /// - 设置中的展台身份无效
    pub fn open(settings: &KioskSettings) -> AppResult<Self> {
        let dir = settings.storage.resolve_dir()?;
        let store = FileStore::open(&dir)?;
        tracing::info!(dir = %dir.display(), "Kiosk storage opened");
        Self::with_store(Arc::new(store), settings)
    }

    /// 以给定存储打开自助机
    pub fn with_store(store: Arc<dyn KeyValueStore>, settings: &KioskSettings) -> AppResult<Self> {
        let flow = Arc::new(BoothFlow::open(
            Arc::clone(&store),
            settings.flow.initial_context(),
        ));
        let booth = Arc::new(BoothStore::open(Arc::clone(&store)));
        let grid = Arc::new(GridCatalog::open(store));

        Self::register_from_settings(&booth, settings)?;

        let bridge = SessionBridge::attach(Arc::clone(&flow), Arc::clone(&booth), Arc::clone(&grid));

        // 会话外启动时以展台的生效配置为准
        if !flow.state().is_in_session() {
            if let Some(config) = booth.active_config() {
                apply_config(&grid, &flow, &config);
            }
        }

        tracing::info!(
            state = %flow.state(),
            booth_id = ?booth.booth_id(),
            grid = ?grid.active_id(),
            "Kiosk ready"
        );

        Ok(Self {
            flow,
            booth,
            grid,
            bridge,
        })
    }

    fn register_from_settings(booth: &BoothStore, settings: &KioskSettings) -> AppResult<()> {
        let (Some(booth_id), Some(booth_name)) =
            (&settings.booth.booth_id, &settings.booth.booth_name)
        else {
            if !booth.has_identity() {
                tracing::warn!("Booth identity not configured, running unregistered");
            }
            return Ok(());
        };

        let mut identity = BoothIdentity::new(booth_id, booth_name);
        if let Some(hardware_id) = &settings.booth.hardware_id {
            identity = identity.with_hardware_id(hardware_id);
        }

        match booth.register(identity) {
            Ok(()) => Ok(()),
            Err(BoothError::IdentityAlreadySet { existing, requested }) => {
                tracing::warn!(
                    %existing,
                    %requested,
                    "Configured booth id differs from registered identity, keeping registered"
                );
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// 流程状态机
    pub fn flow(&self) -> &Arc<BoothFlow> {
        &self.flow
    }

    /// 展台存储
    pub fn booth(&self) -> &Arc<BoothStore> {
        &self.booth
    }

    /// 模板目录
    pub fn grid(&self) -> &Arc<GridCatalog> {
        &self.grid
    }

    /// 发送流程事件
    pub fn send(&self, event: MachineEvent) -> FlowResult<MachineState> {
        self.flow.send(event)
    }

    /// 按事件名发送事件，例如 `setup_complete`
    pub fn dispatch(&self, name: &str, message: Option<String>) -> FlowResult<MachineState> {
        let kind: MachineEventKind = name.parse()?;
        self.flow.send(MachineEvent::from_kind(kind, message))
    }

    /// 重置流程
    pub fn reset(&self) {
        self.flow.reset();
    }

    /// 提交展台配置
    ///
    /// 立即生效时同步切换模板和流程模式，期间会话不会开始
    pub fn propose_config(&self, config: BoothConfig) -> ConfigDecision {
        let _guard = self.bridge.hold();
        let decision = self.booth.propose_config(config.clone());
        if decision.is_applied() {
            apply_config(&self.grid, &self.flow, &config);
        }
        decision
    }

    /// 操作员修改流程上下文
    ///
    /// 会话进行中拒绝修改，返回是否有字段变化
    ///
    /// # Errors
    ///
    /// 会话进行中返回 [`FlowError::SessionLocked`]
    pub fn update_context(&self, update: ContextUpdate) -> FlowResult<bool> {
        let _guard = self.bridge.hold();
        if self.booth.is_in_session() {
            let state = self.flow.state();
            tracing::warn!(%state, "Context change rejected during session");
            return Err(FlowError::SessionLocked(state));
        }
        Ok(self.flow.update_context(update))
    }

    /// 响应空闲超时
    ///
    /// 可取消的界面取消回到空闲；二维码和致谢界面直接完成；
    /// 打印中和空闲时不处理。返回新状态
    pub fn handle_idle_timeout(&self) -> Option<MachineState> {
        let state = self.flow.state();
        let event = match state {
            MachineState::Idle | MachineState::Printing => return None,
            MachineState::Qr => MachineEvent::SkipQr,
            MachineState::ThankYou => MachineEvent::ThankYouComplete,
            _ if self.flow.can_transition(MachineEventKind::Cancel) => MachineEvent::Cancel,
            _ => {
                self.flow.reset();
                return Some(MachineState::Idle);
            }
        };

        tracing::info!(state = %state, event = %event.kind(), "Idle timeout, leaving screen");
        self.flow.send(event).ok()
    }

    /// 状态概览
    pub fn status(&self) -> KioskStatus {
        let flow = self.flow.status();
        KioskStatus {
            state: flow.state,
            context: flow.context.clone(),
            booth_id: self.booth.booth_id(),
            booth_status: self.booth.status(),
            is_in_session: self.booth.is_in_session(),
            active_grid_id: self.grid.active_id(),
            pending_grid_id: self.grid.pending_id(),
            has_pending_config: self.booth.has_pending_changes(),
        }
    }

    /// 停止转发流程变更
    pub fn detach(&self) -> bool {
        self.bridge.detach()
    }
}

impl SyncTarget for Kiosk {
    fn heartbeat(&self) -> Option<crate::booth::BoothHeartbeat> {
        self.booth.heartbeat()
    }

    fn booth_id(&self) -> Option<String> {
        self.booth.booth_id()
    }

    fn propose_config(&self, config: BoothConfig) -> ConfigDecision {
        Kiosk::propose_config(self, config)
    }
}
