use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::{BoothError, BoothResult};
use super::types::{BoothConfig, BoothConfigState, BoothHeartbeat, BoothIdentity, BoothStatus};
use crate::gate::{GateDecision, SessionGate};
use crate::storage::{BOOTH_STORAGE_KEY, KeyValueStore, load_json, save_json};

/// 配置提交结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConfigDecision {
    /// 立即生效
    Applied,
    /// 会话进行中，排队等待会话结束
    Queued,
    /// 与当前生效配置相同
    Unchanged,
    /// 被拒绝（未注册或展台 ID 不匹配）
    Rejected { reason: String },
}

impl ConfigDecision {
    /// 是否已立即生效
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied)
    }

    /// 是否已排队
    pub fn is_queued(&self) -> bool {
        matches!(self, Self::Queued)
    }
}

impl From<GateDecision> for ConfigDecision {
    fn from(decision: GateDecision) -> Self {
        match decision {
            GateDecision::Applied => Self::Applied,
            GateDecision::Queued => Self::Queued,
            GateDecision::Unchanged => Self::Unchanged,
        }
    }
}

/// 会话标志
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionFlag {
    pub is_in_session: bool,
    pub session_start_time: Option<DateTime<Utc>>,
}

/// `pixxel8-booth-storage` 的持久化形式
///
/// 会话标志和运行状态不持久化
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct PersistedBooth {
    identity: Option<BoothIdentity>,
    config_state: Option<BoothConfigState>,
}

struct BoothInner {
    identity: Option<BoothIdentity>,
    config: Option<SessionGate<BoothConfig>>,
    status: BoothStatus,
    session: SessionFlag,
}

impl BoothInner {
    fn config_state(&self) -> Option<BoothConfigState> {
        self.config.as_ref().map(|gate| BoothConfigState {
            active_config: gate.active().clone(),
            pending_config: gate.pending().cloned(),
            has_pending_changes: gate.has_pending(),
        })
    }

    fn persisted(&self) -> PersistedBooth {
        PersistedBooth {
            identity: self.identity.clone(),
            config_state: self.config_state(),
        }
    }
}

/// 展台状态存储
///
/// 保存展台身份、会话安全的配置和会话标志，
/// 会话进行中生效配置不会改变
pub struct BoothStore {
    inner: Mutex<BoothInner>,
    store: Arc<dyn KeyValueStore>,
}

impl BoothStore {
    /// 从存储加载展台状态
    ///
    /// 读取失败时以未注册状态启动
    pub fn open(store: Arc<dyn KeyValueStore>) -> Self {
        let persisted = match load_json::<PersistedBooth>(store.as_ref(), BOOTH_STORAGE_KEY) {
            Ok(Some(persisted)) => persisted,
            Ok(None) => PersistedBooth::default(),
            Err(e) => {
                tracing::error!(error = %e, "Failed to load booth storage");
                PersistedBooth::default()
            }
        };

        let config = persisted
            .config_state
            .map(|state| SessionGate::restore(state.active_config, state.pending_config));

        if let Some(identity) = &persisted.identity {
            tracing::info!(
                booth_id = %identity.booth_id,
                has_pending = config.as_ref().is_some_and(|g| g.has_pending()),
                "Booth storage loaded"
            );
        }

        Self {
            inner: Mutex::new(BoothInner {
                identity: persisted.identity,
                config,
                status: BoothStatus::Offline,
                session: SessionFlag::default(),
            }),
            store,
        }
    }

    fn lock(&self) -> MutexGuard<'_, BoothInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn persist(&self, inner: &BoothInner) {
        if let Err(e) = save_json(self.store.as_ref(), BOOTH_STORAGE_KEY, &inner.persisted()) {
            tracing::error!(error = %e, "Failed to persist booth storage");
        }
    }

    /// 首次安装时设置展台身份
    ///
    /// 同时创建默认生效配置。以相同 ID 重复注册不做任何修改
    ///
    /// # Errors
    ///
    /// - `BoothError::InvalidIdentity` - 必填字段为空
    /// - `BoothError::IdentityAlreadySet` - 已注册为其他 ID
    pub fn register(&self, identity: BoothIdentity) -> BoothResult<()> {
        identity.validate()?;

        let mut inner = self.lock();
        if let Some(existing) = &inner.identity {
            if existing.booth_id == identity.booth_id {
                return Ok(());
            }
            return Err(BoothError::IdentityAlreadySet {
                existing: existing.booth_id.clone(),
                requested: identity.booth_id,
            });
        }

        if inner.config.is_none() {
            let mut gate = SessionGate::new(BoothConfig::default_for(&identity.booth_id));
            if inner.session.is_in_session {
                gate.on_session_start();
            }
            inner.config = Some(gate);
        }

        tracing::info!(booth_id = %identity.booth_id, name = %identity.booth_name, "Booth registered");
        inner.identity = Some(identity);
        self.persist(&inner);
        Ok(())
    }

    /// 展台身份
    pub fn identity(&self) -> Option<BoothIdentity> {
        self.lock().identity.clone()
    }

    /// 展台 ID
    pub fn booth_id(&self) -> Option<String> {
        self.lock().identity.as_ref().map(|i| i.booth_id.clone())
    }

    /// 是否已完成注册
    pub fn has_identity(&self) -> bool {
        self.lock().identity.is_some()
    }

    /// 当前生效配置
    pub fn active_config(&self) -> Option<BoothConfig> {
        self.lock().config.as_ref().map(|g| g.active().clone())
    }

    /// 排队中的配置
    pub fn pending_config(&self) -> Option<BoothConfig> {
        self.lock().config.as_ref().and_then(|g| g.pending().cloned())
    }

    /// 是否有排队中的配置
    pub fn has_pending_changes(&self) -> bool {
        self.lock().config.as_ref().is_some_and(|g| g.has_pending())
    }

    /// 完整配置状态
    pub fn config_state(&self) -> Option<BoothConfigState> {
        self.lock().config_state()
    }

    /// 是否可以立即应用配置（不在会话中）
    pub fn can_apply_config_immediately(&self) -> bool {
        !self.lock().session.is_in_session
    }

    /// 提交新配置
    ///
    /// 不在会话中立即生效；会话中排队，只保留最后一次提交。
    /// 不会返回错误，无法处理的提交以 `Rejected` 报告
    pub fn propose_config(&self, config: BoothConfig) -> ConfigDecision {
        let mut inner = self.lock();

        let Some(booth_id) = inner.identity.as_ref().map(|i| i.booth_id.clone()) else {
            tracing::warn!("Config proposal ignored: booth not registered");
            return ConfigDecision::Rejected {
                reason: BoothError::NotRegistered.to_string(),
            };
        };
        if config.booth_id != booth_id {
            tracing::warn!(
                expected = %booth_id,
                got = %config.booth_id,
                "Config proposal for another booth ignored"
            );
            return ConfigDecision::Rejected {
                reason: format!("config is for booth '{}'", config.booth_id),
            };
        }

        let in_session = inner.session.is_in_session;
        let gate = inner
            .config
            .get_or_insert_with(|| SessionGate::new(BoothConfig::default_for(&booth_id)));
        if in_session && !gate.in_session() {
            gate.on_session_start();
        }

        let decision = ConfigDecision::from(gate.propose(config));
        match decision {
            ConfigDecision::Applied => tracing::info!("Config applied immediately"),
            ConfigDecision::Queued => tracing::info!("Config queued until session ends"),
            _ => tracing::debug!(decision = ?decision, "Config proposal handled"),
        }

        self.persist(&inner);
        decision
    }

    /// 丢弃排队中的配置
    pub fn clear_pending_config(&self) -> Option<BoothConfig> {
        let mut inner = self.lock();
        let cleared = inner.config.as_mut().and_then(|g| g.clear_pending());
        if cleared.is_some() {
            self.persist(&inner);
        }
        cleared
    }

    /// 会话开始
    ///
    /// 之后的配置提交都会排队
    pub fn on_session_start(&self) {
        let mut inner = self.lock();
        if inner.session.is_in_session {
            return;
        }

        inner.session = SessionFlag {
            is_in_session: true,
            session_start_time: Some(Utc::now()),
        };
        if let Some(gate) = inner.config.as_mut() {
            gate.on_session_start();
        }
        if inner.status != BoothStatus::Error {
            inner.status = BoothStatus::InSession;
        }
        tracing::debug!("Booth session started");
    }

    /// 会话结束
    ///
    /// 原子地把排队配置提升为生效配置，返回新的生效配置
    pub fn on_session_end(&self) -> Option<BoothConfig> {
        let mut inner = self.lock();
        let was_in_session = inner.session.is_in_session;

        inner.session = SessionFlag::default();
        if inner.status == BoothStatus::InSession {
            inner.status = BoothStatus::Online;
        }

        let promoted = inner
            .config
            .as_mut()
            .and_then(|g| g.on_session_end().cloned());

        if let Some(config) = &promoted {
            tracing::info!(
                mode = ?config.mode,
                grid = %config.active_grid_id,
                "Pending config promoted after session"
            );
            self.persist(&inner);
        } else if was_in_session {
            tracing::debug!("Booth session ended");
        }

        promoted
    }

    /// 会话标志
    pub fn session(&self) -> SessionFlag {
        self.lock().session
    }

    /// 是否在会话中
    pub fn is_in_session(&self) -> bool {
        self.lock().session.is_in_session
    }

    /// 运行状态
    pub fn status(&self) -> BoothStatus {
        self.lock().status
    }

    /// 设置运行状态
    pub fn set_status(&self, status: BoothStatus) {
        self.lock().status = status;
    }

    /// 生成心跳，未注册时返回 `None`
    pub fn heartbeat(&self) -> Option<BoothHeartbeat> {
        let inner = self.lock();
        let identity = inner.identity.as_ref()?;
        Some(BoothHeartbeat {
            booth_id: identity.booth_id.clone(),
            status: inner.status,
            is_in_session: inner.session.is_in_session,
            timestamp: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::booth::BoothMode;
    use crate::storage::MemoryStore;

    fn registered() -> BoothStore {
        let store = BoothStore::open(Arc::new(MemoryStore::new()));
        store.register(BoothIdentity::new("booth-1", "Lobby")).unwrap();
        store
    }

    fn config(grid: &str) -> BoothConfig {
        BoothConfig {
            active_grid_id: grid.to_string(),
            ..BoothConfig::default_for("booth-1")
        }
    }

    #[test]
    fn test_register_creates_default_config() {
        let store = registered();
        assert!(store.has_identity());
        assert_eq!(store.booth_id().as_deref(), Some("booth-1"));
        let active = store.active_config().unwrap();
        assert_eq!(active.booth_id, "booth-1");
        assert!(!store.has_pending_changes());
    }

    #[test]
    fn test_identity_is_immutable() {
        let store = registered();
        assert!(store.register(BoothIdentity::new("booth-1", "Other")).is_ok());
        assert_eq!(store.identity().unwrap().booth_name, "Lobby");

        let err = store
            .register(BoothIdentity::new("booth-2", "Other"))
            .unwrap_err();
        assert!(matches!(err, BoothError::IdentityAlreadySet { .. }));
    }

    #[test]
    fn test_unregistered_proposal_rejected() {
        let store = BoothStore::open(Arc::new(MemoryStore::new()));
        assert!(matches!(
            store.propose_config(config("grid_3x2")),
            ConfigDecision::Rejected { .. }
        ));
        assert!(store.active_config().is_none());
    }

    #[test]
    fn test_foreign_booth_proposal_rejected() {
        let store = registered();
        let foreign = BoothConfig::default_for("booth-9");
        assert!(matches!(
            store.propose_config(foreign),
            ConfigDecision::Rejected { .. }
        ));
    }

    #[test]
    fn test_immediate_apply_outside_session() {
        let store = registered();
        let a = config("grid_3x2");
        assert_eq!(store.propose_config(a.clone()), ConfigDecision::Applied);
        assert_eq!(store.active_config(), Some(a));
        assert!(store.pending_config().is_none());
    }

    #[test]
    fn test_queue_during_session_last_write_wins() {
        let store = registered();
        let original = store.active_config().unwrap();
        store.on_session_start();

        let a = config("grid_3x2");
        let b = BoothConfig {
            mode: BoothMode::Event,
            ..config("strip_4_vertical")
        };
        assert!(store.propose_config(a).is_queued());
        assert!(store.propose_config(b.clone()).is_queued());
        assert_eq!(store.active_config(), Some(original));
        assert!(store.has_pending_changes());

        assert_eq!(store.on_session_end(), Some(b.clone()));
        assert_eq!(store.active_config(), Some(b));
        assert!(!store.has_pending_changes());
        assert!(store.config_state().unwrap().pending_config.is_none());
    }

    #[test]
    fn test_session_flag_and_status() {
        let store = registered();
        store.set_status(BoothStatus::Online);
        assert!(store.can_apply_config_immediately());

        store.on_session_start();
        let flag = store.session();
        assert!(flag.is_in_session);
        assert!(flag.session_start_time.is_some());
        assert_eq!(store.status(), BoothStatus::InSession);
        assert!(!store.can_apply_config_immediately());

        store.on_session_end();
        assert_eq!(store.session(), SessionFlag::default());
        assert_eq!(store.status(), BoothStatus::Online);
    }

    #[test]
    fn test_heartbeat() {
        let unregistered = BoothStore::open(Arc::new(MemoryStore::new()));
        assert!(unregistered.heartbeat().is_none());

        let store = registered();
        store.on_session_start();
        let heartbeat = store.heartbeat().unwrap();
        assert_eq!(heartbeat.booth_id, "booth-1");
        assert!(heartbeat.is_in_session);
        assert_eq!(heartbeat.status, BoothStatus::InSession);
    }

    #[test]
    fn test_persistence_roundtrip() {
        let backing = Arc::new(MemoryStore::new());
        {
            let store = BoothStore::open(backing.clone());
            store.register(BoothIdentity::new("booth-1", "Lobby")).unwrap();
            store.on_session_start();
            store.propose_config(config("grid_3x2"));
        }

        let reopened = BoothStore::open(backing);
        assert_eq!(reopened.booth_id().as_deref(), Some("booth-1"));
        assert!(!reopened.is_in_session());
        assert_eq!(
            reopened.pending_config().map(|c| c.active_grid_id),
            Some("grid_3x2".to_string())
        );

        assert!(reopened.on_session_end().is_some());
        assert_eq!(
            reopened.active_config().unwrap().active_grid_id,
            "grid_3x2"
        );
    }

    #[test]
    fn test_clear_pending() {
        let store = registered();
        store.on_session_start();
        store.propose_config(config("grid_3x2"));
        assert!(store.clear_pending_config().is_some());
        assert!(store.on_session_end().is_none());
        assert!(store.clear_pending_config().is_none());
    }
}
