use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};

use super::error::{GridError, GridResult};
use super::template::{GridTemplate, GridTemplateUpdate, builtin_templates};
use crate::gate::{GateDecision, SessionGate};
use crate::storage::{GRID_STORAGE_KEY, KeyValueStore, load_json, save_json};

/// `grid-storage` 的持久化形式
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PersistedGrids {
    templates: Vec<GridTemplate>,
    #[serde(default)]
    active_grid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pending_grid: Option<String>,
}

struct CatalogInner {
    templates: Vec<GridTemplate>,
    active: SessionGate<Option<String>>,
}

impl CatalogInner {
    fn position(&self, id: &str) -> Option<usize> {
        self.templates.iter().position(|t| t.id == id)
    }

    fn active_id(&self) -> Option<&str> {
        self.active.active().as_deref()
    }

    fn pending_id(&self) -> Option<&str> {
        self.active.pending().and_then(|p| p.as_deref())
    }

    fn is_locked(&self, id: &str) -> bool {
        self.active.in_session() && self.active_id() == Some(id)
    }

    fn first_enabled_id(&self) -> Option<String> {
        self.templates
            .iter()
            .filter(|t| t.is_enabled)
            .min_by_key(|t| t.sort_order)
            .or_else(|| self.templates.first())
            .map(|t| t.id.clone())
    }

    fn persisted(&self) -> PersistedGrids {
        PersistedGrids {
            templates: self.templates.clone(),
            active_grid: self.active.active().clone(),
            pending_grid: self.active.pending().cloned().flatten(),
        }
    }
}

/// 模板目录
///
/// 当前模板的切换受会话保护：会话中设置的模板排队，会话结束时生效。
/// 会话中当前模板本身不能被编辑或删除
pub struct GridCatalog {
    inner: Mutex<CatalogInner>,
    store: Arc<dyn KeyValueStore>,
}

impl GridCatalog {
    /// 从存储加载模板目录
    ///
    /// 首次启动或读取失败时写入内置模板
    pub fn open(store: Arc<dyn KeyValueStore>) -> Self {
        let loaded = match load_json::<PersistedGrids>(store.as_ref(), GRID_STORAGE_KEY) {
            Ok(loaded) => loaded,
            Err(e) => {
                tracing::error!(error = %e, "Failed to load grid storage, using built-in templates");
                None
            }
        };

        let seeded = loaded.is_none();
        let persisted = loaded.unwrap_or_else(|| {
            let templates = builtin_templates();
            let active_grid = templates.first().map(|t| t.id.clone());
            PersistedGrids {
                templates,
                active_grid,
                pending_grid: None,
            }
        });

        let mut inner = CatalogInner {
            active: SessionGate::restore(persisted.active_grid, persisted.pending_grid.map(Some)),
            templates: persisted.templates,
        };
        // 当前模板已不存在时回退到第一个可用模板
        if inner.active_id().is_some_and(|id| inner.position(id).is_none()) {
            let fallback = inner.first_enabled_id();
            inner.active.modify_active(|active| *active = fallback);
        }

        tracing::info!(
            templates = inner.templates.len(),
            active = ?inner.active_id(),
            seeded,
            "Grid catalog loaded"
        );

        let catalog = Self {
            inner: Mutex::new(inner),
            store,
        };
        if seeded {
            catalog.persist(&catalog.lock());
        }
        catalog
    }

    fn lock(&self) -> MutexGuard<'_, CatalogInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn persist(&self, inner: &CatalogInner) {
        if let Err(e) = save_json(self.store.as_ref(), GRID_STORAGE_KEY, &inner.persisted()) {
            tracing::error!(error = %e, "Failed to persist grid storage");
        }
    }

    /// 全部模板，按排序字段排列
    pub fn templates(&self) -> Vec<GridTemplate> {
        let mut templates = self.lock().templates.clone();
        templates.sort_by_key(|t| t.sort_order);
        templates
    }

    /// 按 ID 查找模板
    pub fn template(&self, id: &str) -> Option<GridTemplate> {
        let inner = self.lock();
        inner.position(id).map(|i| inner.templates[i].clone())
    }

    /// 拍摄张数匹配的已启用模板
    pub fn templates_for_still_count(&self, still_count: u32) -> Vec<GridTemplate> {
        let mut templates: Vec<_> = self
            .lock()
            .templates
            .iter()
            .filter(|t| t.is_enabled && t.still_count == still_count)
            .cloned()
            .collect();
        templates.sort_by_key(|t| t.sort_order);
        templates
    }

    /// 添加模板
    ///
    /// # Errors
    ///
    /// - `GridError::Invalid` - 模板校验失败
    /// - `GridError::DuplicateId` - ID 已存在
    pub fn add(&self, template: GridTemplate) -> GridResult<()> {
        template.validate()?;

        let mut inner = self.lock();
        if inner.position(&template.id).is_some() {
            return Err(GridError::DuplicateId(template.id));
        }

        tracing::info!(id = %template.id, stills = template.still_count, "Grid template added");
        inner.templates.push(template);
        if inner.active_id().is_none() {
            let first = inner.first_enabled_id();
            inner.active.modify_active(|active| *active = first);
        }
        self.persist(&inner);
        Ok(())
    }

    /// 修改模板，返回修改后的模板
    ///
    /// # Errors
    ///
    /// - `GridError::NotFound` - 模板不存在
    /// - `GridError::ActiveLocked` - 会话中修改当前模板
    /// - `GridError::Invalid` - 修改后的模板校验失败（原模板保持不变）
    pub fn update(&self, id: &str, update: GridTemplateUpdate) -> GridResult<GridTemplate> {
        let mut inner = self.lock();
        let index = inner
            .position(id)
            .ok_or_else(|| GridError::NotFound(id.to_string()))?;
        if inner.is_locked(id) {
            return Err(GridError::ActiveLocked(id.to_string()));
        }

        let mut updated = inner.templates[index].clone();
        update.apply(&mut updated);
        updated.validate()?;
        updated.updated_at = chrono::Utc::now().timestamp_millis();

        inner.templates[index] = updated.clone();
        tracing::debug!(id, "Grid template updated");
        self.persist(&inner);
        Ok(updated)
    }

    /// 删除模板，返回被删除的模板
    ///
    /// 删除当前模板时第一个可用模板成为当前模板；指向它的排队切换被丢弃
    ///
    /// # Errors
    ///
    /// - `GridError::NotFound` - 模板不存在
    /// - `GridError::ActiveLocked` - 会话中删除当前模板
    pub fn remove(&self, id: &str) -> GridResult<GridTemplate> {
        let mut inner = self.lock();
        let index = inner
            .position(id)
            .ok_or_else(|| GridError::NotFound(id.to_string()))?;
        if inner.is_locked(id) {
            return Err(GridError::ActiveLocked(id.to_string()));
        }

        let removed = inner.templates.remove(index);
        if inner.pending_id() == Some(id) {
            inner.active.clear_pending();
        }
        if inner.active_id() == Some(id) {
            let fallback = inner.first_enabled_id();
            tracing::info!(removed = id, active = ?fallback, "Active grid template removed");
            inner.active.modify_active(|active| *active = fallback);
        } else {
            tracing::info!(id, "Grid template removed");
        }

        self.persist(&inner);
        Ok(removed)
    }

    /// 复制模板
    ///
    /// 新模板 ID 为 `grid_<毫秒时间戳>`，名称追加 " (Copy)"
    pub fn duplicate(&self, id: &str) -> GridResult<GridTemplate> {
        let mut inner = self.lock();
        let index = inner
            .position(id)
            .ok_or_else(|| GridError::NotFound(id.to_string()))?;

        let now = chrono::Utc::now().timestamp_millis();
        let mut new_id = format!("grid_{now}");
        let mut suffix = 1;
        while inner.position(&new_id).is_some() {
            new_id = format!("grid_{now}_{suffix}");
            suffix += 1;
        }

        let mut copy = inner.templates[index].clone();
        copy.id = new_id;
        copy.name = format!("{} (Copy)", copy.name);
        copy.created_at = now;
        copy.updated_at = now;

        tracing::info!(source = id, id = %copy.id, "Grid template duplicated");
        inner.templates.push(copy.clone());
        self.persist(&inner);
        Ok(copy)
    }

    /// 设置当前模板
    ///
    /// 不在会话中立即生效，会话中排队
    ///
    /// # Errors
    ///
    /// - `GridError::NotFound` - 模板不存在
    /// - `GridError::Disabled` - 模板已禁用
    pub fn set_active(&self, id: &str) -> GridResult<GateDecision> {
        let mut inner = self.lock();
        let index = inner
            .position(id)
            .ok_or_else(|| GridError::NotFound(id.to_string()))?;
        if !inner.templates[index].is_enabled {
            return Err(GridError::Disabled(id.to_string()));
        }

        let decision = inner.active.propose(Some(id.to_string()));
        match decision {
            GateDecision::Applied => tracing::info!(grid = id, "Active grid changed"),
            GateDecision::Queued => tracing::info!(grid = id, "Grid change queued until session ends"),
            GateDecision::Unchanged => {}
        }
        self.persist(&inner);
        Ok(decision)
    }

    /// 当前模板 ID
    pub fn active_id(&self) -> Option<String> {
        self.lock().active_id().map(str::to_string)
    }

    /// 当前模板
    pub fn active(&self) -> Option<GridTemplate> {
        let inner = self.lock();
        let id = inner.active_id()?;
        inner.position(id).map(|i| inner.templates[i].clone())
    }

    /// 排队中的模板 ID
    pub fn pending_id(&self) -> Option<String> {
        self.lock().pending_id().map(str::to_string)
    }

    /// 是否可以立即切换模板
    pub fn can_apply_immediately(&self) -> bool {
        !self.lock().active.in_session()
    }

    /// 会话开始
    pub fn on_session_start(&self) {
        self.lock().active.on_session_start();
    }

    /// 会话结束，提升排队的模板
    ///
    /// 返回新的当前模板 ID
    pub fn on_session_end(&self) -> Option<String> {
        let mut inner = self.lock();
        let promoted = inner.active.on_session_end().cloned().flatten();
        if let Some(id) = &promoted {
            tracing::info!(grid = %id, "Pending grid applied after session");
            self.persist(&inner);
        }
        promoted
    }
}
