//! 会话安全的配置闸门
//!
//! 顾客会话进行中时，新提交的值只能排队；会话结束时排队值被提升为生效值。
//! 展台配置和模板目录的当前模板都通过它来切换

use serde::{Deserialize, Serialize};

/// 提交结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GateDecision {
    /// 立即生效
    Applied,
    /// 会话进行中，已排队
    Queued,
    /// 与生效值相同，无需变化（同时丢弃排队值）
    Unchanged,
}

/// 生效值与排队值
///
/// 不变式：排队值存在时必然与生效值不同；会话进行中生效值不变
#[derive(Debug, Clone, PartialEq)]
pub struct SessionGate<T> {
    active: T,
    pending: Option<T>,
    in_session: bool,
}

impl<T: PartialEq> SessionGate<T> {
    /// 以生效值创建，初始不在会话中
    pub fn new(active: T) -> Self {
        Self {
            active,
            pending: None,
            in_session: false,
        }
    }

    /// 从持久化数据恢复
    ///
    /// 与生效值相同的排队值会被丢弃
    pub fn restore(active: T, pending: Option<T>) -> Self {
        let pending = pending.filter(|p| *p != active);
        Self {
            active,
            pending,
            in_session: false,
        }
    }

    /// 当前生效值
    pub fn active(&self) -> &T {
        &self.active
    }

    /// 当前排队值
    pub fn pending(&self) -> Option<&T> {
        self.pending.as_ref()
    }

    /// 是否有排队中的变更
    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// 是否在会话中
    pub fn in_session(&self) -> bool {
        self.in_session
    }

    /// 提交新值
    ///
    /// 不在会话中：立即生效并清空排队值。
    /// 在会话中：覆盖排队值（只保留最后一次提交）
    pub fn propose(&mut self, value: T) -> GateDecision {
        if value == self.active {
            self.pending = None;
            return GateDecision::Unchanged;
        }

        if self.in_session {
            self.pending = Some(value);
            GateDecision::Queued
        } else {
            self.active = value;
            self.pending = None;
            GateDecision::Applied
        }
    }

    /// 会话开始，之后的提交都会排队
    pub fn on_session_start(&mut self) {
        self.in_session = true;
    }

    /// 会话结束，提升排队值
    ///
    /// 返回被提升的新生效值
    pub fn on_session_end(&mut self) -> Option<&T> {
        self.in_session = false;
        let promoted = self.pending.take()?;
        self.active = promoted;
        Some(&self.active)
    }

    /// 丢弃排队值
    pub fn clear_pending(&mut self) -> Option<T> {
        self.pending.take()
    }

    /// 在会话外直接修改生效值（例如编辑当前模板本身）
    ///
    /// 会话进行中返回 `false` 且不做修改
    pub fn modify_active(&mut self, f: impl FnOnce(&mut T)) -> bool {
        if self.in_session {
            return false;
        }
        f(&mut self.active);
        if self.pending.as_ref() == Some(&self.active) {
            self.pending = None;
        }
        true
    }
}
