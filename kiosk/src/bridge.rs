//! 流程状态机与会话参与方之间的桥接
//!
//! 进入 CAPTURE 时开始会话，进入 IDLE 或 THANK_YOU 时结束会话，
//! 会话结束后提升的配置同步到模板目录和流程上下文

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use crate::booth::{BoothConfig, BoothStore};
use crate::flow::{BoothFlow, ContextUpdate, FlowChange, MachineMode, Subscription};
use crate::grid::GridCatalog;

/// 会话开始、结束与配置应用共用的锁
type ApplyLock = Arc<Mutex<()>>;

fn hold(lock: &Mutex<()>) -> MutexGuard<'_, ()> {
    lock.lock().unwrap_or_else(PoisonError::into_inner)
}

/// 会话参与方
struct Participants {
    booth: Arc<BoothStore>,
    grid: Arc<GridCatalog>,
    apply_lock: ApplyLock,
}

impl Participants {
    fn start(&self) {
        self.booth.on_session_start();
        self.grid.on_session_start();
    }

    fn end(&self, flow: &BoothFlow) {
        let promoted = self.booth.on_session_end();
        self.grid.on_session_end();
        if let Some(config) = promoted {
            apply_config(&self.grid, flow, &config);
        }
    }

    fn on_change(&self, flow: &BoothFlow, change: &FlowChange) {
        let Some(entered) = change.entered() else {
            return;
        };
        let _guard = hold(&self.apply_lock);
        if entered.opens_session() {
            self.start();
        } else if entered.closes_session() {
            self.end(flow);
        }
    }
}

/// 把生效配置同步到模板目录和流程上下文
///
/// 模式未变化时不更新上下文
pub(crate) fn apply_config(grid: &GridCatalog, flow: &BoothFlow, config: &BoothConfig) {
    if let Err(e) = grid.set_active(&config.active_grid_id) {
        tracing::warn!(
            grid = %config.active_grid_id,
            error = %e,
            "Config references unusable grid template"
        );
    }

    let mode = MachineMode::from(config.mode);
    if flow.context().mode != mode {
        flow.update_context(ContextUpdate::mode(mode));
    }
}

/// 会话桥接
///
/// 持有流程订阅，销毁时自动取消订阅
pub struct SessionBridge {
    flow: Arc<BoothFlow>,
    subscription: Mutex<Option<Subscription>>,
    apply_lock: ApplyLock,
}

impl SessionBridge {
    /// 订阅流程状态机
    ///
    /// 流程已处于会话状态（例如从快照恢复到 CAPTURE 之后）时立即开始会话；
    /// 否则上次会话遗留的排队配置立即生效
    pub fn attach(flow: Arc<BoothFlow>, booth: Arc<BoothStore>, grid: Arc<GridCatalog>) -> Self {
        let apply_lock = ApplyLock::default();
        let participants = Participants {
            booth,
            grid,
            apply_lock: Arc::clone(&apply_lock),
        };
        if flow.state().is_in_session() {
            tracing::info!(state = %flow.state(), "Resuming session from restored flow state");
            participants.start();
        } else {
            participants.end(&flow);
        }

        let weak: Weak<BoothFlow> = Arc::downgrade(&flow);
        let subscription = flow.subscribe(move |change| {
            if let Some(flow) = weak.upgrade() {
                participants.on_change(&flow, change);
            }
        });

        tracing::debug!("Session bridge attached");
        Self {
            flow,
            subscription: Mutex::new(Some(subscription)),
            apply_lock,
        }
    }

    /// 持有期间会话不会开始或结束
    pub(crate) fn hold(&self) -> MutexGuard<'_, ()> {
        hold(&self.apply_lock)
    }

    /// 取消订阅，返回此前是否处于订阅状态
    pub fn detach(&self) -> bool {
        let subscription = self
            .subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match subscription {
            Some(subscription) => {
                tracing::debug!("Session bridge detached");
                self.flow.unsubscribe(subscription)
            }
            None => false,
        }
    }
}

impl Drop for SessionBridge {
    fn drop(&mut self) {
        self.detach();
    }
}
