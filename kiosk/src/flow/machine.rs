use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use arc_swap::ArcSwap;
use serde::Serialize;
use tokio::sync::mpsc;

use super::error::{FlowError, FlowResult};
use super::snapshot::{FlowSnapshot, is_restorable};
use super::state::{
    ContextUpdate, MachineContext, MachineEvent, MachineEventKind, MachineState, can_transition,
    resolve,
};
use crate::storage::{KeyValueStore, MACHINE_STATE_KEY, load_json, save_json};

/// 当前状态与上下文
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlowStatus {
    pub state: MachineState,
    pub context: MachineContext,
}

/// 触发通知的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "event", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeCause {
    /// 事件驱动的状态转换
    Event(MachineEventKind),
    /// 上下文更新
    Context,
    /// 调用 `reset()`
    Reset,
}

/// 状态变更通知载荷
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowChange {
    pub previous: MachineState,
    pub state: MachineState,
    pub context: MachineContext,
    pub cause: ChangeCause,
}

impl FlowChange {
    /// 状态是否发生了变化
    pub fn entered(&self) -> Option<MachineState> {
        (self.previous != self.state).then_some(self.state)
    }
}

/// 订阅句柄，用于取消订阅
#[derive(Debug, PartialEq, Eq, Hash)]
#[must_use = "dropping the handle makes it impossible to unsubscribe"]
pub struct Subscription {
    id: u64,
}

type Listener = Arc<dyn Fn(&FlowChange) + Send + Sync>;

/// 展台流程状态机
///
/// 显式构造并注入给使用方，每个实例独立持久化到给定存储
pub struct BoothFlow {
    /// 当前状态（使用 ArcSwap 实现无锁读取）
    status: ArcSwap<FlowStatus>,

    /// 串行化写操作
    write_lock: Mutex<()>,

    /// 订阅者列表，按订阅顺序通知
    listeners: Mutex<Vec<(u64, Listener)>>,

    next_listener_id: AtomicU64,

    store: Arc<dyn KeyValueStore>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn new_session_id() -> String {
    format!("session-{}", uuid::Uuid::new_v4())
}

impl BoothFlow {
    /// 创建状态机并尝试恢复持久化快照
    ///
    /// 快照读取失败、过期或处于终止状态时从 IDLE 开始
    ///
    /// # Examples
    ///
    /// ```
    /// use std::sync::Arc;
    /// use pixxel8_lib::flow::{BoothFlow, MachineContext};
    /// use pixxel8_lib::storage::MemoryStore;
    ///
    /// let flow = BoothFlow::open(Arc::new(MemoryStore::new()), MachineContext::default());
    /// assert!(flow.state().is_idle());
    /// ```
    pub fn open(store: Arc<dyn KeyValueStore>, initial: MachineContext) -> Self {
        let status = Self::restore(store.as_ref(), initial);

        Self {
            status: ArcSwap::new(Arc::new(status)),
            write_lock: Mutex::new(()),
            listeners: Mutex::new(Vec::new()),
            next_listener_id: AtomicU64::new(1),
            store,
        }
    }

    fn restore(store: &dyn KeyValueStore, initial: MachineContext) -> FlowStatus {
        let fresh = FlowStatus {
            state: MachineState::Idle,
            context: initial,
        };

        let snapshot = match load_json::<FlowSnapshot>(store, MACHINE_STATE_KEY) {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => return fresh,
            Err(e) => {
                tracing::error!(error = %e, "Failed to restore flow state");
                return fresh;
            }
        };

        let age_ms = snapshot.age_ms(chrono::Utc::now().timestamp_millis());
        if !is_restorable(snapshot.state, age_ms) {
            tracing::debug!(
                state = %snapshot.state,
                age_ms = age_ms,
                "Discarding flow snapshot"
            );
            return fresh;
        }

        tracing::info!(state = %snapshot.state, age_ms = age_ms, "Restored flow state");
        FlowStatus {
            state: snapshot.state,
            context: snapshot.context,
        }
    }

    /// 获取当前状态与上下文
    ///
    /// 此方法是无锁的
    pub fn status(&self) -> Arc<FlowStatus> {
        self.status.load_full()
    }

    /// 获取当前状态
    pub fn state(&self) -> MachineState {
        self.status.load().state
    }

    /// 获取上下文副本
    pub fn context(&self) -> MachineContext {
        self.status.load().context.clone()
    }

    /// 检查当前状态下事件是否有转换
    pub fn can_transition(&self, event: MachineEventKind) -> bool {
        can_transition(self.state(), event)
    }

    /// 发送事件
    ///
    /// 成功时返回新状态；没有对应转换时记录警告并返回
    /// [`FlowError::NoTransition`]，状态保持不变
    ///
    /// # Examples
    ///
    /// ```
    /// use std::sync::Arc;
    /// use pixxel8_lib::flow::{BoothFlow, MachineContext, MachineEvent, MachineState};
    /// use pixxel8_lib::storage::MemoryStore;
    ///
    /// let flow = BoothFlow::open(Arc::new(MemoryStore::new()), MachineContext::default());
    /// assert_eq!(flow.send(MachineEvent::Start), Ok(MachineState::Setup));
    /// assert!(flow.send(MachineEvent::PrintingComplete).is_err());
    /// ```
    pub fn send(&self, event: MachineEvent) -> FlowResult<MachineState> {
        let kind = event.kind();

        let change = {
            let _guard = lock(&self.write_lock);
            let current = self.status.load_full();

            let Some(next) = resolve(current.state, kind, &current.context) else {
                tracing::warn!(state = %current.state, event = %kind, "No transition");
                return Err(FlowError::NoTransition {
                    state: current.state,
                    event: kind,
                });
            };

            let mut context = current.context.clone();
            if let MachineEvent::Error { error } = event {
                context.error = Some(error);
            }
            if current.state.is_idle() && next == MachineState::Setup {
                context.session_id = Some(new_session_id());
            }
            if next.is_idle() {
                context.session_id = None;
                context.error = None;
            }

            let status = FlowStatus {
                state: next,
                context,
            };
            self.store_and_persist(status.clone());

            tracing::info!(from = %current.state, to = %next, event = %kind, "Flow transition");

            FlowChange {
                previous: current.state,
                state: status.state,
                context: status.context,
                cause: ChangeCause::Event(kind),
            }
        };

        let next = change.state;
        self.notify(&change);
        Ok(next)
    }

    /// 部分更新上下文
    ///
    /// 返回是否有字段变化；没有变化时不持久化也不通知
    pub fn update_context(&self, update: ContextUpdate) -> bool {
        let change = {
            let _guard = lock(&self.write_lock);
            let current = self.status.load_full();

            let mut context = current.context.clone();
            if !update.apply(&mut context) {
                return false;
            }

            let status = FlowStatus {
                state: current.state,
                context,
            };
            self.store_and_persist(status.clone());

            tracing::debug!(
                mode = ?status.context.mode,
                qr_enabled = status.context.qr_enabled,
                "Flow context updated"
            );

            FlowChange {
                previous: current.state,
                state: status.state,
                context: status.context,
                cause: ChangeCause::Context,
            }
        };

        self.notify(&change);
        true
    }

    /// 重置为空闲状态
    ///
    /// 清除错误消息和会话 ID，持久化并通知订阅者；可重复调用
    pub fn reset(&self) {
        let change = {
            let _guard = lock(&self.write_lock);
            let current = self.status.load_full();

            let mut context = current.context.clone();
            context.error = None;
            context.session_id = None;

            let status = FlowStatus {
                state: MachineState::Idle,
                context,
            };
            self.store_and_persist(status.clone());

            FlowChange {
                previous: current.state,
                state: status.state,
                context: status.context,
                cause: ChangeCause::Reset,
            }
        };

        tracing::info!(from = %change.previous, "Flow reset to IDLE");
        self.notify(&change);
    }

    /// 添加订阅者
    ///
    /// 每次状态转换或上下文变更后按订阅顺序同步调用
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&FlowChange) + Send + Sync + 'static,
    {
        let id = self.next_listener_id.fetch_add(1, Ordering::Relaxed);
        lock(&self.listeners).push((id, Arc::new(listener)));
        Subscription { id }
    }

    /// 以通道形式订阅，适合异步消费者
    ///
    /// # Examples
    ///
    /// ```
    /// use std::sync::Arc;
    /// use pixxel8_lib::flow::{BoothFlow, MachineContext, MachineEvent, MachineState};
    /// use pixxel8_lib::storage::MemoryStore;
    ///
    /// let flow = BoothFlow::open(Arc::new(MemoryStore::new()), MachineContext::default());
    /// let (_sub, mut rx) = flow.subscribe_channel();
    /// flow.send(MachineEvent::Start).unwrap();
    /// assert_eq!(rx.try_recv().unwrap().state, MachineState::Setup);
    /// ```
    pub fn subscribe_channel(&self) -> (Subscription, mpsc::UnboundedReceiver<FlowChange>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let subscription = self.subscribe(move |change| {
            let _ = tx.send(change.clone());
        });
        (subscription, rx)
    }

    /// 取消订阅，返回订阅是否存在
    ///
    /// 正在进行的通知仍会送达本轮快照中的其他订阅者
    pub fn unsubscribe(&self, subscription: Subscription) -> bool {
        let mut listeners = lock(&self.listeners);
        let before = listeners.len();
        listeners.retain(|(id, _)| *id != subscription.id);
        listeners.len() != before
    }

    /// 获取当前订阅者数量
    pub fn listener_count(&self) -> usize {
        lock(&self.listeners).len()
    }

    fn store_and_persist(&self, status: FlowStatus) {
        let snapshot = FlowSnapshot::now(status.state, status.context.clone());
        self.status.store(Arc::new(status));

        if let Err(e) = save_json(self.store.as_ref(), MACHINE_STATE_KEY, &snapshot) {
            tracing::error!(error = %e, "Failed to persist flow state");
        }
    }

    /// 通知所有订阅者
    ///
    /// 先复制订阅者列表再释放锁，回调中可以再次调用状态机
    fn notify(&self, change: &FlowChange) {
        let listeners: Vec<Listener> = lock(&self.listeners)
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        for listener in listeners {
            listener(change);
        }
    }
}
