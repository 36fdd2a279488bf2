//! 空闲超时监视
//!
//! 顾客长时间无操作时先发出倒计时警告，再发出超时事件，
//! 由使用方决定如何回到空闲界面

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep_until};

/// 活动检测节流间隔
pub const TOUCH_THROTTLE: Duration = Duration::from_secs(1);

/// 空闲事件
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IdleEvent {
    /// 警告期间重新检测到活动
    Active,
    /// 即将超时，每秒发出一次
    #[serde(rename_all = "camelCase")]
    Warning { seconds_left: u64 },
    /// 已超时
    TimedOut,
}

/// 超时设置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdleOptions {
    /// 无操作多久后超时
    pub timeout: Duration,
    /// 超时前多久开始警告，不小于 `timeout` 时不警告
    pub warning: Duration,
}

impl Default for IdleOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(120),
            warning: Duration::from_secs(30),
        }
    }
}

enum Control {
    Touch,
    Enable(bool),
}

/// 计时状态
struct Timer {
    options: IdleOptions,
    enabled: bool,
    last_activity: Instant,
    warned: bool,
    timed_out: bool,
}

impl Timer {
    fn reset(&mut self) {
        self.last_activity = Instant::now();
        self.warned = false;
        self.timed_out = false;
    }

    fn warning_start(&self) -> Option<Instant> {
        let delay = self.options.timeout.checked_sub(self.options.warning)?;
        if delay.is_zero() {
            return None;
        }
        Some(self.last_activity + delay)
    }

    fn deadline(&self) -> Instant {
        self.last_activity + self.options.timeout
    }

    /// 下一次需要醒来的时间
    fn next_wake(&self) -> Option<Instant> {
        if !self.enabled || self.timed_out {
            return None;
        }
        let deadline = self.deadline();
        let Some(start) = self.warning_start() else {
            return Some(deadline);
        };

        let now = Instant::now();
        if now < start {
            return Some(start);
        }
        // 警告期间每秒醒来一次
        let elapsed = now.saturating_duration_since(start);
        Some((start + Duration::from_secs(elapsed.as_secs() + 1)).min(deadline))
    }

    fn seconds_left(&self) -> u64 {
        let left = self.deadline().saturating_duration_since(Instant::now());
        // 向上取整
        left.as_secs() + u64::from(left.subsec_nanos() > 0)
    }
}

/// 空闲监视器
///
/// 后台任务在停止或销毁时结束
pub struct IdleWatcher {
    control_tx: mpsc::UnboundedSender<Control>,
    /// 停止信号发送器
    stop_tx: Option<mpsc::Sender<()>>,
    last_touch: Mutex<Option<Instant>>,
}

impl IdleWatcher {
    /// 创建并启动监视器，返回监视器和事件接收端
    ///
    /// 创建后立即开始计时
    pub fn start(options: IdleOptions) -> (Self, mpsc::UnboundedReceiver<IdleEvent>) {
        let (control_tx, mut control_rx) = mpsc::unbounded_channel::<Control>();
        let (stop_tx, mut stop_rx) = mpsc::channel::<()>(1);
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            let mut timer = Timer {
                options,
                enabled: true,
                last_activity: Instant::now(),
                warned: false,
                timed_out: false,
            };

            loop {
                let wake = timer.next_wake();

                tokio::select! {
                    _ = stop_rx.recv() => {
                        tracing::debug!("IdleWatcher stopped");
                        break;
                    }
                    control = control_rx.recv() => {
                        match control {
                            Some(Control::Touch) => {
                                if timer.warned && !timer.timed_out {
                                    let _ = event_tx.send(IdleEvent::Active);
                                }
                                timer.reset();
                            }
                            Some(Control::Enable(enabled)) => {
                                timer.enabled = enabled;
                                timer.reset();
                                tracing::debug!(enabled, "Idle timeout toggled");
                            }
                            None => break,
                        }
                    }
                    _ = sleep_until(wake.unwrap_or_else(Instant::now)), if wake.is_some() => {
                        if Instant::now() >= timer.deadline() {
                            timer.timed_out = true;
                            tracing::info!(
                                timeout_secs = timer.options.timeout.as_secs(),
                                "Idle timeout reached"
                            );
                            let _ = event_tx.send(IdleEvent::TimedOut);
                        } else if timer.warning_start().is_some_and(|s| Instant::now() >= s) {
                            if !timer.warned {
                                tracing::debug!("Idle warning started");
                            }
                            timer.warned = true;
                            let _ = event_tx.send(IdleEvent::Warning {
                                seconds_left: timer.seconds_left(),
                            });
                        }
                    }
                }
            }
        });

        tracing::info!(
            timeout_secs = options.timeout.as_secs(),
            warning_secs = options.warning.as_secs(),
            "IdleWatcher started"
        );

        (
            Self {
                control_tx,
                stop_tx: Some(stop_tx),
                last_touch: Mutex::new(None),
            },
            event_rx,
        )
    }

    /// 记录一次用户活动
    ///
    /// 一秒内的重复活动被忽略，返回本次是否生效
    pub fn touch(&self) -> bool {
        let now = Instant::now();
        let mut last = self
            .last_touch
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if last.is_some_and(|t| now.saturating_duration_since(t) < TOUCH_THROTTLE) {
            return false;
        }
        *last = Some(now);
        self.control_tx.send(Control::Touch).is_ok()
    }

    /// 启用或暂停计时，两种情况都会重新开始计时
    pub fn set_enabled(&self, enabled: bool) {
        let _ = self.control_tx.send(Control::Enable(enabled));
    }

    /// 停止监视器
    pub async fn stop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(()).await;
        }
    }
}

impl Drop for IdleWatcher {
    fn drop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.try_send(());
        }
    }
}
