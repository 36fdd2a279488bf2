use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::FlowError;

/// 自助机流程状态
///
/// 任意时刻只有一个状态处于激活状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MachineState {
    /// 空闲，等待顾客开始
    #[default]
    Idle,

    /// 选择模板和张数
    Setup,

    /// 拍摄中
    Capture,

    /// 等待支付
    Payment,

    /// 打印中
    Printing,

    /// 展示下载二维码
    Qr,

    /// 致谢页面
    ThankYou,

    /// 错误状态，只能通过 RESET / CANCEL 恢复
    Error,
}

impl MachineState {
    /// 所有状态
    pub const ALL: [MachineState; 8] = [
        Self::Idle,
        Self::Setup,
        Self::Capture,
        Self::Payment,
        Self::Printing,
        Self::Qr,
        Self::ThankYou,
        Self::Error,
    ];

    /// 获取状态名称（与持久化格式一致）
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::Setup => "SETUP",
            Self::Capture => "CAPTURE",
            Self::Payment => "PAYMENT",
            Self::Printing => "PRINTING",
            Self::Qr => "QR",
            Self::ThankYou => "THANK_YOU",
            Self::Error => "ERROR",
        }
    }

    /// 检查是否为空闲状态
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    /// 检查是否为错误状态
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error)
    }

    /// 终止状态（空闲、致谢、错误），重启后不会恢复到这些状态
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Idle | Self::ThankYou | Self::Error)
    }

    /// 顾客是否正在进行拍摄会话
    pub fn is_in_session(&self) -> bool {
        matches!(
            self,
            Self::Capture | Self::Payment | Self::Printing | Self::Qr
        )
    }

    /// 进入此状态即开始会话
    pub fn opens_session(&self) -> bool {
        matches!(self, Self::Capture)
    }

    /// 进入此状态即结束会话
    pub fn closes_session(&self) -> bool {
        matches!(self, Self::Idle | Self::ThankYou)
    }
}

impl fmt::Display for MachineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 事件类型（不带负载）
///
/// 用于转换表查找和 `can_transition`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MachineEventKind {
    Start,
    SetupComplete,
    CaptureComplete,
    PaymentComplete,
    SkipPayment,
    PrintingComplete,
    QrComplete,
    SkipQr,
    ThankYouComplete,
    Error,
    Reset,
    Cancel,
}

impl MachineEventKind {
    /// 所有事件类型
    pub const ALL: [MachineEventKind; 12] = [
        Self::Start,
        Self::SetupComplete,
        Self::CaptureComplete,
        Self::PaymentComplete,
        Self::SkipPayment,
        Self::PrintingComplete,
        Self::QrComplete,
        Self::SkipQr,
        Self::ThankYouComplete,
        Self::Error,
        Self::Reset,
        Self::Cancel,
    ];

    /// 获取事件名称
    pub fn name(&self) -> &'static str {
        match self {
            Self::Start => "START",
            Self::SetupComplete => "SETUP_COMPLETE",
            Self::CaptureComplete => "CAPTURE_COMPLETE",
            Self::PaymentComplete => "PAYMENT_COMPLETE",
            Self::SkipPayment => "SKIP_PAYMENT",
            Self::PrintingComplete => "PRINTING_COMPLETE",
            Self::QrComplete => "QR_COMPLETE",
            Self::SkipQr => "SKIP_QR",
            Self::ThankYouComplete => "THANK_YOU_COMPLETE",
            Self::Error => "ERROR",
            Self::Reset => "RESET",
            Self::Cancel => "CANCEL",
        }
    }
}

impl fmt::Display for MachineEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for MachineEventKind {
    type Err = FlowError;

    /// 不区分大小写，接受 `setup_complete` 或 `SETUP_COMPLETE`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_uppercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|kind| kind.name() == wanted)
            .ok_or_else(|| FlowError::UnknownEvent(s.to_string()))
    }
}

/// 流程事件
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MachineEvent {
    Start,
    SetupComplete,
    CaptureComplete,
    PaymentComplete,
    SkipPayment,
    PrintingComplete,
    QrComplete,
    SkipQr,
    ThankYouComplete,
    /// 携带错误消息，强制进入 ERROR
    Error { error: String },
    Reset,
    Cancel,
}

impl MachineEvent {
    /// 创建错误事件
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            error: message.into(),
        }
    }

    /// 获取事件类型
    pub fn kind(&self) -> MachineEventKind {
        match self {
            Self::Start => MachineEventKind::Start,
            Self::SetupComplete => MachineEventKind::SetupComplete,
            Self::CaptureComplete => MachineEventKind::CaptureComplete,
            Self::PaymentComplete => MachineEventKind::PaymentComplete,
            Self::SkipPayment => MachineEventKind::SkipPayment,
            Self::PrintingComplete => MachineEventKind::PrintingComplete,
            Self::QrComplete => MachineEventKind::QrComplete,
            Self::SkipQr => MachineEventKind::SkipQr,
            Self::ThankYouComplete => MachineEventKind::ThankYouComplete,
            Self::Error { .. } => MachineEventKind::Error,
            Self::Reset => MachineEventKind::Reset,
            Self::Cancel => MachineEventKind::Cancel,
        }
    }

    /// 由事件类型构造事件，ERROR 使用给定消息（缺省为 "unknown error"）
    pub fn from_kind(kind: MachineEventKind, message: Option<String>) -> Self {
        match kind {
            MachineEventKind::Start => Self::Start,
            MachineEventKind::SetupComplete => Self::SetupComplete,
            MachineEventKind::CaptureComplete => Self::CaptureComplete,
            MachineEventKind::PaymentComplete => Self::PaymentComplete,
            MachineEventKind::SkipPayment => Self::SkipPayment,
            MachineEventKind::PrintingComplete => Self::PrintingComplete,
            MachineEventKind::QrComplete => Self::QrComplete,
            MachineEventKind::SkipQr => Self::SkipQr,
            MachineEventKind::ThankYouComplete => Self::ThankYouComplete,
            MachineEventKind::Error => {
                Self::error(message.unwrap_or_else(|| "unknown error".to_string()))
            }
            MachineEventKind::Reset => Self::Reset,
            MachineEventKind::Cancel => Self::Cancel,
        }
    }
}

/// 运营模式
///
/// EVENT 模式下由主办方买单，跳过支付
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MachineMode {
    #[default]
    Normal,
    Event,
}

/// 状态机上下文
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MachineContext {
    /// 运营模式
    pub mode: MachineMode,
    /// 是否展示二维码
    pub qr_enabled: bool,
    /// 当前会话 ID
    pub session_id: Option<String>,
    /// 最近一次错误消息
    pub error: Option<String>,
}

impl Default for MachineContext {
    fn default() -> Self {
        Self {
            mode: MachineMode::Normal,
            qr_enabled: true,
            session_id: None,
            error: None,
        }
    }
}

impl MachineContext {
    /// 以指定模式和二维码开关创建上下文
    pub fn new(mode: MachineMode, qr_enabled: bool) -> Self {
        Self {
            mode,
            qr_enabled,
            ..Default::default()
        }
    }
}

/// 上下文的部分更新
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContextUpdate {
    pub mode: Option<MachineMode>,
    pub qr_enabled: Option<bool>,
}

impl ContextUpdate {
    /// 只更新模式
    pub fn mode(mode: MachineMode) -> Self {
        Self {
            mode: Some(mode),
            ..Default::default()
        }
    }

    /// 只更新二维码开关
    pub fn qr_enabled(enabled: bool) -> Self {
        Self {
            qr_enabled: Some(enabled),
            ..Default::default()
        }
    }

    /// 应用到上下文，返回是否有字段发生变化
    pub(crate) fn apply(&self, context: &mut MachineContext) -> bool {
        let mut changed = false;
        if let Some(mode) = self.mode {
            changed |= context.mode != mode;
            context.mode = mode;
        }
        if let Some(enabled) = self.qr_enabled {
            changed |= context.qr_enabled != enabled;
            context.qr_enabled = enabled;
        }
        changed
    }
}

/// EVENT 模式跳过支付
pub fn should_skip_payment(context: &MachineContext) -> bool {
    context.mode == MachineMode::Event
}

/// 关闭二维码时跳过二维码页面
pub fn should_skip_qr(context: &MachineContext) -> bool {
    !context.qr_enabled
}

type S = MachineState;
type E = MachineEventKind;

/// 转换守卫：谓词成立时改走 `target`
struct Guard {
    predicate: fn(&MachineContext) -> bool,
    target: MachineState,
}

/// 转换表条目，`from == None` 表示任意状态
struct Transition {
    from: Option<MachineState>,
    event: MachineEventKind,
    to: MachineState,
    guard: Option<Guard>,
}

impl Transition {
    const fn plain(from: MachineState, event: MachineEventKind, to: MachineState) -> Self {
        Self {
            from: Some(from),
            event,
            to,
            guard: None,
        }
    }

    const fn guarded(
        from: MachineState,
        event: MachineEventKind,
        to: MachineState,
        predicate: fn(&MachineContext) -> bool,
        target: MachineState,
    ) -> Self {
        Self {
            from: Some(from),
            event,
            to,
            guard: Some(Guard { predicate, target }),
        }
    }

    fn target(&self, context: &MachineContext) -> MachineState {
        match &self.guard {
            Some(guard) if (guard.predicate)(context) => guard.target,
            _ => self.to,
        }
    }
}

/// 静态转换表
///
/// SKIP_PAYMENT 没有任何条目：EVENT 模式由 CAPTURE_COMPLETE 的守卫处理
static TRANSITIONS: [Transition; 15] = [
    Transition::plain(S::Idle, E::Start, S::Setup),
    Transition::plain(S::Setup, E::SetupComplete, S::Capture),
    Transition::plain(S::Setup, E::Cancel, S::Idle),
    Transition::guarded(
        S::Capture,
        E::CaptureComplete,
        S::Payment,
        should_skip_payment,
        S::Printing,
    ),
    Transition::plain(S::Capture, E::Cancel, S::Idle),
    Transition::plain(S::Payment, E::PaymentComplete, S::Printing),
    Transition::plain(S::Payment, E::Cancel, S::Idle),
    Transition::guarded(
        S::Printing,
        E::PrintingComplete,
        S::Qr,
        should_skip_qr,
        S::ThankYou,
    ),
    Transition::plain(S::Qr, E::QrComplete, S::ThankYou),
    Transition::plain(S::Qr, E::SkipQr, S::ThankYou),
    Transition::plain(S::ThankYou, E::ThankYouComplete, S::Idle),
    Transition::plain(S::ThankYou, E::Reset, S::Idle),
    Transition::plain(S::Error, E::Reset, S::Idle),
    Transition::plain(S::Error, E::Cancel, S::Idle),
    Transition {
        from: None,
        event: E::Error,
        to: S::Error,
        guard: None,
    },
];

fn lookup(from: MachineState, event: MachineEventKind) -> Option<&'static Transition> {
    TRANSITIONS
        .iter()
        .find(|t| t.event == event && t.from.is_none_or(|s| s == from))
}

/// 检查当前状态下事件是否有转换（不评估守卫）
pub fn can_transition(from: MachineState, event: MachineEventKind) -> bool {
    lookup(from, event).is_some()
}

/// 解析转换目标：先查表，再评估守卫
///
/// 没有对应条目时返回 `None`
pub fn resolve(
    from: MachineState,
    event: MachineEventKind,
    context: &MachineContext,
) -> Option<MachineState> {
    lookup(from, event).map(|t| t.target(context))
}
