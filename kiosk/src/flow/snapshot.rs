use serde::{Deserialize, Serialize};

use super::state::{MachineContext, MachineState};

/// 快照新鲜度窗口（毫秒），超过即丢弃
pub const RESTORE_WINDOW_MS: i64 = 5 * 60 * 1000;

/// 持久化的状态机快照
///
/// 存储在 `machine-fsm-state` 键下
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowSnapshot {
    pub state: MachineState,
    pub context: MachineContext,
    /// Unix 毫秒时间戳
    pub timestamp: i64,
}

impl FlowSnapshot {
    /// 以当前时间创建快照
    pub fn now(state: MachineState, context: MachineContext) -> Self {
        Self {
            state,
            context,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// 快照年龄（毫秒），时间戳在未来时为负数
    pub fn age_ms(&self, now_ms: i64) -> i64 {
        now_ms - self.timestamp
    }
}

/// 恢复策略
///
/// 快照必须在新鲜度窗口内，且状态不是终止状态（IDLE / THANK_YOU / ERROR）。
/// 未来时间戳（负年龄）视为不可信，不恢复
pub fn is_restorable(state: MachineState, age_ms: i64) -> bool {
    (0..RESTORE_WINDOW_MS).contains(&age_ms) && !state.is_terminal()
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINUTE: i64 = 60 * 1000;

    #[test]
    fn test_window_is_five_minutes() {
        assert_eq!(RESTORE_WINDOW_MS, 5 * MINUTE);
    }

    #[test]
    fn test_fresh_in_progress_states_restore() {
        for state in [
            MachineState::Setup,
            MachineState::Capture,
            MachineState::Payment,
            MachineState::Printing,
            MachineState::Qr,
        ] {
            assert!(is_restorable(state, MINUTE), "{state} should restore");
        }
    }

    #[test]
    fn test_terminal_states_never_restore() {
        for state in [MachineState::Idle, MachineState::ThankYou, MachineState::Error] {
            assert!(!is_restorable(state, 0));
            assert!(!is_restorable(state, MINUTE));
        }
    }

    #[test]
    fn test_stale_snapshot_never_restores() {
        assert!(!is_restorable(MachineState::Capture, 6 * MINUTE));
        assert!(!is_restorable(MachineState::Capture, RESTORE_WINDOW_MS));
        assert!(is_restorable(MachineState::Capture, RESTORE_WINDOW_MS - 1));
    }

    #[test]
    fn test_future_timestamp_not_restored() {
        assert!(!is_restorable(MachineState::Capture, -1));
    }

    #[test]
    fn test_snapshot_json_shape() {
        let snapshot = FlowSnapshot {
            state: MachineState::ThankYou,
            context: MachineContext::default(),
            timestamp: 1_700_000_000_000,
        };
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["state"], "THANK_YOU");
        assert_eq!(json["context"]["qrEnabled"], true);
        assert_eq!(json["timestamp"], 1_700_000_000_000i64);
        assert_eq!(snapshot.age_ms(1_700_000_060_000), MINUTE);
    }
}
