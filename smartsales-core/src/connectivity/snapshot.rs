use serde::Serialize;

use super::state::ConnectionState;

/// 连接状态快照
///
/// 扁平化的可序列化视图，供 UI 层直接渲染
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionSnapshot {
    /// 状态名称
    pub state: String,
    pub is_connected: bool,
    pub is_pairing: bool,
    /// 配网完成或同步中
    pub is_ready: bool,
    pub is_error: bool,
    pub device_name: Option<String>,
    pub signal_strength_dbm: Option<i32>,
    /// 配网进度
    pub progress: Option<u8>,
    pub wifi_ssid: Option<String>,
    pub last_heartbeat_at_millis: Option<i64>,
    /// 错误消息（如果有）
    pub error_message: Option<String>,
    /// 是否提供重试
    pub can_retry: bool,
}

impl From<&ConnectionState> for ConnectionSnapshot {
    fn from(state: &ConnectionState) -> Self {
        let signal_strength_dbm = match state {
            ConnectionState::Pairing {
                signal_strength_dbm,
                ..
            } => Some(*signal_strength_dbm),
            _ => state.session().map(|s| s.signal_strength_dbm),
        };
        let progress = match state {
            ConnectionState::Pairing { progress, .. } => Some(*progress),
            _ => None,
        };
        let last_heartbeat_at_millis = match state {
            ConnectionState::Syncing {
                last_heartbeat_at_millis,
                ..
            } => Some(*last_heartbeat_at_millis),
            _ => None,
        };

        Self {
            state: state.name().to_string(),
            is_connected: !state.is_disconnected() && !state.is_error(),
            is_pairing: state.is_pairing(),
            is_ready: state.is_ready(),
            is_error: state.is_error(),
            device_name: state.device_name().map(str::to_string),
            signal_strength_dbm,
            progress,
            wifi_ssid: state.provisioning_status().map(|s| s.wifi_ssid.clone()),
            last_heartbeat_at_millis,
            error_message: state.connectivity_error().map(|e| e.to_string()),
            can_retry: state.connectivity_error().is_some_and(|e| e.can_retry()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectivity::{BlePeripheral, BleSession, ConnectivityError, ProvisioningStatus};

    #[test]
    fn test_snapshot_from_syncing() {
        let session = BleSession::from_peripheral_at(&BlePeripheral::new("1", "BT311", -50), 0);
        let state = ConnectionState::syncing(session, ProvisioningStatus::new("Office", "h-1", "x"), 7);
        let snapshot = ConnectionSnapshot::from(&state);

        assert_eq!(snapshot.state, "Syncing");
        assert!(snapshot.is_connected);
        assert!(snapshot.is_ready);
        assert_eq!(snapshot.device_name.as_deref(), Some("BT311"));
        assert_eq!(snapshot.signal_strength_dbm, Some(-50));
        assert_eq!(snapshot.wifi_ssid.as_deref(), Some("Office"));
        assert_eq!(snapshot.last_heartbeat_at_millis, Some(7));
        assert!(!snapshot.can_retry);
    }

    #[test]
    fn test_snapshot_from_error() {
        let state = ConnectionState::error(ConnectivityError::permission_denied(["BLUETOOTH_SCAN"]));
        let snapshot = ConnectionSnapshot::from(&state);

        assert!(snapshot.is_error);
        assert!(!snapshot.is_connected);
        assert!(snapshot.can_retry);
        assert_eq!(
            snapshot.error_message.as_deref(),
            Some("permission denied: BLUETOOTH_SCAN")
        );

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["state"], "Error");
    }
}
