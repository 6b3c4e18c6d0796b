use std::sync::Arc;

use arc_swap::ArcSwap;
use serde::Serialize;
use tokio::sync::watch;

use super::error::{ConnectivityError, StateError, StateResult};
use super::models::{BleSession, ProvisioningStatus};

/// 设备连接状态
///
/// 任意时刻只有一个变体处于活动状态，仅由连接管理器驱动转换
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ConnectionState {
    /// 未连接
    Disconnected,

    /// 已选择外设，BLE 会话已建立
    Connected { session: BleSession },

    /// 正在配网
    Pairing {
        device_name: String,
        /// 进度百分比 (0 - 100)
        progress: u8,
        signal_strength_dbm: i32,
    },

    /// Wi-Fi 配网完成，等待心跳确认
    WifiProvisioned {
        session: BleSession,
        status: ProvisioningStatus,
    },

    /// 心跳已确认，设备同步中
    Syncing {
        session: BleSession,
        status: ProvisioningStatus,
        last_heartbeat_at_millis: i64,
    },

    /// 错误状态
    Error { error: ConnectivityError },
}

impl ConnectionState {
    /// 创建未连接状态
    pub fn disconnected() -> Self {
        Self::Disconnected
    }

    /// 创建已连接状态
    pub fn connected(session: BleSession) -> Self {
        Self::Connected { session }
    }

    /// 创建配网中状态
    pub fn pairing(device_name: impl Into<String>, progress: u8, signal_strength_dbm: i32) -> Self {
        Self::Pairing {
            device_name: device_name.into(),
            progress: progress.min(100),
            signal_strength_dbm,
        }
    }

    /// 创建配网完成状态
    pub fn wifi_provisioned(session: BleSession, status: ProvisioningStatus) -> Self {
        Self::WifiProvisioned { session, status }
    }

    /// 创建同步中状态
    pub fn syncing(session: BleSession, status: ProvisioningStatus, last_heartbeat_at_millis: i64) -> Self {
        Self::Syncing {
            session,
            status,
            last_heartbeat_at_millis,
        }
    }

    /// 创建错误状态
    pub fn error(error: ConnectivityError) -> Self {
        Self::Error { error }
    }

    pub fn is_disconnected(&self) -> bool {
        matches!(self, Self::Disconnected)
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected { .. })
    }

    pub fn is_pairing(&self) -> bool {
        matches!(self, Self::Pairing { .. })
    }

    pub fn is_wifi_provisioned(&self) -> bool {
        matches!(self, Self::WifiProvisioned { .. })
    }

    pub fn is_syncing(&self) -> bool {
        matches!(self, Self::Syncing { .. })
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }

    /// 设备是否已经联网（配网完成或同步中）
    pub fn is_ready(&self) -> bool {
        self.is_wifi_provisioned() || self.is_syncing()
    }

    /// 获取会话（如果当前状态携带）
    pub fn session(&self) -> Option<&BleSession> {
        match self {
            Self::Connected { session }
            | Self::WifiProvisioned { session, .. }
            | Self::Syncing { session, .. } => Some(session),
            _ => None,
        }
    }

    /// 获取配网结果（如果有）
    pub fn provisioning_status(&self) -> Option<&ProvisioningStatus> {
        match self {
            Self::WifiProvisioned { status, .. } | Self::Syncing { status, .. } => Some(status),
            _ => None,
        }
    }

    /// 获取错误（如果处于错误状态）
    pub fn connectivity_error(&self) -> Option<&ConnectivityError> {
        match self {
            Self::Error { error } => Some(error),
            _ => None,
        }
    }

    /// 设备显示名称
    pub fn device_name(&self) -> Option<&str> {
        match self {
            Self::Pairing { device_name, .. } => Some(device_name),
            _ => self.session().map(|s| s.peripheral_name.as_str()),
        }
    }

    /// 获取状态名称（用于日志和调试）
    pub fn name(&self) -> &'static str {
        match self {
            Self::Disconnected => "Disconnected",
            Self::Connected { .. } => "Connected",
            Self::Pairing { .. } => "Pairing",
            Self::WifiProvisioned { .. } => "WifiProvisioned",
            Self::Syncing { .. } => "Syncing",
            Self::Error { .. } => "Error",
        }
    }
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::Disconnected
    }
}

/// 连接状态存储
///
/// 当前状态保存在 ArcSwap 中供无锁读取，同时通过 watch 通道发布，
/// 迟到的订阅者会立即看到最新状态
pub struct ConnectionStateStore {
    state: ArcSwap<ConnectionState>,
    tx: watch::Sender<ConnectionState>,
}

impl ConnectionStateStore {
    /// 创建新的状态存储，初始为 Disconnected
    ///
    /// # Examples
    ///
    /// ```
    /// use smartsales_lib::connectivity::ConnectionStateStore;
    ///
    /// let store = ConnectionStateStore::new();
    /// assert!(store.current().is_disconnected());
    /// ```
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(ConnectionState::Disconnected);
        Self {
            state: ArcSwap::new(Arc::new(ConnectionState::Disconnected)),
            tx,
        }
    }

    /// 获取当前状态
    pub fn current(&self) -> Arc<ConnectionState> {
        self.state.load_full()
    }

    /// 订阅状态变更
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.tx.subscribe()
    }

    /// 转换到新状态
    ///
    /// # Errors
    ///
    /// 如果状态转换不合法，返回 [`StateError::InvalidTransition`]
    ///
    /// # Examples
    ///
    /// ```
    /// use smartsales_lib::connectivity::{ConnectionState, ConnectionStateStore};
    ///
    /// let store = ConnectionStateStore::new();
    /// assert!(store.transition(ConnectionState::pairing("BT311", 10, -50)).is_ok());
    /// assert!(store.transition(ConnectionState::pairing("BT311", 10, -50)).is_err());
    /// ```
    pub fn transition(&self, new_state: ConnectionState) -> StateResult<()> {
        let current = self.current();

        if !is_valid_transition(&current, &new_state) {
            return Err(StateError::InvalidTransition {
                from: current.name(),
                to: new_state.name(),
            });
        }

        tracing::debug!(from = current.name(), to = new_state.name(), "Connection state transition");
        self.publish(new_state);
        Ok(())
    }

    /// 强制设置状态（跳过验证）
    pub fn force_set(&self, new_state: ConnectionState) {
        self.publish(new_state);
    }

    /// 重置为 Disconnected
    pub fn reset(&self) {
        self.force_set(ConnectionState::Disconnected);
    }

    fn publish(&self, new_state: ConnectionState) {
        self.state.store(Arc::new(new_state.clone()));
        self.tx.send_replace(new_state);
    }
}

impl Default for ConnectionStateStore {
    fn default() -> Self {
        Self::new()
    }
}

/// 验证状态转换是否合法
fn is_valid_transition(from: &ConnectionState, to: &ConnectionState) -> bool {
    use ConnectionState::*;

    match (from, to) {
        // 忘记设备、重新选择外设总是允许
        (_, Disconnected) => true,
        (_, Connected { .. }) => true,

        // 同一时刻只允许一个配网流程
        (Pairing { .. }, Pairing { .. }) => false,
        (_, Pairing { .. }) => true,

        // 配网结果需要一个活动流程；Connected 由网络查询隐式确认
        (Disconnected, WifiProvisioned { .. }) => false,
        (_, WifiProvisioned { .. }) => true,

        // 心跳
        (WifiProvisioned { .. } | Syncing { .. }, Syncing { .. }) => true,

        (Disconnected, Error { .. }) => false,
        (_, Error { .. }) => true,

        _ => false,
    }
}
