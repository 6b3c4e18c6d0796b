//! 设备连接模块
//!
//! BLE 外设选择、Wi-Fi 配网和心跳确认的状态机
//!
//! # 模块结构
//!
//! - `models` - 外设、会话、凭据等数据结构
//! - `error` - 连接错误类型
//! - `state` - 连接状态与状态存储
//! - `manager` - 连接管理器
//! - `snapshot` - 面向 UI 的状态快照
//! - `profile` - BLE 设备 profile 匹配

mod error;
mod manager;
mod models;
mod profile;
mod snapshot;
mod state;

pub use error::{ConnectivityError, ConnectivityResult, StateError, StateResult};
pub use manager::{DeviceConnectionManager, PAIRING_START_PROGRESS};
pub use models::{
    BlePeripheral, BleSession, DeviceNetworkStatus, ProvisioningStatus, WifiCredentials,
    WifiSecurity,
};
pub use profile::{BleProfileConfig, BleProfileRegistry, NORDIC_UART_SERVICE};
pub use snapshot::ConnectionSnapshot;
pub use state::{ConnectionState, ConnectionStateStore};
