//! 连接模块的公共数据结构
//!
//! 扫描得到的外设、配对会话、Wi-Fi 凭据以及配网/网络查询结果

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 扫描发现的 BLE 外设
///
/// 不可变快照，按值复制
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlePeripheral {
    /// 稳定的地址/标识
    pub id: String,
    /// 显示名称
    pub name: String,
    /// 信号强度 (dBm)
    pub signal_strength_dbm: i32,
    /// 匹配的设备 profile（None 表示动态匹配）
    pub profile_id: Option<String>,
}

impl BlePeripheral {
    /// 创建外设快照
    pub fn new(id: impl Into<String>, name: impl Into<String>, signal_strength_dbm: i32) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            signal_strength_dbm,
            profile_id: None,
        }
    }

    /// 设置 profile id
    pub fn with_profile(mut self, profile_id: impl Into<String>) -> Self {
        self.profile_id = Some(profile_id.into());
        self
    }
}

/// 已建立的配对会话
///
/// 由连接管理器持有，断开或忘记设备时丢弃
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BleSession {
    pub peripheral_id: String,
    pub peripheral_name: String,
    pub signal_strength_dbm: i32,
    pub profile_id: Option<String>,
    /// 会话令牌，每次选择外设时重新生成
    pub secure_token: String,
    /// 建立时间（毫秒时间戳）
    pub established_at_millis: i64,
}

impl BleSession {
    /// 从外设创建会话，使用当前时间
    pub fn from_peripheral(peripheral: &BlePeripheral) -> Self {
        Self::from_peripheral_at(peripheral, chrono::Utc::now().timestamp_millis())
    }

    /// 从外设创建会话，使用指定时间戳
    pub fn from_peripheral_at(peripheral: &BlePeripheral, timestamp_millis: i64) -> Self {
        Self {
            peripheral_id: peripheral.id.clone(),
            peripheral_name: peripheral.name.clone(),
            signal_strength_dbm: peripheral.signal_strength_dbm,
            profile_id: peripheral.profile_id.clone(),
            secure_token: Uuid::new_v4().to_string(),
            established_at_millis: timestamp_millis,
        }
    }
}

/// Wi-Fi 加密方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WifiSecurity {
    #[default]
    Wpa2,
    Wpa3,
}

/// Wi-Fi 凭据
///
/// 瞬时值对象，从不持久化
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WifiCredentials {
    pub ssid: String,
    pub password: String,
    #[serde(default)]
    pub security: WifiSecurity,
}

impl WifiCredentials {
    /// 创建 WPA2 凭据
    pub fn new(ssid: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            ssid: ssid.into(),
            password: password.into(),
            security: WifiSecurity::Wpa2,
        }
    }

    /// 设置加密方式
    pub fn with_security(mut self, security: WifiSecurity) -> Self {
        self.security = security;
        self
    }
}

// 密码不进入日志
impl std::fmt::Debug for WifiCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WifiCredentials")
            .field("ssid", &self.ssid)
            .field("password", &"***")
            .field("security", &self.security)
            .finish()
    }
}

/// 配网握手成功的结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisioningStatus {
    pub wifi_ssid: String,
    pub handshake_id: String,
    pub credentials_hash: String,
}

impl ProvisioningStatus {
    pub fn new(
        wifi_ssid: impl Into<String>,
        handshake_id: impl Into<String>,
        credentials_hash: impl Into<String>,
    ) -> Self {
        Self {
            wifi_ssid: wifi_ssid.into(),
            handshake_id: handshake_id.into(),
            credentials_hash: credentials_hash.into(),
        }
    }
}

/// 设备网络可达性记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceNetworkStatus {
    pub ip_address: String,
    pub device_wifi_name: String,
    pub phone_wifi_name: String,
    /// 设备原始响应，用于诊断
    pub raw_response: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_from_peripheral() {
        let peripheral = BlePeripheral::new("1", "BT311", -50).with_profile("bt311");
        let session = BleSession::from_peripheral_at(&peripheral, 42);

        assert_eq!(session.peripheral_id, "1");
        assert_eq!(session.peripheral_name, "BT311");
        assert_eq!(session.signal_strength_dbm, -50);
        assert_eq!(session.profile_id.as_deref(), Some("bt311"));
        assert_eq!(session.established_at_millis, 42);
        assert!(!session.secure_token.is_empty());
    }

    #[test]
    fn test_sessions_get_fresh_tokens() {
        let peripheral = BlePeripheral::new("1", "BT311", -50);
        let a = BleSession::from_peripheral(&peripheral);
        let b = BleSession::from_peripheral(&peripheral);
        assert_ne!(a.secure_token, b.secure_token);
    }

    #[test]
    fn test_credentials_debug_hides_password() {
        let credentials = WifiCredentials::new("Office", "strongPass12");
        let debug = format!("{:?}", credentials);
        assert!(debug.contains("Office"));
        assert!(!debug.contains("strongPass12"));
        assert_eq!(credentials.security, WifiSecurity::Wpa2);
    }

    #[test]
    fn test_credentials_default_security_on_deserialize() {
        let credentials: WifiCredentials =
            serde_json::from_str(r#"{"ssid":"Office","password":"strongPass12"}"#).unwrap();
        assert_eq!(credentials.security, WifiSecurity::Wpa2);
    }
}
