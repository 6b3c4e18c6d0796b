//! BLE 设备 profile
//!
//! 按名称关键字或广播服务 UUID 匹配扫描到的设备

use serde::{Deserialize, Serialize};
use uuid::{uuid, Uuid};

use super::models::BlePeripheral;

/// Nordic UART 服务 UUID
pub const NORDIC_UART_SERVICE: Uuid = uuid!("6e400001-b5a3-f393-e0a9-e50e24dcca9e");

/// 设备 profile 配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BleProfileConfig {
    pub id: String,
    pub display_name: String,
    #[serde(default)]
    pub name_keywords: Vec<String>,
    #[serde(default)]
    pub scan_service_uuids: Vec<Uuid>,
}

impl BleProfileConfig {
    /// 创建没有过滤条件的 profile
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            name_keywords: Vec::new(),
            scan_service_uuids: Vec::new(),
        }
    }

    /// 添加名称关键字
    pub fn with_keyword(mut self, keyword: impl Into<String>) -> Self {
        self.name_keywords.push(keyword.into());
        self
    }

    /// 添加广播服务 UUID
    pub fn with_service(mut self, service: Uuid) -> Self {
        self.scan_service_uuids.push(service);
        self
    }

    /// 默认的 BT311 录音笔 profile
    pub fn bt311() -> Self {
        Self::new("bt311", "BT311 / Nordic UART")
            .with_keyword("BT311")
            .with_service(NORDIC_UART_SERVICE)
    }

    /// 判断设备是否匹配
    ///
    /// 名称关键字（不区分大小写）或广播服务任一命中即匹配；
    /// 没有任何过滤条件的 profile 匹配所有设备
    pub fn matches(&self, device_name: Option<&str>, advertised_uuids: &[Uuid]) -> bool {
        if self.name_keywords.is_empty() && self.scan_service_uuids.is_empty() {
            return true;
        }

        let name = device_name.unwrap_or_default().to_lowercase();
        let keyword_hit = self
            .name_keywords
            .iter()
            .any(|keyword| name.contains(&keyword.to_lowercase()));
        let service_hit = self
            .scan_service_uuids
            .iter()
            .any(|uuid| advertised_uuids.contains(uuid));

        keyword_hit || service_hit
    }
}

/// profile 注册表
#[derive(Debug, Clone)]
pub struct BleProfileRegistry {
    profiles: Vec<BleProfileConfig>,
}

impl BleProfileRegistry {
    /// 使用给定 profile 创建注册表，为空时退回默认 profile
    pub fn new(profiles: Vec<BleProfileConfig>) -> Self {
        if profiles.is_empty() {
            return Self::default();
        }
        Self { profiles }
    }

    pub fn profiles(&self) -> &[BleProfileConfig] {
        &self.profiles
    }

    /// 查找第一个匹配的 profile
    pub fn find(&self, device_name: Option<&str>, advertised_uuids: &[Uuid]) -> Option<&BleProfileConfig> {
        self.profiles
            .iter()
            .find(|profile| profile.matches(device_name, advertised_uuids))
    }

    /// 将扫描结果解析为外设
    ///
    /// 未匹配任何 profile 的设备返回 None；设备名为空时使用 profile 显示名
    pub fn resolve(
        &self,
        address: &str,
        device_name: Option<&str>,
        signal_strength_dbm: i32,
        advertised_uuids: &[Uuid],
    ) -> Option<BlePeripheral> {
        let Some(profile) = self.find(device_name, advertised_uuids) else {
            tracing::debug!(address, "Ignoring device without matching profile");
            return None;
        };

        let name = match device_name.map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => profile.display_name.clone(),
        };

        tracing::debug!(address, name = %name, profile = %profile.id, "Discovered peripheral");
        Some(BlePeripheral::new(address, name, signal_strength_dbm).with_profile(profile.id.clone()))
    }
}

impl Default for BleProfileRegistry {
    fn default() -> Self {
        Self {
            profiles: vec![BleProfileConfig::bt311()],
        }
    }
}
