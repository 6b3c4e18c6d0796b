//! Offline provisioner for demos and development builds

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;

use super::codec::sha256_hex;
use super::provisioner::WifiProvisioner;
use crate::connectivity::{
    BleSession, ConnectivityError, ConnectivityResult, DeviceNetworkStatus, ProvisioningStatus,
    WifiCredentials,
};

/// Shortest password the simulated device accepts
pub const MIN_PASSWORD_LENGTH: usize = 8;

const PROVISIONING_DELAY_MS: u64 = 500;
const HOTSPOT_DELAY_MS: u64 = 250;
const NETWORK_QUERY_DELAY_MS: u64 = 400;

/// Provisioner that answers like a device without touching any radio
///
/// Results are deterministic for a given peripheral name.
#[derive(Default)]
pub struct SimulatedWifiProvisioner {
    /// Last SSID provisioned per peripheral id
    provisioned: Mutex<HashMap<String, String>>,
}

impl SimulatedWifiProvisioner {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Stable 32-bit seed derived from a peripheral name
fn seed(name: &str) -> u32 {
    let digest = Sha256::digest(name.as_bytes());
    u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]])
}

#[async_trait]
impl WifiProvisioner for SimulatedWifiProvisioner {
    async fn provision(
        &self,
        session: &BleSession,
        credentials: &WifiCredentials,
    ) -> ConnectivityResult<ProvisioningStatus> {
        tokio::time::sleep(Duration::from_millis(PROVISIONING_DELAY_MS)).await;

        if credentials.password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(ConnectivityError::ProvisioningFailed(format!(
                "Wi-Fi password needs at least {MIN_PASSWORD_LENGTH} characters"
            )));
        }

        let digest = sha256_hex(&format!(
            "{}{}{}",
            credentials.ssid, credentials.password, session.secure_token
        ));
        self.provisioned
            .lock()
            .await
            .insert(session.peripheral_id.clone(), credentials.ssid.clone());

        Ok(ProvisioningStatus::new(
            credentials.ssid.clone(),
            format!("sim-{}", &digest[..12]),
            digest,
        ))
    }

    async fn request_hotspot_credentials(&self, session: &BleSession) -> ConnectivityResult<WifiCredentials> {
        tokio::time::sleep(Duration::from_millis(HOTSPOT_DELAY_MS)).await;

        let prefix: String = session.peripheral_name.chars().take(6).collect();
        let password = 10_000_000 + seed(&session.peripheral_name) % 90_000_000;
        Ok(WifiCredentials::new(
            format!("SmartSales-{prefix}"),
            password.to_string(),
        ))
    }

    async fn query_network_status(&self, session: &BleSession) -> ConnectivityResult<DeviceNetworkStatus> {
        tokio::time::sleep(Duration::from_millis(NETWORK_QUERY_DELAY_MS)).await;

        let ip = format!("192.168.50.{}", 10 + seed(&session.peripheral_name) % 190);
        let device_wifi = match self.provisioned.lock().await.get(&session.peripheral_id) {
            Some(ssid) if !ssid.trim().is_empty() => ssid.clone(),
            _ => {
                let chars: Vec<char> = session.peripheral_name.chars().collect();
                let suffix: String = chars[chars.len().saturating_sub(2)..].iter().collect();
                format!("BT311-{suffix}")
            }
        };

        Ok(DeviceNetworkStatus {
            raw_response: format!("wifi#address#{ip}#{device_wifi}#"),
            ip_address: ip,
            device_wifi_name: device_wifi,
            phone_wifi_name: String::new(),
        })
    }
}
