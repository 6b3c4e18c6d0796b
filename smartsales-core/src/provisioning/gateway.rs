//! Transport gateway contract
//!
//! A gateway talks to one physical device and reports every call as a
//! closed outcome enum. Nothing here returns `Err`.

use std::collections::BTreeSet;

use async_trait::async_trait;

use crate::connectivity::{BlePeripheral, BleSession, DeviceNetworkStatus, WifiCredentials};

/// Outcome of a provisioning handshake
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BleGatewayResult {
    Success {
        handshake_id: String,
        credentials_hash: String,
    },
    PermissionDenied(BTreeSet<String>),
    /// Carries the bound of the step that expired
    Timeout(u64),
    TransportError(String),
    /// Device answered but refused the credentials
    CredentialRejected(String),
    DeviceMissing(String),
}

/// Outcome of a hotspot credential request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HotspotResult {
    Success(WifiCredentials),
    PermissionDenied(BTreeSet<String>),
    Timeout(u64),
    TransportError(String),
    DeviceMissing(String),
}

/// Outcome of a network status query
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkQueryResult {
    Success(DeviceNetworkStatus),
    PermissionDenied(BTreeSet<String>),
    Timeout(u64),
    TransportError(String),
    DeviceMissing(String),
}

/// Device-facing transport
#[async_trait]
pub trait BleGateway: Send + Sync {
    /// Send Wi-Fi credentials and wait for the device acknowledgement
    async fn provision(&self, session: &BleSession, credentials: &WifiCredentials) -> BleGatewayResult;

    /// Ask the device for its hotspot credentials
    async fn request_hotspot(&self, session: &BleSession) -> HotspotResult;

    /// Ask the device which network it joined
    async fn query_network(&self, session: &BleSession) -> NetworkQueryResult;

    /// Drop anything cached for this peripheral
    fn forget(&self, peripheral: &BlePeripheral);
}
