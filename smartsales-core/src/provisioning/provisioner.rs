//! Wi-Fi provisioner contract and the gateway adapter
//!
//! The adapter is a pure translation layer: gateway outcomes in,
//! [`ConnectivityError`] out. Retries belong to the connection manager.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use super::gateway::{BleGateway, BleGatewayResult, HotspotResult, NetworkQueryResult};
use crate::connectivity::{
    BleSession, ConnectivityError, ConnectivityResult, DeviceNetworkStatus, ProvisioningStatus,
    WifiCredentials,
};

/// Uniform success/error contract consumed by the connection manager
#[async_trait]
pub trait WifiProvisioner: Send + Sync {
    async fn provision(
        &self,
        session: &BleSession,
        credentials: &WifiCredentials,
    ) -> ConnectivityResult<ProvisioningStatus>;

    async fn request_hotspot_credentials(&self, session: &BleSession) -> ConnectivityResult<WifiCredentials>;

    async fn query_network_status(&self, session: &BleSession) -> ConnectivityResult<DeviceNetworkStatus>;
}

#[async_trait]
impl<P: WifiProvisioner + ?Sized> WifiProvisioner for Arc<P> {
    async fn provision(
        &self,
        session: &BleSession,
        credentials: &WifiCredentials,
    ) -> ConnectivityResult<ProvisioningStatus> {
        (**self).provision(session, credentials).await
    }

    async fn request_hotspot_credentials(&self, session: &BleSession) -> ConnectivityResult<WifiCredentials> {
        (**self).request_hotspot_credentials(session).await
    }

    async fn query_network_status(&self, session: &BleSession) -> ConnectivityResult<DeviceNetworkStatus> {
        (**self).query_network_status(session).await
    }
}

fn device_missing(peripheral_id: &str) -> ConnectivityError {
    ConnectivityError::Transport(format!("device not found: {peripheral_id}"))
}

/// [`WifiProvisioner`] backed by a [`BleGateway`]
pub struct BleWifiProvisioner<G: BleGateway> {
    gateway: G,
}

impl<G: BleGateway> BleWifiProvisioner<G> {
    pub fn new(gateway: G) -> Self {
        Self { gateway }
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }
}

#[async_trait]
impl<G: BleGateway> WifiProvisioner for BleWifiProvisioner<G> {
    async fn provision(
        &self,
        session: &BleSession,
        credentials: &WifiCredentials,
    ) -> ConnectivityResult<ProvisioningStatus> {
        info!(device = %session.peripheral_name, ssid = %credentials.ssid, "Provisioning started");

        let outcome = match self.gateway.provision(session, credentials).await {
            BleGatewayResult::Success {
                handshake_id,
                credentials_hash,
            } => Ok(ProvisioningStatus::new(
                credentials.ssid.clone(),
                handshake_id,
                credentials_hash,
            )),
            BleGatewayResult::PermissionDenied(permissions) => {
                Err(ConnectivityError::PermissionDenied(permissions))
            }
            BleGatewayResult::Timeout(timeout_ms) => Err(ConnectivityError::Timeout(timeout_ms)),
            BleGatewayResult::TransportError(reason) => Err(ConnectivityError::Transport(reason)),
            BleGatewayResult::CredentialRejected(reason) => {
                Err(ConnectivityError::ProvisioningFailed(reason))
            }
            BleGatewayResult::DeviceMissing(id) => Err(device_missing(&id)),
        };

        info!(
            device = %session.peripheral_name,
            success = outcome.is_ok(),
            "Provisioning finished"
        );
        outcome
    }

    async fn request_hotspot_credentials(&self, session: &BleSession) -> ConnectivityResult<WifiCredentials> {
        info!(device = %session.peripheral_name, "Hotspot credentials requested");

        match self.gateway.request_hotspot(session).await {
            HotspotResult::Success(credentials) => Ok(credentials),
            HotspotResult::PermissionDenied(permissions) => Err(ConnectivityError::PermissionDenied(permissions)),
            HotspotResult::Timeout(timeout_ms) => Err(ConnectivityError::Timeout(timeout_ms)),
            HotspotResult::TransportError(reason) => Err(ConnectivityError::Transport(reason)),
            HotspotResult::DeviceMissing(id) => Err(device_missing(&id)),
        }
    }

    async fn query_network_status(&self, session: &BleSession) -> ConnectivityResult<DeviceNetworkStatus> {
        debug!(device = %session.peripheral_name, "Network status query");

        match self.gateway.query_network(session).await {
            NetworkQueryResult::Success(status) => Ok(status),
            NetworkQueryResult::PermissionDenied(permissions) => {
                Err(ConnectivityError::PermissionDenied(permissions))
            }
            NetworkQueryResult::Timeout(timeout_ms) => Err(ConnectivityError::Timeout(timeout_ms)),
            NetworkQueryResult::TransportError(reason) => Err(ConnectivityError::Transport(reason)),
            NetworkQueryResult::DeviceMissing(id) => Err(device_missing(&id)),
        }
    }
}
