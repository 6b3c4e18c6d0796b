//! GATT-backed gateway
//!
//! Drives the device over an abstract characteristic transport. Platform
//! BLE stacks plug in by implementing [`GattTransport`].

use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::{uuid, Uuid};

use super::codec::{self, ProvisioningAck};
use super::error::{CodecError, GatewayError, GatewayResult};
use super::gateway::{BleGateway, BleGatewayResult, HotspotResult, NetworkQueryResult};
use crate::config::ConnectivityConfig;
use crate::connectivity::{
    BlePeripheral, BleSession, DeviceNetworkStatus, WifiCredentials, NORDIC_UART_SERVICE,
};

/// Nordic UART RX characteristic (phone writes)
pub const NORDIC_UART_RX: Uuid = uuid!("6e400002-b5a3-f393-e0a9-e50e24dcca9e");

/// Nordic UART TX characteristic (device notifies)
pub const NORDIC_UART_TX: Uuid = uuid!("6e400003-b5a3-f393-e0a9-e50e24dcca9e");

/// Default connection timeout in milliseconds
pub const DEFAULT_CONNECTION_TIMEOUT_MS: u64 = 10_000;

/// Default per-operation timeout in milliseconds
pub const DEFAULT_OPERATION_TIMEOUT_MS: u64 = 5_000;

/// Service and characteristics used for provisioning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GattLayout {
    pub service: Uuid,
    /// Credentials and commands are written here
    pub command: Uuid,
    /// Acknowledgements arrive here
    pub status: Uuid,
    /// Hotspot credentials are read from here
    pub hotspot: Uuid,
}

impl Default for GattLayout {
    fn default() -> Self {
        Self {
            service: NORDIC_UART_SERVICE,
            command: NORDIC_UART_RX,
            status: NORDIC_UART_TX,
            hotspot: NORDIC_UART_TX,
        }
    }
}

/// Gateway configuration
///
/// # Example
/// ```
/// use smartsales_lib::provisioning::BleGatewayConfig;
///
/// let config = BleGatewayConfig::new()
///     .with_operation_timeout(3_000)
///     .with_connection_timeout(8_000);
/// assert_eq!(config.operation_timeout_ms, 3_000);
/// ```
#[derive(Debug, Clone)]
pub struct BleGatewayConfig {
    /// Layout used when the transport cannot discover one
    pub layout: GattLayout,
    pub connection_timeout_ms: u64,
    pub operation_timeout_ms: u64,
}

impl BleGatewayConfig {
    pub fn new() -> Self {
        Self {
            layout: GattLayout::default(),
            connection_timeout_ms: DEFAULT_CONNECTION_TIMEOUT_MS,
            operation_timeout_ms: DEFAULT_OPERATION_TIMEOUT_MS,
        }
    }

    pub fn with_layout(mut self, layout: GattLayout) -> Self {
        self.layout = layout;
        self
    }

    pub fn with_connection_timeout(mut self, timeout_ms: u64) -> Self {
        self.connection_timeout_ms = timeout_ms;
        self
    }

    pub fn with_operation_timeout(mut self, timeout_ms: u64) -> Self {
        self.operation_timeout_ms = timeout_ms;
        self
    }
}

impl Default for BleGatewayConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&ConnectivityConfig> for BleGatewayConfig {
    fn from(config: &ConnectivityConfig) -> Self {
        Self::new()
            .with_connection_timeout(config.connection_timeout_ms)
            .with_operation_timeout(config.operation_timeout_ms)
    }
}

/// Characteristic-level BLE transport
///
/// One connection at a time; the gateway serialises calls.
#[async_trait]
pub trait GattTransport: Send + Sync {
    /// Open a link to the peripheral
    async fn connect(&self, peripheral_id: &str) -> GatewayResult<()>;

    /// Inspect the connected device's services
    ///
    /// `None` means the configured default layout applies.
    async fn discover(&self) -> GatewayResult<Option<GattLayout>> {
        Ok(None)
    }

    async fn write(&self, service: Uuid, characteristic: Uuid, payload: &[u8]) -> GatewayResult<()>;

    async fn read(&self, service: Uuid, characteristic: Uuid) -> GatewayResult<Vec<u8>>;

    /// Wait for the next notification on `characteristic`
    async fn await_notification(&self, service: Uuid, characteristic: Uuid) -> GatewayResult<Vec<u8>>;

    async fn disconnect(&self);
}

/// Why a gateway step failed
#[derive(Debug)]
enum StepFailure {
    Timeout(u64),
    Gateway(GatewayError),
    Codec(CodecError),
}

impl From<GatewayError> for StepFailure {
    fn from(err: GatewayError) -> Self {
        StepFailure::Gateway(err)
    }
}

impl From<CodecError> for StepFailure {
    fn from(err: CodecError) -> Self {
        StepFailure::Codec(err)
    }
}

impl StepFailure {
    fn into_provisioning_result(self) -> BleGatewayResult {
        match self {
            StepFailure::Timeout(timeout_ms) => BleGatewayResult::Timeout(timeout_ms),
            StepFailure::Gateway(GatewayError::DeviceNotFound(id)) => BleGatewayResult::DeviceMissing(id),
            StepFailure::Gateway(GatewayError::PermissionDenied(permissions)) => {
                BleGatewayResult::PermissionDenied(permissions)
            }
            StepFailure::Gateway(GatewayError::CredentialRejected(reason)) => {
                BleGatewayResult::CredentialRejected(reason)
            }
            StepFailure::Gateway(err) => BleGatewayResult::TransportError(err.to_string()),
            StepFailure::Codec(err) => BleGatewayResult::TransportError(err.to_string()),
        }
    }
}

/// [`BleGateway`] over a [`GattTransport`]
pub struct GattBleGateway<T: GattTransport> {
    transport: T,
    config: BleGatewayConfig,
    /// Serialises link usage
    lock: Mutex<()>,
    /// Discovered layouts keyed by peripheral id
    layouts: StdMutex<HashMap<String, GattLayout>>,
}

impl<T: GattTransport> GattBleGateway<T> {
    pub fn new(transport: T, config: BleGatewayConfig) -> Self {
        Self {
            transport,
            config,
            lock: Mutex::new(()),
            layouts: StdMutex::new(HashMap::new()),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    async fn timed<R>(
        &self,
        timeout_ms: u64,
        step: impl Future<Output = GatewayResult<R>>,
    ) -> Result<R, StepFailure> {
        match tokio::time::timeout(Duration::from_millis(timeout_ms), step).await {
            Ok(result) => result.map_err(StepFailure::from),
            Err(_) => Err(StepFailure::Timeout(timeout_ms)),
        }
    }

    fn cached_layout(&self, peripheral_id: &str) -> Option<GattLayout> {
        self.layouts
            .lock()
            .ok()
            .and_then(|layouts| layouts.get(peripheral_id).copied())
    }

    fn cache_layout(&self, peripheral_id: &str, layout: GattLayout) {
        if let Ok(mut layouts) = self.layouts.lock() {
            layouts.insert(peripheral_id.to_string(), layout);
        }
    }

    /// Connect, resolve the layout, run `op`, disconnect
    async fn execute<R, F, Fut>(&self, peripheral_id: &str, op: F) -> Result<R, StepFailure>
    where
        F: FnOnce(GattLayout) -> Fut,
        Fut: Future<Output = Result<R, StepFailure>>,
    {
        let _guard = self.lock.lock().await;

        self.timed(self.config.connection_timeout_ms, self.transport.connect(peripheral_id))
            .await?;

        let result = async {
            let layout = match self.cached_layout(peripheral_id) {
                Some(layout) => layout,
                None => {
                    let layout = self
                        .timed(self.config.operation_timeout_ms, self.transport.discover())
                        .await?
                        .unwrap_or(self.config.layout);
                    info!(
                        peripheral = peripheral_id,
                        service = %layout.service,
                        command = %layout.command,
                        status = %layout.status,
                        "Resolved GATT layout"
                    );
                    self.cache_layout(peripheral_id, layout);
                    layout
                }
            };
            op(layout).await
        }
        .await;

        self.transport.disconnect().await;
        result
    }

    async fn write(&self, layout: &GattLayout, payload: &[u8]) -> Result<(), StepFailure> {
        self.timed(
            self.config.operation_timeout_ms,
            self.transport.write(layout.service, layout.command, payload),
        )
        .await
    }

    /// Prefer the notification; fall back to a plain read if none arrives
    async fn await_status(&self, layout: &GattLayout) -> Result<Vec<u8>, StepFailure> {
        match self
            .timed(
                self.config.operation_timeout_ms,
                self.transport.await_notification(layout.service, layout.status),
            )
            .await
        {
            Err(StepFailure::Timeout(_)) => {
                debug!("No notification, reading status characteristic");
                self.timed(
                    self.config.operation_timeout_ms,
                    self.transport.read(layout.service, layout.status),
                )
                .await
            }
            other => other,
        }
    }
}

#[async_trait]
impl<T: GattTransport> BleGateway for GattBleGateway<T> {
    async fn provision(&self, session: &BleSession, credentials: &WifiCredentials) -> BleGatewayResult {
        let outcome = self
            .execute(&session.peripheral_id, |layout| async move {
                self.write(&layout, &codec::encode_credentials(credentials)).await?;
                let ack = self.await_status(&layout).await?;
                Ok::<_, StepFailure>(codec::decode_provisioning_ack(credentials, &ack)?)
            })
            .await;

        match outcome {
            Ok(ProvisioningAck::Accepted {
                handshake_id,
                credentials_hash,
            }) => BleGatewayResult::Success {
                handshake_id,
                credentials_hash,
            },
            Ok(ProvisioningAck::Rejected(reason)) => BleGatewayResult::CredentialRejected(reason),
            Err(failure) => {
                warn!(device = %session.peripheral_name, ?failure, "Provisioning handshake failed");
                failure.into_provisioning_result()
            }
        }
    }

    async fn request_hotspot(&self, session: &BleSession) -> HotspotResult {
        let outcome = self
            .execute(&session.peripheral_id, |layout| async move {
                let payload = self
                    .timed(
                        self.config.operation_timeout_ms,
                        self.transport.read(layout.service, layout.hotspot),
                    )
                    .await?;
                Ok::<_, StepFailure>(codec::decode_hotspot(&payload)?)
            })
            .await;

        match outcome {
            Ok(credentials) => HotspotResult::Success(credentials),
            Err(failure) => match failure.into_provisioning_result() {
                BleGatewayResult::PermissionDenied(p) => HotspotResult::PermissionDenied(p),
                BleGatewayResult::Timeout(timeout_ms) => HotspotResult::Timeout(timeout_ms),
                BleGatewayResult::DeviceMissing(id) => HotspotResult::DeviceMissing(id),
                BleGatewayResult::TransportError(reason) | BleGatewayResult::CredentialRejected(reason) => {
                    HotspotResult::TransportError(reason)
                }
                BleGatewayResult::Success { .. } => {
                    HotspotResult::TransportError("unexpected gateway outcome".to_string())
                }
            },
        }
    }

    async fn query_network(&self, session: &BleSession) -> NetworkQueryResult {
        let outcome: Result<DeviceNetworkStatus, StepFailure> = self
            .execute(&session.peripheral_id, |layout| async move {
                self.write(&layout, &codec::encode_network_query()).await?;
                let response = self.await_status(&layout).await?;
                Ok::<_, StepFailure>(codec::decode_network_status(&response)?)
            })
            .await;

        match outcome {
            Ok(status) => NetworkQueryResult::Success(status),
            Err(failure) => match failure.into_provisioning_result() {
                BleGatewayResult::PermissionDenied(p) => NetworkQueryResult::PermissionDenied(p),
                BleGatewayResult::Timeout(timeout_ms) => NetworkQueryResult::Timeout(timeout_ms),
                BleGatewayResult::DeviceMissing(id) => NetworkQueryResult::DeviceMissing(id),
                BleGatewayResult::TransportError(reason) | BleGatewayResult::CredentialRejected(reason) => {
                    NetworkQueryResult::TransportError(reason)
                }
                BleGatewayResult::Success { .. } => {
                    NetworkQueryResult::TransportError("unexpected gateway outcome".to_string())
                }
            },
        }
    }

    fn forget(&self, peripheral: &BlePeripheral) {
        if let Ok(mut layouts) = self.layouts.lock() {
            layouts.remove(&peripheral.id);
        }
    }
}
