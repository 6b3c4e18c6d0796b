//! Wi-Fi provisioning over BLE
//!
//! Provides the transport gateway contract, a GATT implementation with its
//! payload codec, and the [`WifiProvisioner`] seam used by the connection
//! manager.
//!
//! # Module Structure
//!
//! - `gateway` - Gateway trait and outcome enums
//! - `gatt` - GATT characteristic transport and gateway
//! - `codec` - Device payload encoding/decoding
//! - `provisioner` - Gateway-to-error adapter
//! - `simulated` - Offline provisioner
//! - `error` - Transport and codec errors

pub mod codec;
mod error;
mod gateway;
mod gatt;
mod provisioner;
mod simulated;

pub use codec::{ProvisioningAck, DEFAULT_DEVICE_WIFI, NETWORK_QUERY_COMMAND};
pub use error::{CodecError, CodecResult, GatewayError, GatewayResult};
pub use gateway::{BleGateway, BleGatewayResult, HotspotResult, NetworkQueryResult};
pub use gatt::{
    BleGatewayConfig, GattBleGateway, GattLayout, GattTransport, DEFAULT_CONNECTION_TIMEOUT_MS,
    DEFAULT_OPERATION_TIMEOUT_MS, NORDIC_UART_RX, NORDIC_UART_TX,
};
pub use provisioner::{BleWifiProvisioner, WifiProvisioner};
pub use simulated::{SimulatedWifiProvisioner, MIN_PASSWORD_LENGTH};
