//! Payload codec for the device's characteristic protocol
//!
//! The device speaks two dialects: `#`-delimited command strings and
//! small JSON objects. Both are accepted on every read path.

use serde_json::Value;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::error::{CodecError, CodecResult};
use crate::connectivity::{DeviceNetworkStatus, WifiCredentials};

/// Command asking the device for its IP and joined network
pub const NETWORK_QUERY_COMMAND: &str = "wifi#address#ip#name";

/// Device Wi-Fi name used when the device does not report one
pub const DEFAULT_DEVICE_WIFI: &str = "BT311";

const SEPARATOR: char = '#';

/// Decoded provisioning acknowledgement
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvisioningAck {
    Accepted {
        handshake_id: String,
        credentials_hash: String,
    },
    Rejected(String),
}

/// Lower-case hex SHA-256 of `input`
pub fn sha256_hex(input: &str) -> String {
    Sha256::digest(input.as_bytes())
        .iter()
        .map(|byte| format!("{:02x}", byte))
        .collect()
}

/// Hash the device is expected to derive from the credentials
pub fn credentials_hash(credentials: &WifiCredentials) -> String {
    sha256_hex(&format!("{}{}", credentials.ssid, credentials.password))
}

/// Encode `wifi#connect#<ssid>#<password>`
///
/// `#` inside a segment would split it on the device side, so it becomes `-`.
pub fn encode_credentials(credentials: &WifiCredentials) -> Vec<u8> {
    [
        "wifi",
        "connect",
        &sanitize_segment(&credentials.ssid),
        &sanitize_segment(&credentials.password),
    ]
    .join("#")
    .into_bytes()
}

/// Encode the network status query
pub fn encode_network_query() -> Vec<u8> {
    NETWORK_QUERY_COMMAND.as_bytes().to_vec()
}

fn sanitize_segment(input: &str) -> String {
    input.replace(SEPARATOR, "-")
}

fn decode_text(payload: &[u8]) -> CodecResult<String> {
    let raw = String::from_utf8_lossy(payload).trim().to_string();
    if raw.is_empty() {
        return Err(CodecError::Empty);
    }
    Ok(raw)
}

/// First non-blank string value among `keys`
fn string_field(json: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| json.get(*key).and_then(Value::as_str))
        .map(str::trim)
        .find(|value| !value.is_empty())
        .map(str::to_string)
}

/// Decode the device's answer to a credentials write
pub fn decode_provisioning_ack(
    credentials: &WifiCredentials,
    payload: &[u8],
) -> CodecResult<ProvisioningAck> {
    let raw = decode_text(payload)?;
    if raw.starts_with('{') {
        decode_ack_json(credentials, &raw)
    } else {
        decode_ack_delimited(credentials, &raw)
    }
}

fn decode_ack_json(credentials: &WifiCredentials, raw: &str) -> CodecResult<ProvisioningAck> {
    let json: Value = serde_json::from_str(raw)?;

    if json.get("rejected").and_then(Value::as_bool).unwrap_or(false) {
        let reason = string_field(&json, &["reason"]).unwrap_or_else(|| "invalid credentials".to_string());
        return Ok(ProvisioningAck::Rejected(reason));
    }

    Ok(ProvisioningAck::Accepted {
        handshake_id: string_field(&json, &["handshake_id"])
            .unwrap_or_else(|| Uuid::new_v4().to_string()),
        credentials_hash: string_field(&json, &["credentials_hash"])
            .unwrap_or_else(|| credentials_hash(credentials)),
    })
}

fn decode_ack_delimited(credentials: &WifiCredentials, raw: &str) -> CodecResult<ProvisioningAck> {
    let parts: Vec<&str> = raw.split(SEPARATOR).collect();
    if parts.len() < 3 {
        return Err(CodecError::Malformed(raw.to_string()));
    }
    if !parts[0].eq_ignore_ascii_case("wifi") || !parts[1].eq_ignore_ascii_case("connect") {
        return Err(CodecError::Malformed(format!("unexpected acknowledgement: {raw}")));
    }

    let detail = parts
        .get(3)
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string);
    match parts[2].to_ascii_lowercase().as_str() {
        "ok" | "success" | "connected" => Ok(ProvisioningAck::Accepted {
            handshake_id: detail.unwrap_or_else(|| Uuid::new_v4().to_string()),
            credentials_hash: credentials_hash(credentials),
        }),
        _ => Ok(ProvisioningAck::Rejected(
            detail.unwrap_or_else(|| format!("credentials rejected by device: {raw}")),
        )),
    }
}

/// Decode the device's answer to [`NETWORK_QUERY_COMMAND`]
pub fn decode_network_status(payload: &[u8]) -> CodecResult<DeviceNetworkStatus> {
    let raw = decode_text(payload)?;
    let (ip_address, device_wifi, phone_wifi) = if raw.starts_with('{') {
        let json: Value = serde_json::from_str(&raw)?;
        (
            string_field(&json, &["ip", "ipAddress"]),
            string_field(&json, &["device_wifi", "deviceName"]),
            string_field(&json, &["phone_wifi", "phoneName"]),
        )
    } else {
        let parts: Vec<&str> = raw.split(SEPARATOR).collect();
        if parts.len() < 4 {
            return Err(CodecError::Malformed(raw.clone()));
        }
        if !parts[0].eq_ignore_ascii_case("wifi") || !parts[1].eq_ignore_ascii_case("address") {
            return Err(CodecError::Malformed(format!("unexpected network response: {raw}")));
        }
        let field = |index: usize| {
            parts
                .get(index)
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        (field(2), field(3), field(4))
    };

    let ip_address = ip_address.ok_or(CodecError::MissingField("ip"))?;
    let device_wifi_name = device_wifi.unwrap_or_else(|| DEFAULT_DEVICE_WIFI.to_string());
    let phone_wifi_name = phone_wifi.unwrap_or_else(|| device_wifi_name.clone());

    Ok(DeviceNetworkStatus {
        ip_address,
        device_wifi_name,
        phone_wifi_name,
        raw_response: raw,
    })
}

/// Decode hotspot credentials; both fields are required
pub fn decode_hotspot(payload: &[u8]) -> CodecResult<WifiCredentials> {
    let raw = decode_text(payload)?;
    let json: Value = serde_json::from_str(&raw)?;

    let ssid = string_field(&json, &["ssid"]).ok_or(CodecError::MissingField("ssid"))?;
    let password = string_field(&json, &["password"]).ok_or(CodecError::MissingField("password"))?;
    Ok(WifiCredentials::new(ssid, password))
}
