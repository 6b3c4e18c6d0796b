//! GATT gateway and provisioner tests over a fake characteristic transport

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use smartsales_lib::connectivity::{
    BlePeripheral, BleSession, ConnectivityError, WifiCredentials, NORDIC_UART_SERVICE,
};
use smartsales_lib::provisioning::{
    codec, BleGateway, BleGatewayConfig, BleGatewayResult, BleWifiProvisioner, GatewayError,
    GatewayResult, GattBleGateway, GattLayout, GattTransport, NetworkQueryResult, WifiProvisioner,
    NORDIC_UART_RX, NORDIC_UART_TX,
};
use uuid::{uuid, Uuid};

const CUSTOM_SERVICE: Uuid = uuid!("0000ffe0-0000-1000-8000-00805f9b34fb");
const CUSTOM_COMMAND: Uuid = uuid!("0000ffe1-0000-1000-8000-00805f9b34fb");

#[derive(Default)]
struct FakeTransport {
    connect_error: Option<GatewayError>,
    hang_on_connect: bool,
    hang_on_read: bool,
    layout: Option<GattLayout>,
    /// Notification payloads; an empty queue never notifies
    notifications: Mutex<VecDeque<Vec<u8>>>,
    reads: Mutex<HashMap<Uuid, Vec<u8>>>,
    writes: Mutex<Vec<(Uuid, Uuid, Vec<u8>)>>,
    discover_calls: AtomicUsize,
    disconnects: AtomicUsize,
}

impl FakeTransport {
    fn notifying(payload: &str) -> Self {
        let transport = Self::default();
        transport.notifications.lock().unwrap().push_back(payload.as_bytes().to_vec());
        transport
    }

    fn with_read(self, characteristic: Uuid, payload: &str) -> Self {
        self.reads.lock().unwrap().insert(characteristic, payload.as_bytes().to_vec());
        self
    }

    fn writes(&self) -> Vec<(Uuid, Uuid, Vec<u8>)> {
        self.writes.lock().unwrap().clone()
    }
}

#[async_trait]
impl GattTransport for FakeTransport {
    async fn connect(&self, peripheral_id: &str) -> GatewayResult<()> {
        if self.hang_on_connect {
            std::future::pending::<()>().await;
        }
        match &self.connect_error {
            Some(GatewayError::DeviceNotFound(_)) => Err(GatewayError::DeviceNotFound(peripheral_id.to_string())),
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    async fn discover(&self) -> GatewayResult<Option<GattLayout>> {
        self.discover_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.layout)
    }

    async fn write(&self, service: Uuid, characteristic: Uuid, payload: &[u8]) -> GatewayResult<()> {
        self.writes.lock().unwrap().push((service, characteristic, payload.to_vec()));
        Ok(())
    }

    async fn read(&self, _service: Uuid, characteristic: Uuid) -> GatewayResult<Vec<u8>> {
        if self.hang_on_read {
            std::future::pending::<()>().await;
        }
        self.reads
            .lock()
            .unwrap()
            .get(&characteristic)
            .cloned()
            .ok_or(GatewayError::CharacteristicNotFound(characteristic))
    }

    async fn await_notification(&self, _service: Uuid, _characteristic: Uuid) -> GatewayResult<Vec<u8>> {
        let next = self.notifications.lock().unwrap().pop_front();
        match next {
            Some(payload) => Ok(payload),
            None => std::future::pending().await,
        }
    }

    async fn disconnect(&self) {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
    }
}

fn session() -> BleSession {
    BleSession::from_peripheral_at(&BlePeripheral::new("1", "BT311", -50), 0)
}

fn office() -> WifiCredentials {
    WifiCredentials::new("Office", "strongPass12")
}

fn gateway(transport: FakeTransport) -> GattBleGateway<FakeTransport> {
    GattBleGateway::new(
        transport,
        BleGatewayConfig::new()
            .with_connection_timeout(4_000)
            .with_operation_timeout(3_000),
    )
}

// ==================== Provisioning handshake ====================

#[tokio::test(start_paused = true)]
async fn test_provision_with_json_ack() {
    let gateway = gateway(FakeTransport::notifying(
        r#"{"handshake_id":"h-1","credentials_hash":"hash-1"}"#,
    ));

    let result = gateway.provision(&session(), &office()).await;
    assert_eq!(
        result,
        BleGatewayResult::Success {
            handshake_id: "h-1".into(),
            credentials_hash: "hash-1".into(),
        }
    );

    let writes = gateway.transport().writes();
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0].0, NORDIC_UART_SERVICE);
    assert_eq!(writes[0].1, NORDIC_UART_RX);
    assert_eq!(writes[0].2, b"wifi#connect#Office#strongPass12".to_vec());
    assert_eq!(gateway.transport().disconnects.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_provision_falls_back_to_read_without_notification() {
    let transport = FakeTransport::default().with_read(NORDIC_UART_TX, "wifi#connect#ok#hs-9");
    let gateway = gateway(transport);

    match gateway.provision(&session(), &office()).await {
        BleGatewayResult::Success { handshake_id, credentials_hash } => {
            assert_eq!(handshake_id, "hs-9");
            assert_eq!(credentials_hash, codec::credentials_hash(&office()));
        }
        other => panic!("Expected success, got {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_provision_rejected_by_device() {
    let gateway = gateway(FakeTransport::notifying("wifi#connect#fail#bad password"));

    assert_eq!(
        gateway.provision(&session(), &office()).await,
        BleGatewayResult::CredentialRejected("bad password".into())
    );
}

#[tokio::test(start_paused = true)]
async fn test_provision_times_out_on_silent_device() {
    // Link never comes up
    let transport = FakeTransport {
        hang_on_connect: true,
        ..Default::default()
    };
    let gateway = gateway(transport);

    assert_eq!(gateway.provision(&session(), &office()).await, BleGatewayResult::Timeout(4_000));
}

#[tokio::test(start_paused = true)]
async fn test_provision_times_out_waiting_for_ack() {
    // Link is up but the status characteristic never answers
    let transport = FakeTransport {
        hang_on_read: true,
        ..Default::default()
    };
    let gateway = gateway(transport);

    assert_eq!(gateway.provision(&session(), &office()).await, BleGatewayResult::Timeout(3_000));
    assert_eq!(gateway.transport().disconnects.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_provision_unknown_device() {
    let transport = FakeTransport {
        connect_error: Some(GatewayError::DeviceNotFound(String::new())),
        ..Default::default()
    };

    assert_eq!(
        gateway(transport).provision(&session(), &office()).await,
        BleGatewayResult::DeviceMissing("1".into())
    );
}

#[tokio::test(start_paused = true)]
async fn test_provision_permission_denied() {
    let transport = FakeTransport {
        connect_error: Some(GatewayError::PermissionDenied(["BLUETOOTH_CONNECT".to_string()].into())),
        ..Default::default()
    };

    assert_eq!(
        gateway(transport).provision(&session(), &office()).await,
        BleGatewayResult::PermissionDenied(["BLUETOOTH_CONNECT".to_string()].into())
    );
}

#[tokio::test(start_paused = true)]
async fn test_garbled_ack_is_transport_error() {
    let gateway = gateway(FakeTransport::notifying("hello"));

    assert!(matches!(
        gateway.provision(&session(), &office()).await,
        BleGatewayResult::TransportError(_)
    ));
}

// ==================== Layout discovery ====================

#[tokio::test(start_paused = true)]
async fn test_discovered_layout_is_cached_until_forget() {
    let layout = GattLayout {
        service: CUSTOM_SERVICE,
        command: CUSTOM_COMMAND,
        status: CUSTOM_COMMAND,
        hotspot: CUSTOM_COMMAND,
    };
    let transport = FakeTransport {
        layout: Some(layout),
        ..Default::default()
    }
    .with_read(CUSTOM_COMMAND, "wifi#address#10.0.0.8#Office#Office");
    let gateway = gateway(transport);

    assert!(matches!(gateway.query_network(&session()).await, NetworkQueryResult::Success(_)));
    assert!(matches!(gateway.query_network(&session()).await, NetworkQueryResult::Success(_)));
    assert_eq!(gateway.transport().discover_calls.load(Ordering::SeqCst), 1);

    let writes = gateway.transport().writes();
    assert!(writes.iter().all(|(service, command, _)| *service == CUSTOM_SERVICE && *command == CUSTOM_COMMAND));

    gateway.forget(&BlePeripheral::new("1", "BT311", -50));
    gateway.query_network(&session()).await;
    assert_eq!(gateway.transport().discover_calls.load(Ordering::SeqCst), 2);
}

// ==================== Network and hotspot ====================

#[tokio::test(start_paused = true)]
async fn test_query_network_status() {
    let gateway = gateway(FakeTransport::notifying(r#"{"ipAddress":"192.168.1.20","deviceName":"BT311-Office"}"#));

    match gateway.query_network(&session()).await {
        NetworkQueryResult::Success(status) => {
            assert_eq!(status.ip_address, "192.168.1.20");
            assert_eq!(status.device_wifi_name, "BT311-Office");
            assert_eq!(status.phone_wifi_name, "BT311-Office");
        }
        other => panic!("Expected success, got {:?}", other),
    }
    assert_eq!(gateway.transport().writes()[0].2, codec::encode_network_query());
}

#[tokio::test(start_paused = true)]
async fn test_query_network_missing_ip() {
    let gateway = gateway(FakeTransport::notifying("wifi#address##BT311"));

    assert!(matches!(
        gateway.query_network(&session()).await,
        NetworkQueryResult::TransportError(_)
    ));
}

#[tokio::test(start_paused = true)]
async fn test_query_network_timeout_reports_elapsed_bound() {
    let unreachable = gateway(FakeTransport {
        hang_on_connect: true,
        ..Default::default()
    });
    assert_eq!(unreachable.query_network(&session()).await, NetworkQueryResult::Timeout(4_000));

    let unanswered = gateway(FakeTransport {
        hang_on_read: true,
        ..Default::default()
    });
    assert_eq!(unanswered.query_network(&session()).await, NetworkQueryResult::Timeout(3_000));
}

#[tokio::test(start_paused = true)]
async fn test_request_hotspot() {
    let transport = FakeTransport::default().with_read(NORDIC_UART_TX, r#"{"ssid":"BT311-AP","password":"12345678"}"#);
    let gateway = gateway(transport);

    match gateway.request_hotspot(&session()).await {
        smartsales_lib::provisioning::HotspotResult::Success(credentials) => {
            assert_eq!(credentials.ssid, "BT311-AP");
            assert_eq!(credentials.password, "12345678");
        }
        other => panic!("Expected success, got {:?}", other),
    }
}

// ==================== Provisioner mapping ====================

#[tokio::test(start_paused = true)]
async fn test_provisioner_maps_outcomes() {
    let provisioner = BleWifiProvisioner::new(gateway(FakeTransport::notifying(
        r#"{"handshake_id":"h-1","credentials_hash":"hash-1"}"#,
    )));
    let status = provisioner.provision(&session(), &office()).await.unwrap();
    assert_eq!(status.wifi_ssid, "Office");
    assert_eq!(status.handshake_id, "h-1");

    let unreachable = BleWifiProvisioner::new(gateway(FakeTransport {
        hang_on_connect: true,
        ..Default::default()
    }));
    assert_eq!(
        unreachable.provision(&session(), &office()).await,
        Err(ConnectivityError::Timeout(4_000))
    );

    let unanswered = BleWifiProvisioner::new(gateway(FakeTransport {
        hang_on_read: true,
        ..Default::default()
    }));
    assert_eq!(
        unanswered.provision(&session(), &office()).await,
        Err(ConnectivityError::Timeout(3_000))
    );

    let missing = BleWifiProvisioner::new(gateway(FakeTransport {
        connect_error: Some(GatewayError::DeviceNotFound(String::new())),
        ..Default::default()
    }));
    assert_eq!(
        missing.provision(&session(), &office()).await,
        Err(ConnectivityError::Transport("device not found: 1".into()))
    );

    let rejected = BleWifiProvisioner::new(gateway(FakeTransport::notifying(
        r#"{"rejected":true,"reason":"wrong password"}"#,
    )));
    assert_eq!(
        rejected.provision(&session(), &office()).await,
        Err(ConnectivityError::ProvisioningFailed("wrong password".into()))
    );
}

#[tokio::test(start_paused = true)]
async fn test_provisioner_network_query_errors() {
    let silent = BleWifiProvisioner::new(gateway(FakeTransport {
        hang_on_connect: true,
        ..Default::default()
    }));
    assert_eq!(
        silent.query_network_status(&session()).await,
        Err(ConnectivityError::Timeout(4_000))
    );

    // Nothing notified and the status characteristic is missing
    let broken = BleWifiProvisioner::new(gateway(FakeTransport::default()));
    assert!(matches!(
        broken.query_network_status(&session()).await,
        Err(ConnectivityError::Transport(_))
    ));
}
