//! 设备连接管理器
//!
//! 连接生命周期的唯一数据源：外设选择 → 配网 → 心跳确认 → 错误与重试
//!
//! 所有改变状态的操作都在同一把互斥锁下串行执行。每次配网尝试都带有
//! 递增的尝试编号，完成回调编号不匹配时直接丢弃。

use std::sync::{Arc, Weak};

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::error::{ConnectivityError, ConnectivityResult};
use super::models::{
    BlePeripheral, BleSession, DeviceNetworkStatus, ProvisioningStatus, WifiCredentials,
};
use super::snapshot::ConnectionSnapshot;
use super::state::{ConnectionState, ConnectionStateStore};
use crate::config::ConnectivityConfig;
use crate::provisioning::codec::sha256_hex;
use crate::provisioning::{WifiProvisioner, DEFAULT_DEVICE_WIFI};

/// 开始配网时的进度
pub const PAIRING_START_PROGRESS: u8 = 10;

/// 由可变字段组成的控制块，只在锁内访问
#[derive(Default)]
struct Control {
    session: Option<BleSession>,
    last_credentials: Option<WifiCredentials>,
    /// 当前尝试编号，任何会取代旧流程的操作都会递增
    attempt: u64,
    /// 本错误周期内已用的自动重试次数
    auto_retries_used: u32,
    provisioning_task: Option<JoinHandle<()>>,
    heartbeat_task: Option<JoinHandle<()>>,
    auto_retry_task: Option<JoinHandle<()>>,
}

impl Control {
    fn next_attempt(&mut self) -> u64 {
        self.attempt += 1;
        self.attempt
    }

    fn cancel_heartbeat(&mut self) {
        if let Some(task) = self.heartbeat_task.take() {
            task.abort();
        }
    }

    fn cancel_auto_retry(&mut self) {
        if let Some(task) = self.auto_retry_task.take() {
            task.abort();
        }
    }

    fn cancel_provisioning(&mut self) {
        if let Some(task) = self.provisioning_task.take() {
            task.abort();
        }
    }

    fn cancel_all(&mut self) {
        self.cancel_provisioning();
        self.cancel_heartbeat();
        self.cancel_auto_retry();
    }
}

struct Inner {
    provisioner: Arc<dyn WifiProvisioner>,
    config: ConnectivityConfig,
    store: ConnectionStateStore,
    control: Mutex<Control>,
}

/// 设备连接管理器
///
/// 克隆开销很小，所有克隆共享同一个状态机
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use smartsales_lib::config::ConnectivityConfig;
/// use smartsales_lib::connectivity::{BlePeripheral, DeviceConnectionManager, WifiCredentials};
/// use smartsales_lib::provisioning::SimulatedWifiProvisioner;
///
/// # #[tokio::main]
/// # async fn main() {
/// let manager = DeviceConnectionManager::new(
///     Arc::new(SimulatedWifiProvisioner::new()),
///     ConnectivityConfig::default(),
/// );
/// let peripheral = BlePeripheral::new("1", "BT311", -50);
/// manager.select_peripheral(&peripheral).await;
/// manager
///     .start_pairing(&peripheral, WifiCredentials::new("Office", "strongPass12"))
///     .await
///     .unwrap();
/// # }
/// ```
#[derive(Clone)]
pub struct DeviceConnectionManager {
    inner: Arc<Inner>,
}

impl DeviceConnectionManager {
    /// 创建连接管理器，初始状态为 Disconnected
    pub fn new(provisioner: Arc<dyn WifiProvisioner>, config: ConnectivityConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                provisioner,
                config,
                store: ConnectionStateStore::new(),
                control: Mutex::new(Control::default()),
            }),
        }
    }

    /// 获取当前状态
    pub fn current(&self) -> Arc<ConnectionState> {
        self.inner.store.current()
    }

    /// 订阅状态变更，接收端立即持有最新状态
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.inner.store.subscribe()
    }

    /// 当前状态的扁平快照
    pub fn snapshot(&self) -> ConnectionSnapshot {
        ConnectionSnapshot::from(self.current().as_ref())
    }

    /// 当前会话（错误状态下仍保留）
    pub async fn session(&self) -> Option<BleSession> {
        self.inner.control.lock().await.session.clone()
    }

    /// 选择外设
    ///
    /// 纯状态转换，不做 I/O；覆盖之前的会话并取代所有进行中的流程
    pub async fn select_peripheral(&self, peripheral: &BlePeripheral) {
        let mut control = self.inner.control.lock().await;
        control.cancel_all();
        control.next_attempt();

        let session = BleSession::from_peripheral(peripheral);
        control.session = Some(session.clone());

        debug!(
            id = %peripheral.id,
            device = %peripheral.name,
            profile = peripheral.profile_id.as_deref().unwrap_or("dynamic"),
            "Peripheral selected"
        );
        self.inner.publish(ConnectionState::connected(session));
    }

    /// 开始配网
    ///
    /// 立即进入 Pairing 并在后台调用配网器；返回值只反映提交是否成功
    ///
    /// # Errors
    ///
    /// 已有配网流程时返回 [`ConnectivityError::PairingInProgress`]
    pub async fn start_pairing(
        &self,
        peripheral: &BlePeripheral,
        credentials: WifiCredentials,
    ) -> ConnectivityResult<()> {
        let mut control = self.inner.control.lock().await;

        if let ConnectionState::Pairing { device_name, .. } = self.current().as_ref() {
            return Err(ConnectivityError::PairingInProgress(device_name.clone()));
        }

        control.cancel_all();
        control.auto_retries_used = 0;
        control.session = Some(BleSession::from_peripheral(peripheral));
        control.last_credentials = Some(credentials);

        info!(device = %peripheral.name, "Pairing started");
        self.inner.publish(ConnectionState::pairing(
            peripheral.name.clone(),
            PAIRING_START_PROGRESS,
            peripheral.signal_strength_dbm,
        ));
        Inner::launch_provisioning(&self.inner, &mut control)
    }

    /// 使用上一次的外设和凭据重新配网
    ///
    /// 不发布新的 Pairing 状态，结果到达前保持当前状态
    ///
    /// # Errors
    ///
    /// 从未发起过配网时返回 [`ConnectivityError::MissingSession`]，状态不变
    pub async fn retry(&self) -> ConnectivityResult<()> {
        let mut control = self.inner.control.lock().await;

        if control.session.is_none() || control.last_credentials.is_none() {
            return Err(ConnectivityError::MissingSession);
        }

        control.cancel_all();
        control.auto_retries_used = 0;
        info!(state = self.current().name(), "Manual retry");
        Inner::launch_provisioning(&self.inner, &mut control)
    }

    /// 忘记设备，回到 Disconnected
    pub async fn forget_device(&self) {
        let mut control = self.inner.control.lock().await;
        control.cancel_all();
        control.next_attempt();
        control.session = None;
        control.last_credentials = None;
        control.auto_retries_used = 0;

        info!("Device forgotten");
        self.inner.publish(ConnectionState::disconnected());
    }

    /// 关闭错误提示
    ///
    /// 有会话时回到 Connected，否则回到 Disconnected；非错误状态下无操作
    pub async fn dismiss_error(&self) {
        let mut control = self.inner.control.lock().await;
        if !self.current().is_error() {
            return;
        }

        control.cancel_all();
        control.next_attempt();
        let next = match control.session.clone() {
            Some(session) => ConnectionState::connected(session),
            None => ConnectionState::disconnected(),
        };
        self.inner.publish(next);
    }

    /// 请求设备热点凭据
    ///
    /// # Errors
    ///
    /// 没有会话时返回 [`ConnectivityError::MissingSession`]
    pub async fn request_hotspot_credentials(&self) -> ConnectivityResult<WifiCredentials> {
        let session = self
            .session()
            .await
            .ok_or(ConnectivityError::MissingSession)?;
        self.inner.provisioner.request_hotspot_credentials(&session).await
    }

    /// 查询设备网络状态
    ///
    /// 不改变状态，唯一的例外是从 Connected 查询成功：视为设备已联网，
    /// 提升到 WifiProvisioned 并启动心跳
    ///
    /// # Errors
    ///
    /// 没有会话时返回 [`ConnectivityError::MissingSession`]，不会调用配网器
    pub async fn query_network_status(&self) -> ConnectivityResult<DeviceNetworkStatus> {
        let (session, attempt) = {
            let control = self.inner.control.lock().await;
            let session = control.session.clone().ok_or(ConnectivityError::MissingSession)?;
            (session, control.attempt)
        };

        let status = self.inner.provisioner.query_network_status(&session).await?;

        let mut control = self.inner.control.lock().await;
        if control.attempt == attempt && self.current().is_connected() {
            let synthetic = synthetic_status(&status);
            debug!(
                device = %session.peripheral_name,
                ip = %status.ip_address,
                "Network status confirmed device is online"
            );
            self.inner
                .publish(ConnectionState::wifi_provisioned(session.clone(), synthetic.clone()));
            Inner::start_heartbeat(&self.inner, &mut control, attempt, session, synthetic);
        }

        Ok(status)
    }
}

/// 由网络查询结果构造配网状态
fn synthetic_status(status: &DeviceNetworkStatus) -> ProvisioningStatus {
    let wifi = if status.device_wifi_name.trim().is_empty() {
        DEFAULT_DEVICE_WIFI.to_string()
    } else {
        status.device_wifi_name.clone()
    };
    let raw_digest = sha256_hex(&status.raw_response);

    ProvisioningStatus::new(
        wifi.clone(),
        format!("network-{}", &raw_digest[..12]),
        sha256_hex(&format!("{}-{}", wifi, status.ip_address)),
    )
}

impl Inner {
    fn publish(&self, state: ConnectionState) {
        if let Err(err) = self.store.transition(state) {
            warn!(error = %err, "Connection state transition rejected");
        }
    }

    /// 在锁内发起新的配网尝试
    fn launch_provisioning(this: &Arc<Self>, control: &mut Control) -> ConnectivityResult<()> {
        let (Some(session), Some(credentials)) =
            (control.session.clone(), control.last_credentials.clone())
        else {
            return Err(ConnectivityError::MissingSession);
        };

        control.cancel_provisioning();
        control.cancel_heartbeat();
        let attempt = control.next_attempt();
        debug!(attempt, device = %session.peripheral_name, "Provisioning attempt launched");

        let inner = Arc::clone(this);
        control.provisioning_task = Some(tokio::spawn(async move {
            let result = inner.provisioner.provision(&session, &credentials).await;
            Inner::complete_attempt(&inner, attempt, session, result).await;
        }));
        Ok(())
    }

    async fn complete_attempt(
        this: &Arc<Self>,
        attempt: u64,
        session: BleSession,
        result: ConnectivityResult<ProvisioningStatus>,
    ) {
        let mut control = this.control.lock().await;
        if control.attempt != attempt {
            debug!(attempt, current = control.attempt, "Dropping stale provisioning result");
            return;
        }
        // 自身即将结束，分离而不是 abort
        control.provisioning_task.take();

        match result {
            Ok(status) => {
                control.auto_retries_used = 0;
                control.cancel_auto_retry();
                info!(
                    attempt,
                    device = %session.peripheral_name,
                    profile = session.profile_id.as_deref().unwrap_or("dynamic"),
                    handshake = %status.handshake_id,
                    "Provisioning succeeded"
                );
                this.publish(ConnectionState::wifi_provisioned(session.clone(), status.clone()));
                Inner::start_heartbeat(this, &mut control, attempt, session, status);
            }
            Err(error) => {
                warn!(attempt, device = %session.peripheral_name, error = %error, "Provisioning failed");
                let auto_retry = error.is_auto_retryable()
                    && control.auto_retries_used < this.config.max_auto_retries;
                this.publish(ConnectionState::error(error));
                if auto_retry {
                    Inner::schedule_auto_retry(this, &mut control, attempt);
                }
            }
        }
    }

    /// 周期心跳：第一次到期时进入 Syncing，之后刷新心跳时间
    fn start_heartbeat(
        this: &Arc<Self>,
        control: &mut Control,
        attempt: u64,
        session: BleSession,
        status: ProvisioningStatus,
    ) {
        control.cancel_heartbeat();

        let weak: Weak<Self> = Arc::downgrade(this);
        let interval = this.config.heartbeat_interval();
        control.heartbeat_task = Some(tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                let Some(inner) = weak.upgrade() else { break };

                let control = inner.control.lock().await;
                if control.attempt != attempt {
                    break;
                }
                inner.publish(ConnectionState::syncing(
                    session.clone(),
                    status.clone(),
                    chrono::Utc::now().timestamp_millis(),
                ));
            }
        }));
    }

    fn schedule_auto_retry(this: &Arc<Self>, control: &mut Control, attempt: u64) {
        control.cancel_auto_retry();

        let weak: Weak<Self> = Arc::downgrade(this);
        let delay = this.config.auto_retry_delay();
        debug!(attempt, delay_ms = delay.as_millis() as u64, "Auto retry scheduled");

        control.auto_retry_task = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(inner) = weak.upgrade() else { return };

            let mut control = inner.control.lock().await;
            if control.attempt != attempt || !inner.store.current().is_error() {
                return;
            }
            control.auto_retry_task.take();
            control.auto_retries_used += 1;
            info!(retry = control.auto_retries_used, "Auto retry");

            if let Err(err) = Inner::launch_provisioning(&inner, &mut control) {
                warn!(error = %err, "Auto retry skipped");
            }
        }));
    }
}
