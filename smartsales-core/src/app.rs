//! 应用装配
//!
//! 按配置把连接管理器、地址发现、转写轮询和录音同步组装在一起

use std::sync::Arc;

use tracing::info;

use crate::config::AppConfig;
use crate::connectivity::{BleProfileRegistry, DeviceConnectionManager};
use crate::jobs::{JobBackend, JobPollingCoordinator, SimulatedTranscriptionBackend};
use crate::media::{DeviceEndpointProvider, HttpMediaGateway};
use crate::provisioning::{
    BleGatewayConfig, BleWifiProvisioner, GattBleGateway, GattTransport, SimulatedWifiProvisioner,
    WifiProvisioner,
};
use crate::recordings::{AudioSyncService, AudioUploader, LocalFileUploader};
use crate::utils::AppResult;

/// 应用核心服务
///
/// 必须在 Tokio 运行时内创建
pub struct SmartSalesCore {
    profiles: BleProfileRegistry,
    connection: DeviceConnectionManager,
    endpoint: DeviceEndpointProvider,
    jobs: Arc<JobPollingCoordinator>,
    recordings: AudioSyncService,
}

impl SmartSalesCore {
    /// 使用给定的配网器、转写后端和上传器创建
    pub fn new(
        config: &AppConfig,
        provisioner: Arc<dyn WifiProvisioner>,
        backend: Arc<dyn JobBackend>,
        uploader: Arc<dyn AudioUploader>,
    ) -> AppResult<Self> {
        let connection = DeviceConnectionManager::new(provisioner, config.connectivity.clone());
        let endpoint = DeviceEndpointProvider::spawn(connection.clone(), config.media.clone());
        let jobs = Arc::new(JobPollingCoordinator::new(backend, config.transcription.clone()));
        let gateway = Arc::new(HttpMediaGateway::new(&config.media)?);

        let recordings = AudioSyncService::new(
            gateway,
            uploader,
            Arc::clone(&jobs),
            endpoint.subscribe(),
            config.media.resolved_download_dir(),
        );

        info!("SmartSales core initialized");
        Ok(Self {
            profiles: config.connectivity.profile_registry(),
            connection,
            endpoint,
            jobs,
            recordings,
        })
    }

    /// 使用平台 GATT 传输创建
    ///
    /// 配置开启 `use_simulated_provisioner` 时不使用传输层
    pub fn with_transport<T: GattTransport + 'static>(
        config: &AppConfig,
        transport: T,
        backend: Arc<dyn JobBackend>,
        uploader: Arc<dyn AudioUploader>,
    ) -> AppResult<Self> {
        let connectivity = &config.connectivity;
        let provisioner: Arc<dyn WifiProvisioner> = if connectivity.use_simulated_provisioner {
            info!("Using simulated provisioner");
            Arc::new(SimulatedWifiProvisioner::new())
        } else {
            let gateway = GattBleGateway::new(transport, BleGatewayConfig::from(connectivity));
            Arc::new(BleWifiProvisioner::new(gateway))
        };
        Self::new(config, provisioner, backend, uploader)
    }

    /// 全部使用模拟实现，不需要真实设备和转写服务
    pub fn simulated(config: &AppConfig) -> AppResult<Self> {
        Self::new(
            config,
            Arc::new(SimulatedWifiProvisioner::new()),
            Arc::new(SimulatedTranscriptionBackend::new()),
            Arc::new(LocalFileUploader),
        )
    }

    /// 扫描结果匹配用的设备 profile
    pub fn profiles(&self) -> &BleProfileRegistry {
        &self.profiles
    }

    pub fn connection(&self) -> &DeviceConnectionManager {
        &self.connection
    }

    pub fn endpoint(&self) -> &DeviceEndpointProvider {
        &self.endpoint
    }

    pub fn jobs(&self) -> &Arc<JobPollingCoordinator> {
        &self.jobs
    }

    pub fn recordings(&self) -> &AudioSyncService {
        &self.recordings
    }

    /// 停止所有后台任务
    pub async fn shutdown(&self) {
        self.recordings.shutdown();
        self.jobs.shutdown();
        self.endpoint.shutdown();
        self.connection.forget_device().await;
        info!("SmartSales core shut down");
    }
}
