//! 应用配置模块
//!
//! 连接、转写和设备媒体服务的可调参数，以 JSON 形式持久化
//!
//! # 配置存储位置
//!
//! `<系统配置目录>/smartsales/config.json`，例如 Linux 下为
//! `~/.config/smartsales/config.json`
//!
//! # 使用示例
//!
//! ```no_run
//! use smartsales_lib::config::ConfigManager;
//!
//! let path = ConfigManager::default_config_path().unwrap();
//! let mut config = ConfigManager::load(&path).unwrap();
//! config.connectivity.heartbeat_interval_ms = 3_000;
//! ConfigManager::save(&path, &config).unwrap();
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::connectivity::{BleProfileConfig, BleProfileRegistry};

/// 配置错误类型
#[derive(Error, Debug)]
pub enum ConfigError {
    /// IO 错误
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON 序列化/反序列化错误
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// 路径错误
    #[error("Path error: {0}")]
    Path(String),
}

/// 配置结果类型
pub type ConfigResult<T> = Result<T, ConfigError>;

/// 应用配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// 设备连接配置
    pub connectivity: ConnectivityConfig,
    /// 转写轮询配置
    pub transcription: TranscriptionConfig,
    /// 设备媒体服务配置
    pub media: MediaConfig,
}

/// 设备连接配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectivityConfig {
    /// 心跳间隔（毫秒）
    pub heartbeat_interval_ms: u64,
    /// 自动重试延迟（毫秒）
    pub auto_retry_delay_ms: u64,
    /// 每个错误周期内的自动重试次数
    pub max_auto_retries: u32,
    /// BLE 单步操作超时（毫秒）
    pub operation_timeout_ms: u64,
    /// BLE 连接超时（毫秒）
    pub connection_timeout_ms: u64,
    /// 使用模拟配网器（离线调试）
    pub use_simulated_provisioner: bool,
    /// 设备 profile，为空时使用内置 BT311 profile
    pub profiles: Vec<BleProfileConfig>,
}

impl ConnectivityConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn auto_retry_delay(&self) -> Duration {
        Duration::from_millis(self.auto_retry_delay_ms)
    }

    /// 由配置的 profile 构建注册表
    pub fn profile_registry(&self) -> BleProfileRegistry {
        BleProfileRegistry::new(self.profiles.clone())
    }
}

impl Default for ConnectivityConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: 1_500,
            auto_retry_delay_ms: 2_000,
            max_auto_retries: 1,
            operation_timeout_ms: 5_000,
            connection_timeout_ms: 10_000,
            use_simulated_provisioner: false,
            profiles: Vec::new(),
        }
    }
}

/// 轮询间隔下限（毫秒）
pub const MIN_POLL_INTERVAL_MS: u64 = 500;

/// 转写轮询配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptionConfig {
    /// 轮询间隔（毫秒），不低于 500
    pub poll_interval_ms: u64,
    /// 首次轮询前的等待（毫秒）
    pub initial_poll_delay_ms: u64,
    /// 轮询总超时（毫秒），不低于两倍轮询间隔
    pub poll_timeout_ms: u64,
}

impl TranscriptionConfig {
    /// 生效的轮询间隔
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(MIN_POLL_INTERVAL_MS))
    }

    pub fn initial_poll_delay(&self) -> Duration {
        Duration::from_millis(self.initial_poll_delay_ms)
    }

    /// 生效的轮询超时
    pub fn poll_timeout(&self) -> Duration {
        let floor = self.poll_interval() * 2;
        Duration::from_millis(self.poll_timeout_ms).max(floor)
    }
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 5_000,
            initial_poll_delay_ms: 2_000,
            poll_timeout_ms: 600_000,
        }
    }
}

/// 设备媒体服务配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    /// 设备 HTTP 服务端口
    pub default_port: u16,
    /// 普通请求超时（毫秒）
    pub request_timeout_ms: u64,
    /// 上传/下载超时（毫秒）
    pub transfer_timeout_ms: u64,
    /// 地址发现的最大尝试次数
    pub discovery_attempts: u32,
    /// 每次失败后的等待（毫秒），次数不足时复用最后一项
    pub discovery_backoff_ms: Vec<u64>,
    /// 下载目录（None 表示系统缓存目录）
    pub download_dir: Option<PathBuf>,
}

impl MediaConfig {
    /// 第 `attempt` 次失败后的等待时间（从 1 开始）
    pub fn discovery_backoff(&self, attempt: u32) -> Duration {
        let index = attempt.saturating_sub(1) as usize;
        let millis = self
            .discovery_backoff_ms
            .get(index)
            .or_else(|| self.discovery_backoff_ms.last())
            .copied()
            .unwrap_or(1_000);
        Duration::from_millis(millis)
    }

    /// 生效的下载目录
    pub fn resolved_download_dir(&self) -> PathBuf {
        self.download_dir.clone().unwrap_or_else(|| {
            dirs::cache_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("smartsales")
                .join("audio")
        })
    }
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            default_port: 8000,
            request_timeout_ms: 10_000,
            transfer_timeout_ms: 15_000,
            discovery_attempts: 3,
            discovery_backoff_ms: vec![1_000, 2_000],
            download_dir: None,
        }
    }
}

/// 配置管理器
///
/// 提供配置的加载、保存和管理功能
pub struct ConfigManager;

impl ConfigManager {
    /// 加载配置
    ///
    /// 文件不存在时返回默认配置
    pub fn load(path: &Path) -> ConfigResult<AppConfig> {
        tracing::debug!(path = %path.display(), "Loading config");

        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: AppConfig = serde_json::from_str(&content)?;
            tracing::info!(path = %path.display(), "Config loaded successfully");
            Ok(config)
        } else {
            tracing::info!("Config file not found, using defaults");
            Ok(AppConfig::default())
        }
    }

    /// 保存配置
    ///
    /// 父目录不存在时自动创建
    pub fn save(path: &Path, config: &AppConfig) -> ConfigResult<()> {
        tracing::debug!(path = %path.display(), "Saving config");

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let content = serde_json::to_string_pretty(config)?;
        std::fs::write(path, content)?;

        tracing::info!(path = %path.display(), "Config saved successfully");
        Ok(())
    }

    /// 默认配置文件路径
    pub fn default_config_path() -> ConfigResult<PathBuf> {
        let dir = dirs::config_dir()
            .ok_or_else(|| ConfigError::Path("no config directory on this platform".to_string()))?;
        Ok(dir.join("smartsales").join("config.json"))
    }

    /// 删除配置文件
    pub fn delete(path: &Path) -> ConfigResult<()> {
        if path.exists() {
            std::fs::remove_file(path)?;
            tracing::info!(path = %path.display(), "Config deleted");
        }
        Ok(())
    }

    /// 重置为默认配置并保存
    pub fn reset(path: &Path) -> ConfigResult<AppConfig> {
        let config = AppConfig::default();
        Self::save(path, &config)?;
        tracing::info!("Config reset to defaults");
        Ok(config)
    }
}

/// 全局配置状态
///
/// 使用 ArcSwap 实现无锁读取
pub struct GlobalConfig {
    config: ArcSwap<AppConfig>,
}

impl GlobalConfig {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config: ArcSwap::new(Arc::new(config)),
        }
    }

    /// 获取当前配置
    pub fn get(&self) -> Arc<AppConfig> {
        self.config.load_full()
    }

    /// 替换配置
    pub fn update(&self, config: AppConfig) {
        self.config.store(Arc::new(config));
    }

    /// 在当前配置的副本上修改并替换
    pub fn modify(&self, f: impl FnOnce(&mut AppConfig)) {
        let mut config = (*self.config.load_full()).clone();
        f(&mut config);
        self.config.store(Arc::new(config));
    }
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self::new(AppConfig::default())
    }
}
