//! SmartSales 设备核心
//!
//! BLE 配网状态机、设备媒体同步与转写任务轮询

/// Application configuration
pub mod config;

/// Device connection state machine
pub mod connectivity;

/// Wi-Fi provisioning over BLE
pub mod provisioning;

/// Async job polling
pub mod jobs;

/// Device media server access
pub mod media;

/// Recording sync and transcription pipeline
pub mod recordings;

/// Utility modules
pub mod utils;

mod app;

pub use app::SmartSalesCore;
