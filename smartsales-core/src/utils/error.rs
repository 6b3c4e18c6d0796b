//! 全局错误处理模块
//!
//! 提供统一的应用错误类型和用户友好的错误消息
//!
//! # 功能
//!
//! - 统一的 `AppError` 类型，聚合所有模块错误
//! - 用户友好的错误消息
//! - 错误代码用于前端处理
//! - 错误恢复建议
//!
//! # 使用示例
//!
//! ```
//! use smartsales_lib::connectivity::ConnectivityError;
//! use smartsales_lib::utils::error::{AppError, ErrorCode};
//!
//! let err = AppError::from(ConnectivityError::MissingSession);
//! assert_eq!(err.code(), ErrorCode::DeviceNotConnected);
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ConfigError;
use crate::connectivity::{ConnectivityError, StateError};
use crate::jobs::JobError;
use crate::media::MediaError;
use crate::recordings::SyncError;

/// 应用错误类型
///
/// 聚合所有模块的错误类型，提供统一的错误处理接口
#[derive(Error, Debug)]
pub enum AppError {
    /// 设备连接错误
    #[error("Connectivity error: {0}")]
    Connectivity(#[from] ConnectivityError),

    /// 状态机错误
    #[error("State error: {0}")]
    State(#[from] StateError),

    /// 转写任务错误
    #[error("Job error: {0}")]
    Job(#[from] JobError),

    /// 设备媒体错误
    #[error("Media error: {0}")]
    Media(#[from] MediaError),

    /// 配置错误
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// 内部错误
    #[error("Internal error: {0}")]
    Internal(String),

    /// 用户取消操作
    #[error("Operation cancelled")]
    Cancelled,
}

/// 错误代码
///
/// 用于前端识别和处理特定错误
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // 设备连接错误 (1xxx)
    /// 已有配网流程
    DevicePairingInProgress,
    /// 配网失败
    DeviceProvisioningFailed,
    /// 缺少蓝牙或定位权限
    DevicePermissionDenied,
    /// 设备响应超时
    DeviceTimeout,
    /// BLE 传输错误
    DeviceTransportError,
    /// 没有设备会话
    DeviceNotConnected,

    // 转写任务错误 (2xxx)
    /// 请求无效
    JobInvalidRequest,
    /// 转写服务错误
    JobBackendError,
    /// 轮询超时
    JobTimeout,

    // 设备媒体错误 (3xxx)
    /// 设备地址未知
    MediaNotConnected,
    /// 设备地址无效
    MediaInvalidAddress,
    /// HTTP 请求失败
    MediaRequestFailed,
    /// 本地文件或上传失败
    MediaStorageFailed,

    // 配置错误 (4xxx)
    /// 配置加载失败
    ConfigLoadFailed,
    /// 配置无效
    ConfigInvalid,

    // 通用错误 (9xxx)
    /// 内部错误
    InternalError,
    /// 操作取消
    OperationCancelled,
}

/// 错误上下文信息
///
/// 提供用户友好的错误信息和恢复建议
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorContext {
    /// 错误代码
    pub code: ErrorCode,
    /// 用户友好的错误消息
    pub message: String,
    /// 详细错误信息（用于日志）
    pub detail: Option<String>,
    /// 恢复建议
    pub recovery_hint: Option<String>,
    /// 是否可恢复
    pub recoverable: bool,
}

impl ErrorContext {
    /// 创建新的错误上下文
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            detail: None,
            recovery_hint: None,
            recoverable: true,
        }
    }

    /// 设置详细信息
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// 设置恢复建议
    pub fn with_recovery_hint(mut self, hint: impl Into<String>) -> Self {
        self.recovery_hint = Some(hint.into());
        self
    }

    /// 标记为不可恢复
    pub fn not_recoverable(mut self) -> Self {
        self.recoverable = false;
        self
    }
}

impl AppError {
    /// 获取错误代码
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Connectivity(ConnectivityError::PairingInProgress(_)) => ErrorCode::DevicePairingInProgress,
            AppError::Connectivity(ConnectivityError::ProvisioningFailed(_)) => ErrorCode::DeviceProvisioningFailed,
            AppError::Connectivity(ConnectivityError::PermissionDenied(_)) => ErrorCode::DevicePermissionDenied,
            AppError::Connectivity(ConnectivityError::Timeout(_)) => ErrorCode::DeviceTimeout,
            AppError::Connectivity(ConnectivityError::Transport(_)) => ErrorCode::DeviceTransportError,
            AppError::Connectivity(ConnectivityError::MissingSession) => ErrorCode::DeviceNotConnected,

            AppError::State(_) => ErrorCode::InternalError,

            AppError::Job(JobError::InvalidRequest(_)) => ErrorCode::JobInvalidRequest,
            AppError::Job(JobError::Timeout(_)) => ErrorCode::JobTimeout,
            AppError::Job(JobError::ShutDown) => ErrorCode::OperationCancelled,
            AppError::Job(_) => ErrorCode::JobBackendError,

            AppError::Media(MediaError::NotConnected) => ErrorCode::MediaNotConnected,
            AppError::Media(MediaError::InvalidBaseUrl(_)) => ErrorCode::MediaInvalidAddress,
            AppError::Media(MediaError::Io(_) | MediaError::Upload(_)) => ErrorCode::MediaStorageFailed,
            AppError::Media(_) => ErrorCode::MediaRequestFailed,

            AppError::Config(ConfigError::Json(_)) => ErrorCode::ConfigInvalid,
            AppError::Config(_) => ErrorCode::ConfigLoadFailed,

            AppError::Internal(_) => ErrorCode::InternalError,
            AppError::Cancelled => ErrorCode::OperationCancelled,
        }
    }

    /// 获取用户友好的错误消息
    ///
    /// 返回适合直接显示给用户的错误消息
    pub fn user_message(&self) -> String {
        match self {
            AppError::Connectivity(ConnectivityError::PairingInProgress(device)) => {
                format!("{} 正在配网，请稍候", device)
            }
            AppError::Connectivity(ConnectivityError::ProvisioningFailed(reason)) => {
                format!("配网失败：{}", reason)
            }
            AppError::Connectivity(ConnectivityError::PermissionDenied(_)) => {
                "缺少蓝牙权限，无法连接设备".to_string()
            }
            AppError::Connectivity(ConnectivityError::Timeout(_)) => "设备响应超时，请重试".to_string(),
            AppError::Connectivity(ConnectivityError::Transport(_)) => "蓝牙通信失败，请重试".to_string(),
            AppError::Connectivity(ConnectivityError::MissingSession) => "请先选择设备".to_string(),

            AppError::State(_) => "设备状态异常，请重新连接".to_string(),

            AppError::Job(JobError::InvalidRequest(_)) => "转写请求无效".to_string(),
            AppError::Job(JobError::Timeout(_)) => "转写超时，请稍后查看".to_string(),
            AppError::Job(JobError::ShutDown) => "操作已取消".to_string(),
            AppError::Job(_) => "转写服务错误，请重试".to_string(),

            AppError::Media(MediaError::NotConnected) => "设备未连接".to_string(),
            AppError::Media(MediaError::InvalidBaseUrl(_)) => "设备地址无效".to_string(),
            AppError::Media(MediaError::Io(_)) => "本地文件读写失败".to_string(),
            AppError::Media(MediaError::Upload(_)) => "音频上传失败".to_string(),
            AppError::Media(_) => "无法访问设备文件，请检查网络".to_string(),

            AppError::Config(ConfigError::Json(_)) => "配置文件格式错误".to_string(),
            AppError::Config(_) => "无法读取配置文件".to_string(),

            AppError::Internal(msg) => format!("内部错误: {}", msg),
            AppError::Cancelled => "操作已取消".to_string(),
        }
    }

    /// 获取完整的错误上下文
    pub fn context(&self) -> ErrorContext {
        let mut ctx = ErrorContext::new(self.code(), self.user_message()).with_detail(self.to_string());
        ctx.recovery_hint = self.recovery_hint();

        if !self.is_recoverable() {
            ctx = ctx.not_recoverable();
        }

        ctx
    }

    /// 获取恢复建议
    pub fn recovery_hint(&self) -> Option<String> {
        match self {
            AppError::Connectivity(ConnectivityError::PermissionDenied(permissions)) => {
                let names: Vec<&str> = permissions.iter().map(String::as_str).collect();
                Some(format!("请在系统设置中授予权限：{}", names.join(", ")))
            }
            AppError::Connectivity(ConnectivityError::Timeout(_) | ConnectivityError::Transport(_)) => {
                Some("请靠近设备并确认设备已开机".to_string())
            }
            AppError::Connectivity(ConnectivityError::ProvisioningFailed(_)) => {
                Some("请检查 Wi-Fi 名称和密码".to_string())
            }
            AppError::Media(MediaError::NotConnected) => Some("请先完成设备配网".to_string()),
            _ => None,
        }
    }

    /// 检查错误是否可恢复
    pub fn is_recoverable(&self) -> bool {
        match self {
            AppError::Connectivity(err) => err.can_retry(),
            AppError::Config(_) | AppError::Internal(_) | AppError::State(_) => false,
            _ => true,
        }
    }

    /// 检查是否是用户取消的操作
    pub fn is_cancelled(&self) -> bool {
        matches!(self, AppError::Cancelled)
    }

    /// 检查是否是超时错误
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            AppError::Connectivity(ConnectivityError::Timeout(_)) | AppError::Job(JobError::Timeout(_))
        )
    }

    /// 检查是否是权限错误
    pub fn is_permission_error(&self) -> bool {
        matches!(self, AppError::Connectivity(ConnectivityError::PermissionDenied(_)))
    }
}

impl From<SyncError> for AppError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::NotConnected => AppError::Media(MediaError::NotConnected),
            SyncError::UnknownRecording(id) => AppError::Internal(format!("recording not found: {}", id)),
            SyncError::Media(err) => AppError::Media(err),
            SyncError::Job(err) => AppError::Job(err),
        }
    }
}

/// 应用结果类型
pub type AppResult<T> = Result<T, AppError>;

impl From<String> for AppError {
    fn from(msg: String) -> Self {
        AppError::Internal(msg)
    }
}

impl From<&str> for AppError {
    fn from(msg: &str) -> Self {
        AppError::Internal(msg.to_string())
    }
}
