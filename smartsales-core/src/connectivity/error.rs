use std::collections::BTreeSet;

use serde::Serialize;
use thiserror::Error;

/// 连接与配网错误
///
/// 在 provisioner 边界统一转换，之后作为数据在状态机内传递
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ConnectivityError {
    /// 已有配对流程在进行
    #[error("pairing already in progress: {0}")]
    PairingInProgress(String),

    /// 设备拒绝配网
    #[error("provisioning failed: {0}")]
    ProvisioningFailed(String),

    /// 缺少系统权限
    #[error("permission denied: {}", join_permissions(.0))]
    PermissionDenied(BTreeSet<String>),

    /// 操作超时（毫秒）
    #[error("operation timed out ({0}ms)")]
    Timeout(u64),

    /// 传输层错误
    #[error("transport error: {0}")]
    Transport(String),

    /// 没有活动会话
    #[error("no active device session")]
    MissingSession,
}

fn join_permissions(permissions: &BTreeSet<String>) -> String {
    permissions
        .iter()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

impl ConnectivityError {
    /// 由权限名列表创建权限错误
    pub fn permission_denied<I, S>(permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::PermissionDenied(permissions.into_iter().map(Into::into).collect())
    }

    /// 是否允许自动重试
    ///
    /// 只有超时和传输错误会被自动重试一次
    pub fn is_auto_retryable(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Transport(_))
    }

    /// 是否向用户提供手动重试
    pub fn can_retry(&self) -> bool {
        !matches!(self, Self::MissingSession)
    }

    /// 缺失的权限（仅权限错误）
    pub fn missing_permissions(&self) -> Option<&BTreeSet<String>> {
        match self {
            Self::PermissionDenied(permissions) => Some(permissions),
            _ => None,
        }
    }

    /// 错误类型名称
    pub fn kind(&self) -> &'static str {
        match self {
            Self::PairingInProgress(_) => "PairingInProgress",
            Self::ProvisioningFailed(_) => "ProvisioningFailed",
            Self::PermissionDenied(_) => "PermissionDenied",
            Self::Timeout(_) => "Timeout",
            Self::Transport(_) => "Transport",
            Self::MissingSession => "MissingSession",
        }
    }
}

/// 连接模块的结果类型
pub type ConnectivityResult<T> = Result<T, ConnectivityError>;

/// 连接状态存储错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    /// 无效的状态转换
    #[error("Invalid connection state transition from {from} to {to}")]
    InvalidTransition {
        from: &'static str,
        to: &'static str,
    },
}

/// 状态存储的结果类型
pub type StateResult<T> = Result<T, StateError>;
