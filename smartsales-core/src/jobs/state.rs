use serde::Serialize;

/// 异步任务状态
///
/// 每个任务 ID 一份，由轮询协调器持有
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum JobState {
    /// 尚未观察到任何进度
    Idle,

    InProgress {
        job_id: String,
        /// 进度百分比，单调不减
        progress: u8,
        /// 服务端状态（大写）
        status_label: Option<String>,
    },

    Completed {
        job_id: String,
        /// 转写结果（Markdown）
        result: String,
        status_label: Option<String>,
    },

    Failed {
        job_id: String,
        reason: String,
        error_code: Option<String>,
    },
}

impl JobState {
    pub fn in_progress(job_id: impl Into<String>, progress: u8, status_label: Option<String>) -> Self {
        Self::InProgress {
            job_id: job_id.into(),
            progress: progress.min(100),
            status_label,
        }
    }

    pub fn completed(job_id: impl Into<String>, result: impl Into<String>) -> Self {
        Self::Completed {
            job_id: job_id.into(),
            result: result.into(),
            status_label: None,
        }
    }

    pub fn failed(job_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Failed {
            job_id: job_id.into(),
            reason: reason.into(),
            error_code: None,
        }
    }

    /// 是否为终止状态
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed { .. } | Self::Failed { .. })
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    pub fn job_id(&self) -> Option<&str> {
        match self {
            Self::Idle => None,
            Self::InProgress { job_id, .. }
            | Self::Completed { job_id, .. }
            | Self::Failed { job_id, .. } => Some(job_id),
        }
    }

    /// 当前进度（仅进行中）
    pub fn progress(&self) -> Option<u8> {
        match self {
            Self::InProgress { progress, .. } => Some(*progress),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::InProgress { .. } => "InProgress",
            Self::Completed { .. } => "Completed",
            Self::Failed { .. } => "Failed",
        }
    }
}

impl Default for JobState {
    fn default() -> Self {
        Self::Idle
    }
}
