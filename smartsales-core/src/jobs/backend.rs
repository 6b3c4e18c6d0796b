//! 任务后端契约与状态归一化

use async_trait::async_trait;

use super::error::{JobError, JobResult};
use super::transcription::TranscriptionRequest;

/// 进行中任务的进度上限
pub const MAX_IN_PROGRESS_PERCENT: u8 = 95;

/// 单次轮询的原始结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobPoll {
    /// 服务端状态字符串，大小写不敏感
    pub status: Option<String>,
    /// 服务端上报的进度
    pub progress: Option<u8>,
    /// 完成时附带的结果
    pub result: Option<String>,
    pub error_message: Option<String>,
    pub error_code: Option<String>,
}

impl JobPoll {
    pub fn with_status(status: impl Into<String>) -> Self {
        Self {
            status: Some(status.into()),
            ..Self::default()
        }
    }

    pub fn with_progress(mut self, progress: u8) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn with_result(mut self, result: impl Into<String>) -> Self {
        self.result = Some(result.into());
        self
    }

    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }

    /// 大写后的状态，缺失时为 UNKNOWN
    pub fn normalized_status(&self) -> String {
        self.status
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_ascii_uppercase)
            .unwrap_or_else(|| "UNKNOWN".to_string())
    }

    /// 归一化后的阶段
    pub fn phase(&self) -> JobPhase {
        match self.normalized_status().as_str() {
            "FAILED" | "ERROR" => JobPhase::Failed,
            "SUCCEEDED" | "COMPLETED" | "FINISHED" => JobPhase::Completed,
            _ => JobPhase::Running,
        }
    }

    /// 推断进度，上限 95
    pub fn inferred_progress(&self) -> u8 {
        let progress = self.progress.unwrap_or_else(|| {
            match self.normalized_status().as_str() {
                "PENDING" => 5,
                "QUEUED" => 10,
                "PROCESSING" | "RUNNING" => 50,
                "TRANSCRIBING" => 75,
                _ => 20,
            }
        });
        progress.min(MAX_IN_PROGRESS_PERCENT)
    }
}

/// 任务阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobPhase {
    Running,
    Completed,
    Failed,
}

/// 异步任务后端
#[async_trait]
pub trait JobBackend: Send + Sync {
    /// 创建任务，返回任务 ID
    async fn create(&self, request: &TranscriptionRequest) -> JobResult<String>;

    /// 查询任务状态
    async fn poll(&self, job_id: &str) -> JobResult<JobPoll>;

    /// 拉取结果（轮询结果未附带时调用）
    async fn fetch_result(&self, job_id: &str) -> JobResult<String> {
        Err(JobError::Backend(format!("no result available for {job_id}")))
    }
}
