use thiserror::Error;

/// 异步任务错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JobError {
    /// 请求参数无效
    #[error("Invalid job request: {0}")]
    InvalidRequest(String),

    /// 服务端未返回任务 ID
    #[error("Backend did not return a job id")]
    MissingJobId,

    /// 服务端错误
    #[error("Job backend error: {0}")]
    Backend(String),

    /// 轮询超时
    #[error("Polling timed out after {0}ms")]
    Timeout(u64),

    /// 协调器已关闭
    #[error("Job coordinator shut down")]
    ShutDown,
}

/// 任务模块的结果类型
pub type JobResult<T> = Result<T, JobError>;
