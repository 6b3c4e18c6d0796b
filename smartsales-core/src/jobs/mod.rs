//! 异步任务轮询
//!
//! 提交外部任务（转写）并以状态流的形式观察其生命周期
//!
//! # 模块结构
//!
//! - `state` - 任务状态
//! - `backend` - 后端契约与状态归一化
//! - `coordinator` - 轮询协调器
//! - `transcription` - 转写请求与模拟后端
//! - `error` - 任务错误类型

mod backend;
mod coordinator;
mod error;
mod state;
mod transcription;

pub use backend::{JobBackend, JobPhase, JobPoll, MAX_IN_PROGRESS_PERCENT};
pub use coordinator::{JobObserver, JobPollingCoordinator, SUBMITTED_PROGRESS};
pub use error::{JobError, JobResult};
pub use state::JobState;
pub use transcription::{SimulatedTranscriptionBackend, TranscriptionRequest, DEFAULT_LANGUAGE};
