//! 转写任务请求与模拟后端

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use super::backend::{JobBackend, JobPoll};
use super::error::{JobError, JobResult};

/// 默认转写语言
pub const DEFAULT_LANGUAGE: &str = "zh-CN";

/// 转写请求
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptionRequest {
    /// 音频文件名
    pub audio_asset_name: String,
    pub language: String,
    /// 对象存储中的 key
    pub object_key: Option<String>,
    /// 可直接访问的音频 URL
    pub file_url: Option<String>,
}

impl TranscriptionRequest {
    pub fn new(audio_asset_name: impl Into<String>) -> Self {
        Self {
            audio_asset_name: audio_asset_name.into(),
            language: DEFAULT_LANGUAGE.to_string(),
            object_key: None,
            file_url: None,
        }
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn with_object_key(mut self, object_key: impl Into<String>) -> Self {
        self.object_key = Some(object_key.into());
        self
    }

    pub fn with_file_url(mut self, file_url: impl Into<String>) -> Self {
        self.file_url = Some(file_url.into());
        self
    }

    /// 音频来源：优先直接 URL，其次对象 key
    pub fn source(&self) -> JobResult<&str> {
        [&self.file_url, &self.object_key]
            .into_iter()
            .flatten()
            .map(|s| s.trim())
            .find(|s| !s.is_empty())
            .ok_or_else(|| JobError::InvalidRequest("no accessible audio url or object key".to_string()))
    }
}

/// 模拟转写后端
///
/// 每次轮询推进一个阶段：QUEUED → TRANSCRIBING → COMPLETED
#[derive(Default)]
pub struct SimulatedTranscriptionBackend {
    jobs: Mutex<HashMap<String, SimulatedJob>>,
}

struct SimulatedJob {
    request: TranscriptionRequest,
    polls: u32,
}

const SIMULATED_PHASES: [&str; 3] = ["QUEUED", "TRANSCRIBING", "COMPLETED"];

impl SimulatedTranscriptionBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobBackend for SimulatedTranscriptionBackend {
    async fn create(&self, request: &TranscriptionRequest) -> JobResult<String> {
        request.source()?;

        let mut jobs = self.jobs.lock().await;
        let job_id = format!("tingwu-{}", jobs.len() + 1);
        jobs.insert(
            job_id.clone(),
            SimulatedJob {
                request: request.clone(),
                polls: 0,
            },
        );
        Ok(job_id)
    }

    async fn poll(&self, job_id: &str) -> JobResult<JobPoll> {
        let mut jobs = self.jobs.lock().await;
        let job = jobs
            .get_mut(job_id)
            .ok_or_else(|| JobError::Backend(format!("unknown job {job_id}")))?;

        let phase = SIMULATED_PHASES[(job.polls as usize).min(SIMULATED_PHASES.len() - 1)];
        job.polls += 1;

        let poll = JobPoll::with_status(phase);
        if phase == "COMPLETED" {
            let markdown = format!(
                "## {} 转写\n- 语言: {}\n- 关键句: 客户确认了下季度的采购计划。",
                job.request.audio_asset_name, job.request.language
            );
            return Ok(poll.with_result(markdown));
        }
        Ok(poll)
    }
}
