//! 异步任务轮询协调器
//!
//! 提交一次外部任务，按任务 ID 暴露可重复订阅的状态流。
//! 同一任务只会有一个轮询器；观察者之间共享同一份状态。

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use futures_util::stream::{self, BoxStream, StreamExt};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::backend::{JobBackend, JobPhase};
use super::error::{JobError, JobResult};
use super::state::JobState;
use super::transcription::TranscriptionRequest;
use crate::config::TranscriptionConfig;

/// 提交成功后的初始进度
pub const SUBMITTED_PROGRESS: u8 = 1;

/// 单个任务的状态流
pub type JobObserver = BoxStream<'static, JobState>;

struct JobEntry {
    tx: watch::Sender<JobState>,
    poller: Option<JoinHandle<()>>,
}

impl JobEntry {
    fn new() -> Self {
        let (tx, _rx) = watch::channel(JobState::Idle);
        Self { tx, poller: None }
    }

    fn is_polling(&self) -> bool {
        self.poller.as_ref().is_some_and(|task| !task.is_finished())
    }
}

/// 任务轮询协调器
pub struct JobPollingCoordinator {
    backend: Arc<dyn JobBackend>,
    config: TranscriptionConfig,
    jobs: Mutex<HashMap<String, JobEntry>>,
    shut_down: AtomicBool,
}

impl JobPollingCoordinator {
    pub fn new(backend: Arc<dyn JobBackend>, config: TranscriptionConfig) -> Self {
        Self {
            backend,
            config,
            jobs: Mutex::new(HashMap::new()),
            shut_down: AtomicBool::new(false),
        }
    }

    /// 提交任务
    ///
    /// 只等待任务创建，不等待完成；成功后立即开始轮询
    pub async fn submit(&self, request: &TranscriptionRequest) -> JobResult<String> {
        request.source()?;
        self.ensure_running()?;
        info!(asset = %request.audio_asset_name, language = %request.language, "Submitting job");

        let job_id = self.backend.create(request).await?;
        if job_id.trim().is_empty() {
            return Err(JobError::MissingJobId);
        }

        let mut jobs = self.lock_jobs()?;
        self.ensure_running()?;
        let entry = jobs.entry(job_id.clone()).or_insert_with(JobEntry::new);
        entry.tx.send_replace(JobState::in_progress(
            job_id.clone(),
            SUBMITTED_PROGRESS,
            Some("SUBMITTED".to_string()),
        ));
        self.start_polling(&job_id, entry);

        info!(job_id = %job_id, "Job submitted");
        Ok(job_id)
    }

    /// 观察任务
    ///
    /// 先发出当前状态，之后发出每次变化，终止状态发出后结束。
    /// 未知的任务 ID 从 Idle 开始并恢复轮询，不会重新提交。
    ///
    /// 丢弃返回的流只会停止通知该观察者，轮询继续进行。
    /// 关闭后返回 `JobError::ShutDown`。
    pub fn observe_job(&self, job_id: &str) -> JobResult<JobObserver> {
        let mut jobs = self.lock_jobs()?;
        self.ensure_running()?;
        let entry = jobs
            .entry(job_id.to_string())
            .or_insert_with(JobEntry::new);

        if !entry.tx.borrow().is_terminal() && !entry.is_polling() {
            debug!(job_id, "Resuming polling for observed job");
            self.start_polling(job_id, entry);
        }

        Ok(observe(entry.tx.subscribe()))
    }

    /// 最新状态（未知任务为 None）
    pub fn current(&self, job_id: &str) -> Option<JobState> {
        self.jobs
            .lock()
            .ok()?
            .get(job_id)
            .map(|entry| entry.tx.borrow().clone())
    }

    /// 清理已终止且没有观察者的任务
    pub fn prune_finished(&self) -> usize {
        let Ok(mut jobs) = self.jobs.lock() else {
            return 0;
        };
        let before = jobs.len();
        jobs.retain(|_, entry| !(entry.tx.borrow().is_terminal() && entry.tx.receiver_count() == 0));
        before - jobs.len()
    }

    /// 停止所有轮询
    ///
    /// 未结束的任务以失败终止，已有观察者随之结束
    pub fn shutdown(&self) {
        self.shut_down.store(true, Ordering::SeqCst);
        let Ok(mut jobs) = self.jobs.lock() else {
            return;
        };
        for (job_id, entry) in jobs.iter_mut() {
            if let Some(task) = entry.poller.take() {
                task.abort();
            }
            publish(&entry.tx, JobState::failed(job_id.clone(), JobError::ShutDown.to_string()));
        }
    }

    fn ensure_running(&self) -> JobResult<()> {
        if self.shut_down.load(Ordering::SeqCst) {
            return Err(JobError::ShutDown);
        }
        Ok(())
    }

    fn lock_jobs(&self) -> JobResult<std::sync::MutexGuard<'_, HashMap<String, JobEntry>>> {
        self.jobs
            .lock()
            .map_err(|_| JobError::Backend("job table poisoned".to_string()))
    }

    fn start_polling(&self, job_id: &str, entry: &mut JobEntry) {
        if entry.is_polling() {
            return;
        }
        entry.poller = Some(tokio::spawn(poll_job(
            Arc::clone(&self.backend),
            entry.tx.clone(),
            job_id.to_string(),
            self.config.clone(),
        )));
    }
}

impl Drop for JobPollingCoordinator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// 将 watch 接收端转为状态流，终止状态后结束
fn observe(rx: watch::Receiver<JobState>) -> JobObserver {
    stream::unfold((rx, false, true), |(mut rx, finished, first)| async move {
        if finished {
            return None;
        }
        if !first && rx.changed().await.is_err() {
            return None;
        }
        let state = rx.borrow_and_update().clone();
        let terminal = state.is_terminal();
        Some((state, (rx, terminal, false)))
    })
    .boxed()
}

/// 发布新状态
///
/// 终止状态不会被覆盖；进行中的进度不会回退
fn publish(tx: &watch::Sender<JobState>, next: JobState) {
    tx.send_if_modified(|current| {
        if current.is_terminal() {
            return false;
        }
        let next = match (current.progress(), next) {
            (Some(previous), JobState::InProgress { job_id, progress, status_label }) => {
                JobState::InProgress {
                    job_id,
                    progress: progress.max(previous),
                    status_label,
                }
            }
            (_, next) => next,
        };
        if *current == next {
            return false;
        }
        *current = next;
        true
    });
}

async fn poll_job(
    backend: Arc<dyn JobBackend>,
    tx: watch::Sender<JobState>,
    job_id: String,
    config: TranscriptionConfig,
) {
    let interval = config.poll_interval();
    let timeout = config.poll_timeout();
    let started = Instant::now();

    tokio::time::sleep(config.initial_poll_delay()).await;

    loop {
        if started.elapsed() > timeout {
            warn!(job_id = %job_id, "Polling timed out");
            publish(
                &tx,
                JobState::failed(job_id.clone(), JobError::Timeout(timeout.as_millis() as u64).to_string()),
            );
            break;
        }

        let poll = match backend.poll(&job_id).await {
            Ok(poll) => poll,
            Err(err) => {
                warn!(job_id = %job_id, error = %err, "Polling failed");
                publish(&tx, JobState::failed(job_id.clone(), err.to_string()));
                break;
            }
        };

        let status = poll.normalized_status();
        debug!(job_id = %job_id, status = %status, progress = ?poll.progress, "Job polled");

        match poll.phase() {
            JobPhase::Failed => {
                publish(
                    &tx,
                    JobState::Failed {
                        job_id: job_id.clone(),
                        reason: poll
                            .error_message
                            .clone()
                            .unwrap_or_else(|| "job failed".to_string()),
                        error_code: poll.error_code.clone(),
                    },
                );
                break;
            }
            JobPhase::Completed => {
                let result = match poll.result {
                    Some(result) => Ok(result),
                    None => backend.fetch_result(&job_id).await,
                };
                match result {
                    Ok(result) => {
                        info!(job_id = %job_id, length = result.len(), "Job completed");
                        publish(
                            &tx,
                            JobState::Completed {
                                job_id: job_id.clone(),
                                result,
                                status_label: Some(status),
                            },
                        );
                    }
                    Err(err) => {
                        warn!(job_id = %job_id, error = %err, "Fetching job result failed");
                        publish(&tx, JobState::failed(job_id.clone(), err.to_string()));
                    }
                }
                break;
            }
            JobPhase::Running => {
                publish(
                    &tx,
                    JobState::in_progress(job_id.clone(), poll.inferred_progress(), Some(status)),
                );
            }
        }

        tokio::time::sleep(interval).await;
    }
}
