//! 录音同步服务
//!
//! 拉取设备上的录音列表并与本地状态合并；按需执行
//! 下载 → 上传 → 提交转写 → 观察任务 的流水线。
//! 录音表只在一把异步互斥锁下修改，每次修改后发布新的列表状态。

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex as StdMutex, Weak};

use futures_util::StreamExt;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::error::{SyncError, SyncResult};
use super::models::{transcript_preview, AudioFilesState, AudioRecording, RecordingStatus};
use super::uploader::AudioUploader;
use crate::jobs::{JobPollingCoordinator, JobState, TranscriptionRequest, SUBMITTED_PROGRESS};
use crate::media::{DeviceMediaFile, DeviceMediaGateway};

struct Entry {
    recording: AudioRecording,
    file: DeviceMediaFile,
}

struct Observer {
    job_id: String,
    task: JoinHandle<()>,
}

struct Inner {
    gateway: Arc<dyn DeviceMediaGateway>,
    uploader: Arc<dyn AudioUploader>,
    jobs: Arc<JobPollingCoordinator>,
    base_url: watch::Receiver<Option<String>>,
    download_dir: PathBuf,
    recordings: Mutex<HashMap<String, Entry>>,
    state_tx: watch::Sender<AudioFilesState>,
    observers: StdMutex<HashMap<String, Observer>>,
}

/// 录音同步服务
///
/// 设备地址来自 [`DeviceEndpointProvider::subscribe`](crate::media::DeviceEndpointProvider::subscribe)
#[derive(Clone)]
pub struct AudioSyncService {
    inner: Arc<Inner>,
}

impl AudioSyncService {
    pub fn new(
        gateway: Arc<dyn DeviceMediaGateway>,
        uploader: Arc<dyn AudioUploader>,
        jobs: Arc<JobPollingCoordinator>,
        base_url: watch::Receiver<Option<String>>,
        download_dir: PathBuf,
    ) -> Self {
        let (state_tx, _) = watch::channel(AudioFilesState::default());
        Self {
            inner: Arc::new(Inner {
                gateway,
                uploader,
                jobs,
                base_url,
                download_dir,
                recordings: Mutex::new(HashMap::new()),
                state_tx,
                observers: StdMutex::new(HashMap::new()),
            }),
        }
    }

    /// 当前状态
    pub fn state(&self) -> AudioFilesState {
        self.inner.state_tx.borrow().clone()
    }

    /// 订阅状态变更
    pub fn subscribe(&self) -> watch::Receiver<AudioFilesState> {
        self.inner.state_tx.subscribe()
    }

    /// 同步录音列表
    ///
    /// `trigger_transcription` 为 true 时，为每条尚未转写的录音执行转写流水线。
    /// 单条录音失败只标记该录音，不中断其余录音。
    ///
    /// # Errors
    ///
    /// 设备未连接或拉取列表失败时返回错误，并写入 `error_message`
    pub async fn sync(&self, trigger_transcription: bool) -> SyncResult<()> {
        let base = self.require_base_url()?;
        self.inner.state_tx.send_modify(|state| {
            state.is_syncing = true;
            state.error_message = None;
        });

        let files = match self.inner.gateway.fetch_files(&base).await {
            Ok(files) => files,
            Err(err) => {
                warn!(error = %err, "Failed to fetch recordings");
                self.finish_sync(Some(err.to_string()));
                return Err(err.into());
            }
        };

        let pending = {
            let mut recordings = self.inner.recordings.lock().await;
            self.merge(&mut recordings, files);
            self.inner.publish(&recordings);

            recordings
                .values()
                .filter(|entry| entry.recording.needs_transcription())
                .map(|entry| entry.file.clone())
                .collect::<Vec<_>>()
        };

        let mut last_error = None;
        if trigger_transcription {
            debug!(count = pending.len(), "Transcribing new recordings");
            for file in pending {
                if let Err(err) = self.transcribe(&base, &file).await {
                    last_error = Some(err.to_string());
                }
            }
        }

        self.finish_sync(last_error);
        Ok(())
    }

    /// 转写单条录音
    pub async fn transcribe_recording(&self, id: &str) -> SyncResult<()> {
        let base = self.require_base_url()?;
        let file = {
            let recordings = self.inner.recordings.lock().await;
            let entry = recordings
                .get(id)
                .ok_or_else(|| SyncError::UnknownRecording(id.to_string()))?;
            entry.file.clone()
        };

        self.transcribe(&base, &file).await.inspect_err(|err| {
            let message = err.to_string();
            self.inner.state_tx.send_modify(|state| state.error_message = Some(message));
        })
    }

    /// 让设备使用该录音
    pub async fn apply(&self, id: &str) -> SyncResult<()> {
        let base = self.require_base_url()?;
        self.inner
            .gateway
            .apply_file(&base, id)
            .await
            .map_err(|err| self.report(err.into()))
    }

    /// 删除设备上的录音，并从列表中移除
    pub async fn delete(&self, id: &str) -> SyncResult<()> {
        let base = self.require_base_url()?;
        self.inner
            .gateway
            .delete_file(&base, id)
            .await
            .map_err(|err| self.report(err.into()))?;

        let mut recordings = self.inner.recordings.lock().await;
        recordings.remove(id);
        self.inner.stop_observer(id);
        self.inner.publish(&recordings);
        info!(recording = id, "Recording deleted");
        Ok(())
    }

    pub fn dismiss_error(&self) {
        self.inner.state_tx.send_if_modified(|state| state.error_message.take().is_some());
    }

    /// 停止所有任务观察
    pub fn shutdown(&self) {
        let observers = match self.inner.observers.lock() {
            Ok(mut guard) => std::mem::take(&mut *guard),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };
        for observer in observers.into_values() {
            observer.task.abort();
        }
    }

    fn require_base_url(&self) -> SyncResult<String> {
        let base = self.inner.base_url.borrow().clone();
        base.filter(|url| !url.trim().is_empty())
            .ok_or_else(|| self.report(SyncError::NotConnected))
    }

    fn report(&self, err: SyncError) -> SyncError {
        let message = err.to_string();
        self.inner.state_tx.send_modify(|state| state.error_message = Some(message));
        err
    }

    fn finish_sync(&self, error: Option<String>) {
        self.inner.state_tx.send_modify(|state| {
            state.is_syncing = false;
            if error.is_some() {
                state.error_message = error;
            }
        });
    }

    /// 合并新的文件列表：移除消失的文件，保留已有录音的处理状态
    fn merge(&self, recordings: &mut HashMap<String, Entry>, files: Vec<DeviceMediaFile>) {
        let files: HashMap<String, DeviceMediaFile> = files
            .into_iter()
            .filter(DeviceMediaFile::is_audio)
            .map(|file| (file.name.clone(), file))
            .collect();

        let vanished: Vec<String> = recordings
            .keys()
            .filter(|id| !files.contains_key(*id))
            .cloned()
            .collect();
        for id in vanished {
            debug!(recording = %id, "Recording no longer on device");
            recordings.remove(&id);
            self.inner.stop_observer(&id);
        }

        for (id, file) in files {
            match recordings.get_mut(&id) {
                Some(entry) => {
                    entry.recording.refresh_from(&file);
                    entry.file = file;
                }
                None => {
                    recordings.insert(
                        id,
                        Entry {
                            recording: AudioRecording::from_file(&file),
                            file,
                        },
                    );
                }
            }
        }
    }

    async fn transcribe(&self, base: &str, file: &DeviceMediaFile) -> SyncResult<()> {
        let id = file.name.as_str();
        {
            let mut recordings = self.inner.recordings.lock().await;
            let Some(entry) = recordings.get_mut(id) else {
                return Err(SyncError::UnknownRecording(id.to_string()));
            };
            if !entry.recording.needs_transcription() {
                return Ok(());
            }
            entry.recording.status = RecordingStatus::Syncing;
            entry.recording.error = None;
            self.inner.publish(&recordings);
        }

        match self.run_pipeline(base, file).await {
            Ok(job_id) => {
                let mut recordings = self.inner.recordings.lock().await;
                if let Some(entry) = recordings.get_mut(id) {
                    entry.recording.status = RecordingStatus::Transcribing;
                    entry.recording.job_id = Some(job_id.clone());
                    entry.recording.progress = Some(SUBMITTED_PROGRESS);
                    self.inner.publish(&recordings);
                }
                drop(recordings);
                Inner::start_observer(&self.inner, id, &job_id)?;
                Ok(())
            }
            Err(err) => {
                warn!(recording = id, error = %err, "Transcription pipeline failed");
                self.inner.mark_failed(id, None, err.to_string()).await;
                Err(err)
            }
        }
    }

    async fn run_pipeline(&self, base: &str, file: &DeviceMediaFile) -> SyncResult<String> {
        let local = self
            .inner
            .gateway
            .download_file(base, file, &self.inner.download_dir)
            .await?;
        let upload = self.inner.uploader.upload(&local).await?;

        let request = TranscriptionRequest::new(file.name.clone())
            .with_object_key(upload.object_key)
            .with_file_url(upload.presigned_url);
        let job_id = self.inner.jobs.submit(&request).await?;
        info!(recording = %file.name, job_id = %job_id, "Transcription submitted");
        Ok(job_id)
    }
}

impl Inner {
    /// 在锁内发布最新列表
    fn publish(&self, recordings: &HashMap<String, Entry>) {
        let mut list: Vec<AudioRecording> = recordings
            .values()
            .map(|entry| entry.recording.clone())
            .collect();
        list.sort_by(|a, b| {
            b.modified_at_millis
                .cmp(&a.modified_at_millis)
                .then_with(|| a.id.cmp(&b.id))
        });
        self.state_tx.send_modify(|state| state.recordings = list);
    }

    async fn mark_failed(&self, id: &str, job_id: Option<&str>, reason: String) {
        let mut recordings = self.recordings.lock().await;
        let Some(entry) = recordings.get_mut(id) else {
            return;
        };
        if job_id.is_some() && entry.recording.job_id.as_deref() != job_id {
            return;
        }
        entry.recording.status = RecordingStatus::Error;
        entry.recording.error = Some(reason);
        self.publish(&recordings);
    }

    fn start_observer(this: &Arc<Self>, id: &str, job_id: &str) -> SyncResult<()> {
        let stream = this.jobs.observe_job(job_id)?;
        let weak = Arc::downgrade(this);
        let recording_id = id.to_string();
        let owned_job_id = job_id.to_string();

        // 登记先于观察任务的释放
        let mut observers = match this.observers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let task = tokio::spawn(async move {
            observe(weak, recording_id, owned_job_id, stream).await;
        });
        if let Some(previous) = observers.insert(
            id.to_string(),
            Observer {
                job_id: job_id.to_string(),
                task,
            },
        ) {
            previous.task.abort();
        }
        Ok(())
    }

    fn stop_observer(&self, id: &str) {
        let removed = match self.observers.lock() {
            Ok(mut guard) => guard.remove(id),
            Err(poisoned) => poisoned.into_inner().remove(id),
        };
        if let Some(observer) = removed {
            observer.task.abort();
        }
    }

    /// 观察结束后移除自己的登记，不影响之后的新任务
    fn release_observer(&self, id: &str, job_id: &str) {
        let mut observers = match self.observers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if observers.get(id).is_some_and(|observer| observer.job_id == job_id) {
            observers.remove(id);
        }
    }

    async fn apply_job_state(&self, id: &str, job_id: &str, state: &JobState) {
        let mut recordings = self.recordings.lock().await;
        let Some(entry) = recordings.get_mut(id) else {
            return;
        };
        if entry.recording.job_id.as_deref() != Some(job_id) {
            return;
        }

        let recording = &mut entry.recording;
        match state {
            JobState::Idle => return,
            JobState::InProgress { progress, .. } => {
                recording.status = RecordingStatus::Transcribing;
                recording.progress = Some((*progress).max(recording.progress.unwrap_or(0)));
            }
            JobState::Completed { result, .. } => {
                recording.status = RecordingStatus::Transcribed;
                recording.progress = Some(100);
                recording.transcript_preview = Some(transcript_preview(result));
                recording.transcript_markdown = Some(result.clone());
                recording.error = None;
                info!(recording = id, job_id, "Transcription completed");
            }
            JobState::Failed { reason, .. } => {
                recording.status = RecordingStatus::Error;
                recording.error = Some(reason.clone());
                warn!(recording = id, job_id, reason = %reason, "Transcription failed");
            }
        }
        self.publish(&recordings);
    }
}

async fn observe(
    inner: Weak<Inner>,
    recording_id: String,
    job_id: String,
    mut stream: crate::jobs::JobObserver,
) {
    while let Some(state) = stream.next().await {
        let Some(inner) = inner.upgrade() else {
            return;
        };
        inner.apply_job_state(&recording_id, &job_id, &state).await;
        if state.is_terminal() {
            inner.release_observer(&recording_id, &job_id);
            return;
        }
    }
}
