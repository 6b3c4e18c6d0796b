use serde::Serialize;

use crate::media::DeviceMediaFile;

/// 预览最多保留的字符数
pub const MAX_PREVIEW_CHARS: usize = 120;

/// 录音的处理状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum RecordingStatus {
    /// 仅在设备上
    #[default]
    Idle,
    /// 下载、上传或提交中
    Syncing,
    /// 转写任务进行中
    Transcribing,
    Transcribed,
    Error,
}

/// 设备上的一条录音
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AudioRecording {
    /// 文件名，即录音 ID
    pub id: String,
    pub size_bytes: u64,
    pub modified_at_millis: i64,
    pub duration_millis: Option<u64>,
    pub media_url: String,
    pub status: RecordingStatus,
    pub job_id: Option<String>,
    /// 转写进度 (0 - 100)
    pub progress: Option<u8>,
    pub transcript_preview: Option<String>,
    pub transcript_markdown: Option<String>,
    pub error: Option<String>,
}

impl AudioRecording {
    pub fn from_file(file: &DeviceMediaFile) -> Self {
        Self {
            id: file.name.clone(),
            size_bytes: file.size_bytes,
            modified_at_millis: file.modified_at_millis,
            duration_millis: file.duration_millis,
            media_url: file.media_url.clone(),
            status: RecordingStatus::Idle,
            job_id: None,
            progress: None,
            transcript_preview: None,
            transcript_markdown: None,
            error: None,
        }
    }

    /// 用最新的文件信息刷新元数据，保留处理状态
    pub(crate) fn refresh_from(&mut self, file: &DeviceMediaFile) {
        self.size_bytes = file.size_bytes;
        self.modified_at_millis = file.modified_at_millis;
        self.duration_millis = file.duration_millis;
        self.media_url = file.media_url.clone();
    }

    /// 是否需要（重新）转写
    pub fn needs_transcription(&self) -> bool {
        matches!(self.status, RecordingStatus::Idle | RecordingStatus::Error)
    }
}

/// 录音列表的整体状态
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AudioFilesState {
    /// 按修改时间倒序
    pub recordings: Vec<AudioRecording>,
    pub is_syncing: bool,
    pub error_message: Option<String>,
}

impl AudioFilesState {
    pub fn recording(&self, id: &str) -> Option<&AudioRecording> {
        self.recordings.iter().find(|recording| recording.id == id)
    }
}

/// 取第一行非空文本作为预览
pub fn transcript_preview(markdown: &str) -> String {
    let line = markdown
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or_default();
    line.chars().take(MAX_PREVIEW_CHARS).collect()
}
