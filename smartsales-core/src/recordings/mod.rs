//! 设备录音同步
//!
//! 把设备上的录音同步到本地，并驱动转写流水线
//!
//! # 模块结构
//!
//! - `models` - 录音与列表状态
//! - `uploader` - 音频上传契约
//! - `service` - 同步服务
//! - `error` - 同步错误类型

mod error;
mod models;
mod service;
mod uploader;

pub use error::{SyncError, SyncResult};
pub use models::{transcript_preview, AudioFilesState, AudioRecording, RecordingStatus, MAX_PREVIEW_CHARS};
pub use service::AudioSyncService;
pub use uploader::{AudioUpload, AudioUploader, LocalFileUploader};
