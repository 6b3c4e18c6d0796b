use thiserror::Error;

use crate::jobs::JobError;
use crate::media::MediaError;

/// 录音同步错误
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Device is not connected")]
    NotConnected,

    #[error("Recording not found: {0}")]
    UnknownRecording(String),

    #[error(transparent)]
    Media(#[from] MediaError),

    #[error(transparent)]
    Job(#[from] JobError),
}

pub type SyncResult<T> = Result<T, SyncError>;
