use serde::{Deserialize, Serialize};

const AUDIO_EXTENSIONS: [&str; 6] = [".mp3", ".wav", ".m4a", ".aac", ".flac", ".ogg"];

/// File listed by the device media server
///
/// URLs are absolute once returned by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceMediaFile {
    pub name: String,
    #[serde(default)]
    pub size_bytes: u64,
    #[serde(default = "default_mime_type")]
    pub mime_type: String,
    #[serde(default)]
    pub modified_at_millis: i64,
    #[serde(default)]
    pub media_url: String,
    #[serde(default)]
    pub download_url: String,
    #[serde(default)]
    pub duration_millis: Option<u64>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
}

fn default_mime_type() -> String {
    "application/octet-stream".to_string()
}

impl DeviceMediaFile {
    pub fn is_video(&self) -> bool {
        self.mime_type.starts_with("video")
    }

    pub fn is_image(&self) -> bool {
        self.mime_type.starts_with("image")
    }

    /// Audio by MIME type, or by extension when the MIME type is generic
    pub fn is_audio(&self) -> bool {
        if self.mime_type.to_ascii_lowercase().starts_with("audio/") {
            return true;
        }
        let name = self.name.to_ascii_lowercase();
        AUDIO_EXTENSIONS.iter().any(|ext| name.ends_with(ext))
    }
}

/// `GET /files` response body
#[derive(Debug, Default, Deserialize)]
pub(crate) struct FileListResponse {
    #[serde(default)]
    pub files: Vec<DeviceMediaFile>,
}
