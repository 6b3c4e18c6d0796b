use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::media::{MediaError, MediaResult};

/// 上传后的对象存储位置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioUpload {
    pub object_key: String,
    /// 转写服务可直接拉取的地址
    pub presigned_url: String,
}

/// 把本地音频上传到转写服务可访问的存储
#[async_trait]
pub trait AudioUploader: Send + Sync {
    async fn upload(&self, path: &Path) -> MediaResult<AudioUpload>;
}

/// 不上传，直接引用本地文件
///
/// 配合模拟转写后端使用
#[derive(Debug, Default, Clone)]
pub struct LocalFileUploader;

#[async_trait]
impl AudioUploader for LocalFileUploader {
    async fn upload(&self, path: &Path) -> MediaResult<AudioUpload> {
        let metadata = tokio::fs::metadata(path).await?;
        if !metadata.is_file() {
            return Err(MediaError::Upload(format!("not a file: {}", path.display())));
        }
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| MediaError::Upload(format!("invalid path: {}", path.display())))?;

        Ok(AudioUpload {
            object_key: format!("local/{name}"),
            presigned_url: format!("file://{}", path.display()),
        })
    }
}
