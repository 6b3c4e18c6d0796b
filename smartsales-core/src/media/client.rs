//! HTTP client for the media server running on the device
//!
//! The device exposes a small REST surface once it is on Wi-Fi:
//! `GET /files`, `POST /upload`, `POST /apply/<name>` and
//! `DELETE /delete/<name>`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Method};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::config::MediaConfig;
use crate::media::error::{MediaError, MediaResult};
use crate::media::models::{DeviceMediaFile, FileListResponse};
use crate::media::url::{absolute_url, endpoint_url, normalize_base_url};

/// Operations against the device media server
#[async_trait]
pub trait DeviceMediaGateway: Send + Sync {
    /// List files; returned URLs are absolute
    async fn fetch_files(&self, base_url: &str) -> MediaResult<Vec<DeviceMediaFile>>;

    /// Upload a local file as multipart field `file`
    async fn upload_file(&self, base_url: &str, path: &Path) -> MediaResult<()>;

    /// Ask the device to use `file_name` (e.g. as wallpaper)
    async fn apply_file(&self, base_url: &str, file_name: &str) -> MediaResult<()>;

    async fn delete_file(&self, base_url: &str, file_name: &str) -> MediaResult<()>;

    /// Download into `dest_dir`, returning the local path
    async fn download_file(&self, base_url: &str, file: &DeviceMediaFile, dest_dir: &Path) -> MediaResult<PathBuf>;
}

/// [`DeviceMediaGateway`] backed by `reqwest`
///
/// # Example
/// ```no_run
/// use smartsales_lib::config::MediaConfig;
/// use smartsales_lib::media::{DeviceMediaGateway, HttpMediaGateway};
///
/// # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
/// let gateway = HttpMediaGateway::new(&MediaConfig::default())?;
/// let files = gateway.fetch_files("192.168.50.10:8000").await?;
/// println!("{} files on device", files.len());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct HttpMediaGateway {
    client: Client,
    transfer_timeout: Duration,
}

impl HttpMediaGateway {
    /// Build a client with the configured request timeout
    pub fn new(config: &MediaConfig) -> MediaResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()?;
        Ok(Self::with_client(client, config))
    }

    /// Reuse an existing client
    pub fn with_client(client: Client, config: &MediaConfig) -> Self {
        Self {
            client,
            transfer_timeout: Duration::from_millis(config.transfer_timeout_ms),
        }
    }

    async fn send_simple(&self, method: Method, base_url: &str, action: &str, file_name: &str) -> MediaResult<()> {
        let url = endpoint_url(base_url, &[action, file_name])?;
        debug!("{} {}", method, url);

        let response = self.client.request(method.clone(), url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            warn!("{} {} returned {}", method, url, status);
            return Err(MediaError::Status {
                method: method_name(&method),
                path: url.path().to_string(),
                status: status.as_u16(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl DeviceMediaGateway for HttpMediaGateway {
    async fn fetch_files(&self, base_url: &str) -> MediaResult<Vec<DeviceMediaFile>> {
        let base = normalize_base_url(base_url).ok_or_else(|| MediaError::InvalidBaseUrl(base_url.to_string()))?;
        let url = endpoint_url(&base, &["files"])?;

        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(MediaError::Status {
                method: "GET",
                path: url.path().to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.text().await?;
        let listing: FileListResponse = serde_json::from_str(&body)?;
        let files: Vec<DeviceMediaFile> = listing
            .files
            .into_iter()
            .filter(|file| !file.name.is_empty())
            .map(|mut file| {
                if !file.media_url.is_empty() {
                    file.media_url = absolute_url(&base, &file.media_url);
                }
                if !file.download_url.is_empty() {
                    file.download_url = absolute_url(&base, &file.download_url);
                }
                file
            })
            .collect();

        debug!("Fetched {} files from {}", files.len(), base);
        Ok(files)
    }

    async fn upload_file(&self, base_url: &str, path: &Path) -> MediaResult<()> {
        let url = endpoint_url(base_url, &["upload"])?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload.bin".to_string());
        let bytes = tokio::fs::read(path).await?;
        let size = bytes.len();

        let part = Part::bytes(bytes)
            .file_name(file_name.clone())
            .mime_str("application/octet-stream")?;
        let form = Form::new().part("file", part);

        let response = self
            .client
            .post(url.clone())
            .timeout(self.transfer_timeout)
            .multipart(form)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(MediaError::Status {
                method: "POST",
                path: url.path().to_string(),
                status: status.as_u16(),
            });
        }

        info!("Uploaded {} ({} bytes) to device", file_name, size);
        Ok(())
    }

    async fn apply_file(&self, base_url: &str, file_name: &str) -> MediaResult<()> {
        self.send_simple(Method::POST, base_url, "apply", file_name).await
    }

    async fn delete_file(&self, base_url: &str, file_name: &str) -> MediaResult<()> {
        self.send_simple(Method::DELETE, base_url, "delete", file_name).await
    }

    async fn download_file(&self, base_url: &str, file: &DeviceMediaFile, dest_dir: &Path) -> MediaResult<PathBuf> {
        let base = normalize_base_url(base_url).ok_or_else(|| MediaError::InvalidBaseUrl(base_url.to_string()))?;
        let source = if !file.download_url.is_empty() {
            &file.download_url
        } else {
            &file.media_url
        };
        if source.is_empty() {
            return Err(MediaError::InvalidBaseUrl(format!("no download url for {}", file.name)));
        }
        let url = absolute_url(&base, source);

        // Only the final component of the device-reported name is used locally
        let local_name = Path::new(&file.name)
            .file_name()
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidInput, format!("invalid file name: {}", file.name)))?;
        tokio::fs::create_dir_all(dest_dir).await?;
        let destination = dest_dir.join(local_name);

        let response = self.client.get(&url).timeout(self.transfer_timeout).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(MediaError::Status {
                method: "GET",
                path: url,
                status: status.as_u16(),
            });
        }

        let mut output = tokio::fs::File::create(&destination).await?;
        let mut stream = response.bytes_stream();
        let mut written: u64 = 0;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            output.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        output.flush().await?;

        debug!("Downloaded {} ({} bytes) to {:?}", file.name, written, destination);
        Ok(destination)
    }
}

fn method_name(method: &Method) -> &'static str {
    if *method == Method::POST {
        "POST"
    } else if *method == Method::DELETE {
        "DELETE"
    } else {
        "GET"
    }
}
