//! The host download facility.
//!
//! `download` validates the request, creates the target file and returns a
//! [`DownloadId`] right away; the bytes are transferred by a background task
//! that reports progress as [`DownloadDelta`] events.

use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use base64::prelude::*;
use bytes::Bytes;
use futures::StreamExt;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::sync::broadcast;

use super::blob::BlobStore;
use crate::api::MediaClient;
use crate::domain::DownloadId;
use crate::utils::sanitize_filename;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadOptions {
    pub url: String,
    pub filename: String,
    /// Ask the user where to save instead of using the download directory.
    pub save_as: bool,
    pub referer: Option<String>,
}

impl DownloadOptions {
    pub fn new(url: impl Into<String>, filename: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            filename: filename.into(),
            save_as: false,
            referer: None,
        }
    }

    pub fn with_referer(mut self, referer: Option<String>) -> Self {
        self.referer = referer;
        self
    }

    pub fn with_save_as(mut self, save_as: bool) -> Self {
        self.save_as = save_as;
        self
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HostError {
    #[error("Invalid filename")]
    InvalidFilename,

    #[error("File already exists: {0}")]
    FileExists(String),

    #[error("Download canceled by the user")]
    Cancelled,

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Unknown blob URL: {0}")]
    UnknownBlob(String),

    #[error("I/O error: {0}")]
    Io(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadState {
    InProgress,
    Complete,
    Interrupted(String),
}

#[derive(Debug, Clone)]
pub struct DownloadDelta {
    pub id: DownloadId,
    pub state: DownloadState,
    pub bytes_received: u64,
}

#[async_trait]
pub trait DownloadHost: Send + Sync {
    async fn download(&self, options: DownloadOptions) -> Result<DownloadId, HostError>;
}

/// Where to put a download when the user is asked.
#[async_trait]
pub trait SavePrompt: Send + Sync {
    async fn choose(&self, directory: &Path, filename: &str) -> Option<PathBuf>;
}

/// The native save dialog.
pub struct FileDialogPrompt;

#[async_trait]
impl SavePrompt for FileDialogPrompt {
    async fn choose(&self, directory: &Path, filename: &str) -> Option<PathBuf> {
        rfd::AsyncFileDialog::new()
            .set_directory(directory)
            .set_file_name(filename)
            .save_file()
            .await
            .map(|handle| handle.path().to_path_buf())
    }
}

enum Payload {
    Inline(Bytes),
    Remote { url: String, referer: Option<String> },
}

/// Saves downloads below a directory on disk.
pub struct FileDownloadHost {
    client: MediaClient,
    blobs: BlobStore,
    download_dir: PathBuf,
    prompt: Arc<dyn SavePrompt>,
    next_id: AtomicU64,
    events: broadcast::Sender<DownloadDelta>,
}

impl FileDownloadHost {
    pub fn new(
        client: MediaClient,
        blobs: BlobStore,
        download_dir: PathBuf,
        prompt: Arc<dyn SavePrompt>,
    ) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            client,
            blobs,
            download_dir,
            prompt,
            next_id: AtomicU64::new(0),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DownloadDelta> {
        self.events.subscribe()
    }

    fn resolve_payload(&self, options: &DownloadOptions) -> Result<Payload, HostError> {
        let url = options.url.as_str();
        if url.starts_with("data:") {
            return decode_data_url(url).map(Payload::Inline);
        }
        if url.starts_with("blob:") {
            let entry = self
                .blobs
                .get(url)
                .ok_or_else(|| HostError::UnknownBlob(url.to_string()))?;
            log::debug!("blob {}: {} bytes of {}", url, entry.bytes.len(), entry.mime_type);
            return Ok(Payload::Inline(entry.bytes));
        }
        if url.starts_with("http://") || url.starts_with("https://") {
            return Ok(Payload::Remote {
                url: url.to_string(),
                referer: options.referer.clone(),
            });
        }
        Err(HostError::InvalidUrl(url.to_string()))
    }

    async fn create_target(&self, options: &DownloadOptions) -> Result<(tokio::fs::File, PathBuf), HostError> {
        if options.save_as {
            let suggested = target_path(Path::new(""), &options.filename)?;
            let path = self
                .prompt
                .choose(&self.download_dir, &suggested.to_string_lossy())
                .await
                .ok_or(HostError::Cancelled)?;
            // The dialog has already confirmed any overwrite.
            let file = tokio::fs::File::create(&path)
                .await
                .map_err(|e| HostError::Io(e.to_string()))?;
            return Ok((file, path));
        }

        let path = target_path(&self.download_dir, &options.filename)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| HostError::Io(e.to_string()))?;
        }

        let file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::AlreadyExists => {
                    HostError::FileExists(path.display().to_string())
                }
                _ => HostError::Io(e.to_string()),
            })?;
        Ok((file, path))
    }
}

#[async_trait]
impl DownloadHost for FileDownloadHost {
    async fn download(&self, options: DownloadOptions) -> Result<DownloadId, HostError> {
        let payload = self.resolve_payload(&options)?;
        let (file, path) = self.create_target(&options).await?;

        let id = DownloadId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        log::info!("download {} started: {} -> {}", id, options.url, path.display());

        let transfer = Transfer {
            id,
            client: self.client.clone(),
            events: self.events.clone(),
        };
        tokio::spawn(transfer.run(file, path, payload));

        Ok(id)
    }
}

struct Transfer {
    id: DownloadId,
    client: MediaClient,
    events: broadcast::Sender<DownloadDelta>,
}

impl Transfer {
    fn emit(&self, state: DownloadState, bytes_received: u64) {
        // Nobody listening is fine.
        let _ = self.events.send(DownloadDelta {
            id: self.id,
            state,
            bytes_received,
        });
    }

    async fn run(self, mut file: tokio::fs::File, path: PathBuf, payload: Payload) {
        self.emit(DownloadState::InProgress, 0);

        match self.write_payload(&mut file, payload).await {
            Ok(received) => self.emit(DownloadState::Complete, received),
            Err(reason) => {
                drop(file);
                let _ = tokio::fs::remove_file(&path).await;
                self.emit(DownloadState::Interrupted(reason), 0);
            }
        }
    }

    async fn write_payload(&self, file: &mut tokio::fs::File, payload: Payload) -> Result<u64, String> {
        let mut downloaded = 0u64;

        match payload {
            Payload::Inline(bytes) => {
                file.write_all(&bytes)
                    .await
                    .map_err(|e| format!("Write error: {}", e))?;
                downloaded = bytes.len() as u64;
            }
            Payload::Remote { url, referer } => {
                let (_, stream) = self
                    .client
                    .download_file_stream(&url, referer.as_deref())
                    .await
                    .map_err(|e| e.to_string())?;
                let mut stream = Box::pin(stream);

                while let Some(chunk) = stream.next().await {
                    let chunk = chunk.map_err(|e| e.to_string())?;
                    file.write_all(&chunk)
                        .await
                        .map_err(|e| format!("Write error: {}", e))?;
                    downloaded += chunk.len() as u64;
                    self.emit(DownloadState::InProgress, downloaded);
                }
            }
        }

        file.sync_all()
            .await
            .map_err(|e| format!("Failed to sync file: {}", e))?;
        Ok(downloaded)
    }
}

/// Resolves `filename` below `dir`. Each component is sanitized; absolute
/// paths and parent references are refused.
fn target_path(dir: &Path, filename: &str) -> Result<PathBuf, HostError> {
    let relative = Path::new(filename);
    let mut path = dir.to_path_buf();
    let mut components = 0;

    for component in relative.components() {
        match component {
            Component::Normal(part) => {
                let cleaned = sanitize_filename(&part.to_string_lossy());
                if cleaned.is_empty() {
                    return Err(HostError::InvalidFilename);
                }
                path.push(cleaned);
                components += 1;
            }
            Component::CurDir => {}
            _ => return Err(HostError::InvalidFilename),
        }
    }

    if components == 0 {
        return Err(HostError::InvalidFilename);
    }
    Ok(path)
}

/// Decodes the payload of a `data:` URL.
fn decode_data_url(url: &str) -> Result<Bytes, HostError> {
    let rest = url
        .strip_prefix("data:")
        .ok_or_else(|| HostError::InvalidUrl(url.to_string()))?;
    let (header, data) = rest
        .split_once(',')
        .ok_or_else(|| HostError::InvalidUrl("malformed data URL".to_string()))?;

    if header.ends_with(";base64") {
        BASE64_STANDARD
            .decode(data)
            .map(Bytes::from)
            .map_err(|e| HostError::InvalidUrl(format!("bad base64 payload: {}", e)))
    } else {
        Ok(Bytes::from(urlencoding::decode_binary(data.as_bytes()).into_owned()))
    }
}
