use std::sync::Arc;

use base64::prelude::*;
use serde_json::Value;
use tokio::sync::broadcast;

use crate::api::{ActionResponse, ClientError, MediaClient, MessageListener, Request};
use crate::config::DispatcherConfig;
use crate::domain::{AppError, DownloadId, VideoInfo};
use crate::host::{DownloadDelta, DownloadHost, DownloadOptions, DownloadState};
use crate::utils::{ensure_mp4_extension, sanitize_filename, timestamp_millis};

/// Actions answered here; the page-level ones belong to the content script.
const DISPATCHER_ACTIONS: [&str; 5] = [
    "downloadToFile",
    "directDownload",
    "downloadDirectURL",
    "directDownloadMP4",
    "downloadBlob",
];

/// The service worker: turns explicit download requests into host downloads.
pub struct DownloadDispatcher {
    host: Arc<dyn DownloadHost>,
    client: MediaClient,
    config: DispatcherConfig,
    save_as: bool,
}

impl DownloadDispatcher {
    pub fn new(host: Arc<dyn DownloadHost>, client: MediaClient, config: DispatcherConfig) -> Self {
        Self {
            host,
            client,
            config,
            save_as: false,
        }
    }

    /// Asks the host to prompt for a location on every download.
    pub fn with_save_as(mut self, save_as: bool) -> Self {
        self.save_as = save_as;
        self
    }

    pub async fn run(self, mut listener: MessageListener) {
        let dispatcher = Arc::new(self);
        while let Some(envelope) = listener.recv().await {
            let dispatcher = dispatcher.clone();
            tokio::spawn(async move {
                let response = dispatcher.handle(envelope.payload.clone()).await;
                envelope.respond(&response);
            });
        }
        log::debug!("service worker stopped");
    }

    pub async fn handle(&self, payload: Value) -> ActionResponse {
        let action = payload
            .get("action")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        log::debug!("service worker received {}", action);

        let request = match serde_json::from_value::<Request>(payload) {
            Ok(request) => request,
            Err(err) if DISPATCHER_ACTIONS.contains(&action.as_str()) => {
                return ActionResponse::failed(format!("Download failed: {}", err));
            }
            Err(_) => {
                log::error!("unknown action: {}", action);
                return ActionResponse::failed(format!("Unknown action: {}", action));
            }
        };

        let result = match request {
            Request::DownloadToFile { video_info } => self.download_to_file(&video_info).await,
            Request::DirectDownload {
                url,
                filename,
                referer,
            } => self.download_direct_url(&url, &filename, referer).await,
            Request::DirectDownloadMp4 { url, filename } => {
                self.download_direct_mp4(&url, &filename).await
            }
            Request::DownloadBlob { blob_url, filename } => {
                self.download_blob(&blob_url, &filename).await
            }
            other => {
                log::error!("unknown action: {}", other.action());
                return ActionResponse::failed(format!("Unknown action: {}", other.action()));
            }
        };

        match result {
            Ok((filename, id)) => ActionResponse::started(&filename, id),
            Err(err) => ActionResponse::failed(err.to_string()),
        }
    }

    async fn execute_download(&self, options: DownloadOptions) -> Result<(String, DownloadId), AppError> {
        let filename = options.filename.clone();
        match self.host.download(options.with_save_as(self.save_as)).await {
            Ok(id) => {
                log::info!("download started with id {}", id);
                Ok((filename, id))
            }
            Err(err) => {
                log::error!("host download error: {}", err);
                Err(AppError::HostDownloadRejected(format!("Download failed: {}", err)))
            }
        }
    }

    /// Saves as `<title>.mp4`, retrying once under a timestamped name.
    pub async fn download_to_file(&self, video_info: &VideoInfo) -> Result<(String, DownloadId), AppError> {
        let filename = sanitize_filename(&format!("{}.mp4", video_info.title));
        match self
            .execute_download(DownloadOptions::new(&video_info.url, filename))
            .await
        {
            Ok(started) => Ok(started),
            Err(err) => {
                let retry_filename = format!(
                    "{}{}.mp4",
                    self.config.retry_filename_prefix,
                    timestamp_millis()
                );
                log::warn!("{}; retrying with filename {}", err, retry_filename);
                self.execute_download(DownloadOptions::new(&video_info.url, retry_filename))
                    .await
            }
        }
    }

    /// The host follows redirects and sends the referer itself.
    pub async fn download_direct_url(
        &self,
        url: &str,
        filename: &str,
        referer: Option<String>,
    ) -> Result<(String, DownloadId), AppError> {
        self.execute_download(DownloadOptions::new(url, filename).with_referer(referer))
            .await
    }

    /// Fetches the bytes first so the server's disposition cannot rename the file.
    pub async fn download_direct_mp4(&self, url: &str, filename: &str) -> Result<(String, DownloadId), AppError> {
        let final_filename = ensure_mp4_extension(filename);

        let binary = self.client.fetch_binary(url).await.map_err(|err| {
            log::error!("fetch error: {}", err);
            match err {
                ClientError::BodyRead(_) => AppError::FetchFailed("File read error".to_string()),
                other => AppError::FetchFailed(format!("Download failed: {}", other)),
            }
        })?;
        log::debug!(
            "blob received: {} bytes, type: {:?}",
            binary.bytes.len(),
            binary.content_type
        );

        let data_url = to_data_url(&binary.bytes, binary.content_type.as_deref());
        self.execute_download(DownloadOptions::new(data_url, final_filename))
            .await
    }

    pub async fn download_blob(&self, blob_url: &str, filename: &str) -> Result<(String, DownloadId), AppError> {
        self.execute_download(DownloadOptions::new(blob_url, filename))
            .await
    }
}

fn to_data_url(bytes: &[u8], content_type: Option<&str>) -> String {
    let mime = content_type
        .and_then(|ct| ct.split(';').next())
        .map(str::trim)
        .filter(|ct| !ct.is_empty())
        .unwrap_or("application/octet-stream");
    format!("data:{};base64,{}", mime, BASE64_STANDARD.encode(bytes))
}

/// Logs host download state changes until the host goes away.
pub async fn watch_downloads(mut deltas: broadcast::Receiver<DownloadDelta>) {
    loop {
        match deltas.recv().await {
            Ok(delta) => match delta.state {
                DownloadState::InProgress => {
                    log::debug!("download {}: {} bytes", delta.id, delta.bytes_received)
                }
                DownloadState::Complete => {
                    log::info!("download {} complete ({} bytes)", delta.id, delta.bytes_received)
                }
                DownloadState::Interrupted(reason) => {
                    log::warn!("download {} interrupted: {}", delta.id, reason)
                }
            },
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                log::debug!("skipped {} download events", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
