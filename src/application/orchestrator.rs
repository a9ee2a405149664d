//! The popup flow: discover, follow a redirect if needed, pick a source and
//! ask the content script to download it.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::api::bus::NO_RECEIVER;
use crate::api::{ActionResponse, MessagePort, Request, VideoInfoResponse};
use crate::config::{DownloadRoute, PopupConfig};
use crate::domain::{AppError, DownloadPhase, SourceDescriptor, StatusLine, VideoInfo};
use crate::host::TabSession;

const NOT_LOADED: &str = "Extension not loaded on video page. Please reload the page.";

/// Whether `url` is an intermediate link that still has to be followed.
pub fn is_redirect_url(url: &str) -> bool {
    url.contains("/vsrc/") || !url.contains("www47")
}

/// HD first, then SD, then whatever came first.
pub fn select_best_source(sources: &[SourceDescriptor]) -> Option<&SourceDescriptor> {
    sources
        .iter()
        .find(|s| s.src.contains("/hd/"))
        .or_else(|| sources.iter().find(|s| s.src.contains("/sd/")))
        .or_else(|| sources.first())
}

/// Receives the intermediate status messages of a running flow.
pub trait StatusSink: Send + Sync {
    fn progress(&self, message: &str);
}

#[cfg(test)]
pub struct NoStatus;

#[cfg(test)]
impl StatusSink for NoStatus {
    fn progress(&self, _message: &str) {}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowReport {
    pub status: StatusLine,
    pub phases: Vec<DownloadPhase>,
}

struct PhaseTrail {
    phases: Vec<DownloadPhase>,
}

impl PhaseTrail {
    fn new() -> Self {
        Self {
            phases: vec![DownloadPhase::Idle],
        }
    }

    fn current(&self) -> DownloadPhase {
        self.phases.last().copied().unwrap_or(DownloadPhase::Idle)
    }

    fn advance(&mut self, next: DownloadPhase) {
        let current = self.current();
        if current.can_advance_to(next) {
            log::debug!("phase {:?} -> {:?}", current, next);
            self.phases.push(next);
        } else {
            log::error!("ignoring phase change {:?} -> {:?}", current, next);
        }
    }
}

pub struct Orchestrator {
    config: PopupConfig,
    runtime: Option<MessagePort>,
}

impl Orchestrator {
    pub fn new(config: PopupConfig) -> Self {
        Self {
            config,
            runtime: None,
        }
    }

    /// Port to the service worker, used when downloads are routed there.
    pub fn with_runtime(mut self, runtime: MessagePort) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Runs one flow against `tab`. Always ends in exactly one status line.
    pub async fn run(&self, tab: &dyn TabSession, status: &dyn StatusSink) -> FlowReport {
        let mut trail = PhaseTrail::new();
        let line = match self.drive(tab, status, &mut trail).await {
            Ok(line) => {
                trail.advance(DownloadPhase::Done);
                line
            }
            Err(err) => {
                log::error!("download flow failed: {}", err);
                trail.advance(DownloadPhase::Failed);
                StatusLine::error(err.to_string())
            }
        };

        FlowReport {
            status: line,
            phases: trail.phases,
        }
    }

    async fn drive(
        &self,
        tab: &dyn TabSession,
        status: &dyn StatusSink,
        trail: &mut PhaseTrail,
    ) -> Result<StatusLine, AppError> {
        let url = tab.url();
        if !self.config.is_supported_site(&url) {
            return Err(AppError::NotOnSupportedSite);
        }
        log::info!("tab URL: {}", url);

        trail.advance(DownloadPhase::Discovering);
        let mut video_info = self.discover(tab).await?;

        let redirected = is_redirect_url(&video_info.url);
        if redirected {
            trail.advance(DownloadPhase::Redirecting);
            video_info = self.follow_redirect(tab, video_info, status, trail).await?;
        }

        if let Some(source) = select_best_source(&video_info.sources) {
            video_info.url = source.src.clone();
        }
        trail.advance(DownloadPhase::SourceSelected);

        trail.advance(DownloadPhase::Downloading);
        let response = self.request_download(tab, video_info, redirected, status).await?;
        interpret(response)
    }

    async fn discover(&self, tab: &dyn TabSession) -> Result<VideoInfo, AppError> {
        let value = tab.send_message(&Request::GetVideoInfo).await.map_err(|err| {
            log::error!("failed to get video info: {}", err);
            AppError::MessagingFailure(NOT_LOADED.to_string())
        })?;

        let response: VideoInfoResponse = parse(value)?;
        match response {
            VideoInfoResponse {
                success: true,
                video_info: Some(video_info),
                ..
            } => {
                log::debug!("video info received: {}", video_info.url);
                Ok(video_info)
            }
            VideoInfoResponse { message, .. } => Err(AppError::SourceNotFound(
                message.unwrap_or_else(|| "Failed to get video info".to_string()),
            )),
        }
    }

    async fn follow_redirect(
        &self,
        tab: &dyn TabSession,
        video_info: VideoInfo,
        status: &dyn StatusSink,
        trail: &mut PhaseTrail,
    ) -> Result<VideoInfo, AppError> {
        log::info!("initial URL is an intermediate redirect URL: {}", video_info.url);

        if let Err(err) = tab.send_message(&Request::TriggerRedirect { video_info }).await {
            log::error!("failed to send redirect trigger: {}", err);
        }

        trail.advance(DownloadPhase::WaitingForNavigation);
        tokio::time::sleep(self.config.redirect_wait()).await;
        status.progress("Getting final URL...");

        if let Err(err) = tab.execute_content_script().await {
            log::warn!("content script injection failed (continuing): {}", err);
        }

        trail.advance(DownloadPhase::Rediscovering);
        self.retry_get_video_info(tab).await
    }

    async fn retry_get_video_info(&self, tab: &dyn TabSession) -> Result<VideoInfo, AppError> {
        let mut last_err = None;

        for attempt in 1..=self.config.max_retries {
            match tab.send_message(&Request::GetVideoInfo).await {
                Ok(value) => match parse::<VideoInfoResponse>(value) {
                    Ok(VideoInfoResponse {
                        success: true,
                        video_info: Some(video_info),
                        ..
                    }) => return Ok(video_info),
                    Ok(response) => {
                        last_err = Some(response.message.unwrap_or_else(|| "empty response".to_string()))
                    }
                    Err(err) => last_err = Some(err.to_string()),
                },
                Err(err) => last_err = Some(err.to_string()),
            }

            log::debug!("retrying getVideoInfo after redirect (attempt {})", attempt);
            tokio::time::sleep(self.config.retry_delay()).await;
        }

        Err(AppError::RedirectTimeout(
            last_err.unwrap_or_else(|| "Retry failed".to_string()),
        ))
    }

    async fn request_download(
        &self,
        tab: &dyn TabSession,
        video_info: VideoInfo,
        redirected: bool,
        status: &dyn StatusSink,
    ) -> Result<ActionResponse, AppError> {
        status.progress(if redirected {
            "Starting final download..."
        } else {
            "Starting download..."
        });

        let failure = if redirected {
            "Final download error occurred"
        } else {
            "Download error occurred"
        };
        let unsent = |err: AppError| {
            log::error!("failed to send download message: {}", err);
            AppError::MessagingFailure(failure.to_string())
        };

        match self.config.download_route {
            DownloadRoute::Page => {
                let value = tab
                    .send_message(&Request::DownloadVideo { video_info })
                    .await
                    .map_err(unsent)?;
                parse(value).map_err(|_| invalid_download_response())
            }
            DownloadRoute::ServiceWorker => {
                let runtime = self
                    .runtime
                    .as_ref()
                    .ok_or_else(|| unsent(AppError::MessagingFailure(NO_RECEIVER.to_string())))?;
                runtime
                    .send(&Request::DownloadToFile { video_info })
                    .await
                    .map_err(|err| match err {
                        AppError::InvalidResponse(_) => invalid_download_response(),
                        other => unsent(other),
                    })
            }
        }
    }
}

fn parse<T: DeserializeOwned>(value: Value) -> Result<T, AppError> {
    serde_json::from_value(value).map_err(|err| AppError::InvalidResponse(err.to_string()))
}

fn interpret(response: ActionResponse) -> Result<StatusLine, AppError> {
    match response {
        ActionResponse {
            success: true,
            warning: true,
            message,
            ..
        } => Ok(StatusLine::warning(or_default(message, "Warning"))),
        ActionResponse {
            success: true,
            message,
            ..
        } => Ok(StatusLine::success(or_default(message, "Download started"))),
        ActionResponse { message, .. } if !message.is_empty() => {
            Err(AppError::HostDownloadRejected(message))
        }
        _ => Err(invalid_download_response()),
    }
}

fn invalid_download_response() -> AppError {
    AppError::InvalidResponse("Invalid download response".to_string())
}

fn or_default(message: String, fallback: &str) -> String {
    if message.is_empty() {
        fallback.to_string()
    } else {
        message
    }
}
