use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crate::api::{ActionResponse, Envelope, MessageListener, Request, VideoInfoResponse};
use crate::config::ScraperConfig;
use crate::domain::{SourceDescriptor, VideoInfo};
use crate::host::loader::PageError;
use crate::host::{HiddenLink, Tab};
use crate::utils::sanitize_filename;

use super::discovery::discover;
use super::filename::{derive_title, page_heading};

/// Session storage key holding the last URL a download or redirect was triggered for.
pub const LAST_DOWNLOAD_KEY: &str = "__tokyomotion_last_download_url__";
pub const DOWNLOAD_LINK_ID: &str = "__extension_download_link__";
pub const REDIRECT_LINK_ID: &str = "__extension_redirect_link__";

/// Calls `attempt` until it yields something, at most `max_attempts` times
/// with `delay` in between.
pub async fn poll<T, F, Fut>(max_attempts: u32, delay: Duration, mut attempt: F) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    let max_attempts = max_attempts.max(1);
    for n in 1..=max_attempts {
        if let Some(found) = attempt().await {
            log::debug!("found on attempt {}", n);
            return Some(found);
        }
        if n < max_attempts {
            log::debug!("nothing yet, retrying in {:?} (attempt {})", delay, n);
            tokio::time::sleep(delay).await;
        }
    }
    None
}

/// The page scraper. One instance per page window, listening on the tab's port.
pub struct ContentScript {
    tab: Arc<Tab>,
    config: ScraperConfig,
    last_downloaded: Mutex<Option<String>>,
}

impl ContentScript {
    pub fn new(tab: Arc<Tab>) -> Self {
        let config = tab.scraper_config().clone();
        let last_downloaded = tab.session().get_item(LAST_DOWNLOAD_KEY);
        Self {
            tab,
            config,
            last_downloaded: Mutex::new(last_downloaded),
        }
    }

    pub fn spawn(tab: Arc<Tab>, listener: MessageListener) {
        log::debug!("content script loaded on {}", tab.location());
        let script = Arc::new(Self::new(tab));
        tokio::spawn(script.listen(listener));
    }

    async fn listen(self: Arc<Self>, mut listener: MessageListener) {
        while let Some(envelope) = listener.recv().await {
            let script = self.clone();
            tokio::spawn(async move { script.handle(envelope).await });
        }
    }

    async fn handle(&self, envelope: Envelope) {
        log::debug!("content script received {}", envelope.action());

        match serde_json::from_value::<Request>(envelope.payload.clone()) {
            Ok(Request::GetVideoInfo) => {
                let response = self.get_video_info().await;
                envelope.respond(&response);
            }
            Ok(Request::TriggerRedirect { video_info }) => {
                envelope.respond(&self.trigger_redirect(&video_info.url));
            }
            Ok(Request::DownloadVideo { video_info }) => {
                envelope.respond(&self.trigger_download(&video_info));
            }
            // Not addressed to the page; leave it unanswered.
            _ => {}
        }
    }

    fn last_downloaded(&self) -> Option<String> {
        self.last_downloaded
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn remember(&self, url: &str) {
        *self
            .last_downloaded
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(url.to_string());
        self.tab.session().set_item(LAST_DOWNLOAD_KEY, url);
    }

    /// Polls the page until a media source shows up.
    pub async fn get_video_info(&self) -> VideoInfoResponse {
        let tab = &self.tab;
        let found = poll(self.config.max_retries, self.config.retry_delay(), move || async move {
            discover(&tab.document_html(), &tab.location())
        })
        .await;

        match found {
            Some(discovery) => {
                log::debug!("sources found via {:?}: {:?}", discovery.strategy, discovery.sources);
                VideoInfoResponse::found(self.build_video_info(discovery.sources))
            }
            None => {
                log::error!("no video sources found after {} attempts", self.config.max_retries);
                VideoInfoResponse::not_found("Video source not found")
            }
        }
    }

    fn build_video_info(&self, sources: Vec<SourceDescriptor>) -> VideoInfo {
        let page_url = self.tab.location();
        let heading = page_heading(&self.tab.document_html());
        let title = derive_title(&page_url, heading.as_deref());
        let url = sources.first().map(|s| s.src.clone()).unwrap_or_default();

        VideoInfo {
            url,
            title,
            referer: page_url,
            sources,
        }
    }

    fn activate(&self, link: HiddenLink) -> Result<(), PageError> {
        let id = link.id.clone();
        self.tab.append_link(link)?;
        self.tab.click_link(&id)?;
        self.tab.remove_link_later(&id, self.config.link_removal_delay());
        Ok(())
    }

    /// Clicks a hidden link to `url`, navigating the page.
    pub fn trigger_redirect(&self, url: &str) -> ActionResponse {
        log::debug!("triggering redirect click to {}", url);
        self.remember(url);

        match self.activate(HiddenLink::navigation(REDIRECT_LINK_ID, url)) {
            Ok(()) => ActionResponse::ok("Redirect triggered"),
            Err(err) => {
                log::error!("redirect trigger failed: {}", err);
                ActionResponse::failed(format!("Failed to trigger redirect: {}", err))
            }
        }
    }

    /// Saves `video_info.url` through a hidden `<a download>` link, unless it
    /// is the URL handled last.
    pub fn trigger_download(&self, video_info: &VideoInfo) -> ActionResponse {
        let url = video_info.url.as_str();

        if self.last_downloaded().as_deref() == Some(url) {
            log::warn!("duplicate download prevented for {}", url);
            return ActionResponse::warning("Duplicate download prevented");
        }
        self.remember(url);

        let filename = sanitize_filename(&format!("{}.mp4", video_info.title));
        self.tab.remove_link(DOWNLOAD_LINK_ID);

        match self.activate(HiddenLink::download(DOWNLOAD_LINK_ID, url, filename.clone())) {
            Ok(()) => ActionResponse::ok(format!("Download started: {}", filename)),
            Err(err) => {
                log::error!("download failed: {}", err);
                ActionResponse::failed(format!("Download failed: {}", err))
            }
        }
    }
}
