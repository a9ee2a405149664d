//! A browser tab: the current document, its session storage, the hidden
//! links the content script adds, and the content script's message port.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, Weak};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use super::downloads::{DownloadHost, DownloadOptions};
use super::loader::{LoadedDocument, PageError, PageLoader};
use super::session::SessionStorage;
use crate::api::bus::NO_RECEIVER;
use crate::api::{channel, MessagePort, Request};
use crate::config::ScraperConfig;
use crate::content::ContentScript;
use crate::domain::AppError;

pub type TabId = u64;

/// What the popup can do with the active tab.
#[async_trait]
pub trait TabSession: Send + Sync {
    fn url(&self) -> String;

    /// Sends `request` to the content script running in the tab.
    async fn send_message(&self, request: &Request) -> Result<Value, AppError>;

    /// Injects the content script; a no-op when the page already runs it.
    async fn execute_content_script(&self) -> Result<(), AppError>;
}

/// A link the content script appended to the page body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HiddenLink {
    pub id: String,
    pub href: String,
    /// Set for `<a download=...>` links.
    pub download: Option<String>,
}

impl HiddenLink {
    pub fn navigation(id: impl Into<String>, href: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            href: href.into(),
            download: None,
        }
    }

    pub fn download(id: impl Into<String>, href: impl Into<String>, filename: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            href: href.into(),
            download: Some(filename.into()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TabSettings {
    pub scraper: ScraperConfig,
    pub auto_inject: bool,
    /// Hosts the content script is injected into on load.
    pub matches: Vec<String>,
    /// Link downloads ask where to save.
    pub save_as: bool,
}

/// Per-window content script state. Reset by every navigation.
#[derive(Default)]
struct ContentSlot {
    initialized: bool,
    port: Option<MessagePort>,
}

pub struct Tab {
    id: TabId,
    me: Weak<Tab>,
    settings: TabSettings,
    document: RwLock<LoadedDocument>,
    links: Mutex<Vec<HiddenLink>>,
    content: Mutex<ContentSlot>,
    closed: AtomicBool,
    session: SessionStorage,
    loader: Arc<dyn PageLoader>,
    downloads: Arc<dyn DownloadHost>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Tab {
    pub fn new(
        id: TabId,
        settings: TabSettings,
        loader: Arc<dyn PageLoader>,
        downloads: Arc<dyn DownloadHost>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            id,
            me: me.clone(),
            settings,
            document: RwLock::new(LoadedDocument::blank()),
            links: Mutex::new(Vec::new()),
            content: Mutex::new(ContentSlot::default()),
            closed: AtomicBool::new(false),
            session: SessionStorage::new(),
            loader,
            downloads,
        })
    }

    #[cfg(test)]
    pub fn id(&self) -> TabId {
        self.id
    }

    pub fn location(&self) -> String {
        self.document
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .url
            .clone()
    }

    pub fn document_html(&self) -> String {
        self.document
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .html
            .clone()
    }

    pub fn session(&self) -> &SessionStorage {
        &self.session
    }

    pub fn scraper_config(&self) -> &ScraperConfig {
        &self.settings.scraper
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Relaxed)
    }

    fn ensure_open(&self) -> Result<(), PageError> {
        if self.is_closed() {
            return Err(PageError::Closed);
        }
        Ok(())
    }

    fn matches(&self, url: &str) -> bool {
        self.settings.matches.iter().any(|host| url.contains(host.as_str()))
    }

    /// Loads `url` into a fresh window. The previous window's content script
    /// and hidden links go away with it.
    pub async fn navigate(&self, url: &str) -> Result<(), PageError> {
        self.ensure_open()?;
        let loaded = self.loader.load(url).await?;
        self.ensure_open()?;

        log::debug!("tab {} navigated to {}", self.id, loaded.url);
        let auto_inject = self.settings.auto_inject && self.matches(&loaded.url);

        *self.document.write().unwrap_or_else(PoisonError::into_inner) = loaded;
        lock(&self.links).clear();
        *lock(&self.content) = ContentSlot::default();

        if auto_inject {
            self.inject_content_script()?;
        }
        Ok(())
    }

    /// Registers the content script unless this window already has one.
    /// Returns whether a new listener was registered.
    pub fn inject_content_script(&self) -> Result<bool, PageError> {
        self.ensure_open()?;
        let tab = self.me.upgrade().ok_or(PageError::Closed)?;

        let mut slot = lock(&self.content);
        if slot.initialized {
            log::debug!("tab {}: content script already initialized, skipping", self.id);
            return Ok(false);
        }
        slot.initialized = true;

        let (port, listener) = channel();
        slot.port = Some(port);
        drop(slot);

        ContentScript::spawn(tab, listener);
        Ok(true)
    }

    #[cfg(test)]
    pub async fn send<T: serde::de::DeserializeOwned>(&self, request: &Request) -> Result<T, AppError> {
        let port = self.content_port()?;
        port.send(request).await
    }

    fn content_port(&self) -> Result<MessagePort, AppError> {
        lock(&self.content)
            .port
            .clone()
            .ok_or_else(|| AppError::MessagingFailure(NO_RECEIVER.to_string()))
    }

    pub fn append_link(&self, link: HiddenLink) -> Result<(), PageError> {
        self.ensure_open()?;
        lock(&self.links).push(link);
        Ok(())
    }

    pub fn remove_link(&self, id: &str) {
        lock(&self.links).retain(|link| link.id != id);
    }

    pub fn remove_link_later(&self, id: &str, delay: Duration) {
        let tab = self.me.clone();
        let id = id.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(tab) = tab.upgrade() {
                tab.remove_link(&id);
            }
        });
    }

    #[cfg(test)]
    pub fn hidden_links(&self) -> Vec<HiddenLink> {
        lock(&self.links).clone()
    }

    /// Activates a hidden link. A download link hands its target to the
    /// download facility with the page as referer; any other link navigates.
    pub fn click_link(&self, id: &str) -> Result<(), PageError> {
        self.ensure_open()?;
        let link = lock(&self.links)
            .iter()
            .find(|link| link.id == id)
            .cloned()
            .ok_or_else(|| PageError::NoSuchElement(id.to_string()))?;

        match link.download {
            Some(filename) => {
                let options = DownloadOptions::new(link.href, filename)
                    .with_referer(Some(self.location()))
                    .with_save_as(self.settings.save_as);
                let downloads = self.downloads.clone();
                let tab_id = self.id;
                tokio::spawn(async move {
                    match downloads.download(options).await {
                        Ok(download_id) => log::info!("tab {}: download {} started", tab_id, download_id),
                        Err(err) => log::error!("tab {}: download failed: {}", tab_id, err),
                    }
                });
            }
            None => {
                let tab = self.me.upgrade().ok_or(PageError::Closed)?;
                tokio::spawn(async move {
                    if let Err(err) = tab.navigate(&link.href).await {
                        log::error!("tab {}: navigation failed: {}", tab.id, err);
                    }
                });
            }
        }
        Ok(())
    }

    #[cfg(test)]
    pub fn close(&self) {
        self.closed.store(true, Ordering::Relaxed);
        *lock(&self.content) = ContentSlot::default();
        lock(&self.links).clear();
    }

    /// Replaces the document in place, as scripts on the page would.
    #[cfg(test)]
    pub fn set_document_html(&self, html: &str) {
        self.document
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .html = html.to_string();
    }
}

#[async_trait]
impl TabSession for Tab {
    fn url(&self) -> String {
        self.location()
    }

    async fn send_message(&self, request: &Request) -> Result<Value, AppError> {
        let payload = serde_json::to_value(request)
            .map_err(|e| AppError::InvalidResponse(e.to_string()))?;
        self.content_port()?.send_raw(payload).await
    }

    async fn execute_content_script(&self) -> Result<(), AppError> {
        self.inject_content_script()
            .map(|_| ())
            .map_err(|e| AppError::MessagingFailure(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::VideoInfoResponse;
    use crate::host::testing::{settings, RecordingDownloadHost, StaticPageLoader};

    const PAGE: &str = "https://www.tokyomotion.net/video/42";

    fn tab(loader: StaticPageLoader) -> (Arc<Tab>, Arc<RecordingDownloadHost>) {
        let downloads = Arc::new(RecordingDownloadHost::new());
        let tab = Tab::new(1, settings(), Arc::new(loader), downloads.clone());
        (tab, downloads)
    }

    #[tokio::test]
    async fn test_blank_tab_has_no_receiver() {
        let (tab, _) = tab(StaticPageLoader::new());
        assert_eq!(tab.location(), "about:blank");

        let err = tab.send_message(&Request::GetVideoInfo).await.unwrap_err();
        assert_eq!(err, AppError::MessagingFailure(NO_RECEIVER.to_string()));
    }

    #[tokio::test]
    async fn test_injection_is_guarded_per_window() {
        let loader = StaticPageLoader::new().page(PAGE, "<video src=\"/a.mp4\"></video>");
        let (tab, _) = tab(loader);

        tab.navigate(PAGE).await.unwrap();
        // Auto-injected on load, so the explicit injection is a no-op.
        assert!(!tab.inject_content_script().unwrap());

        tab.navigate(PAGE).await.unwrap();
        assert!(!tab.inject_content_script().unwrap());

        let response: VideoInfoResponse = tab.send(&Request::GetVideoInfo).await.unwrap();
        assert!(response.success);
    }

    #[tokio::test]
    async fn test_unmatched_page_needs_explicit_injection() {
        let other = "https://example.com/video/1";
        let loader = StaticPageLoader::new().page(other, "<video src=\"/a.mp4\"></video>");
        let (tab, _) = tab(loader);

        tab.navigate(other).await.unwrap();
        assert!(tab.send_message(&Request::GetVideoInfo).await.is_err());

        tab.execute_content_script().await.unwrap();
        assert!(tab.send_message(&Request::GetVideoInfo).await.is_ok());
    }

    #[tokio::test]
    async fn test_navigation_link_replaces_document() {
        let target = "https://www47.tokyomotion.net/hd/42.mp4";
        let loader = StaticPageLoader::new()
            .page(PAGE, "<h1>Clip</h1>")
            .media(target);
        let (tab, _) = tab(loader);
        tab.navigate(PAGE).await.unwrap();

        tab.append_link(HiddenLink::navigation("go", target)).unwrap();
        tab.click_link("go").unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(tab.location(), target);
        assert!(tab.hidden_links().is_empty());
    }

    #[tokio::test]
    async fn test_download_link_uses_page_referer() {
        let loader = StaticPageLoader::new().page(PAGE, "<h1>Clip</h1>");
        let (tab, downloads) = tab(loader);
        tab.navigate(PAGE).await.unwrap();

        tab.append_link(HiddenLink::download("dl", "https://www47.tokyomotion.net/hd/42.mp4", "clip.mp4"))
            .unwrap();
        tab.click_link("dl").unwrap();
        tab.remove_link_later("dl", Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(50)).await;

        let calls = downloads.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].filename, "clip.mp4");
        assert_eq!(calls[0].referer.as_deref(), Some(PAGE));
        assert!(tab.hidden_links().is_empty());
    }

    #[tokio::test]
    async fn test_download_link_asks_where_to_save() {
        let downloads = Arc::new(RecordingDownloadHost::new());
        let loader = StaticPageLoader::new().page(PAGE, "<h1>Clip</h1>");
        let tab = Tab::new(
            1,
            TabSettings {
                save_as: true,
                ..settings()
            },
            Arc::new(loader),
            downloads.clone(),
        );
        tab.navigate(PAGE).await.unwrap();

        tab.append_link(HiddenLink::download("dl", "https://www47.tokyomotion.net/hd/42.mp4", "clip.mp4"))
            .unwrap();
        tab.click_link("dl").unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let calls = downloads.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].save_as);
    }

    #[tokio::test]
    async fn test_closed_tab_rejects_links() {
        let (tab, _) = tab(StaticPageLoader::new());
        tab.close();
        assert_eq!(
            tab.append_link(HiddenLink::navigation("x", "https://example.com")),
            Err(PageError::Closed)
        );
        assert_eq!(tab.click_link("x"), Err(PageError::Closed));
    }
}
