use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use super::blob::BlobStore;
use super::downloads::{DownloadHost, FileDialogPrompt, FileDownloadHost};
use super::loader::{HttpPageLoader, PageError, PageLoader};
use super::tab::{Tab, TabSettings};
use crate::api::{channel, ClientError, MediaClient, MessagePort};
use crate::background::{watch_downloads, DownloadDispatcher};
use crate::config::AppConfig;

/// The host environment: tabs, the download facility and the service worker.
///
/// Must be created inside a tokio runtime; the service worker is spawned on it.
pub struct Browser {
    config: AppConfig,
    loader: Arc<dyn PageLoader>,
    downloads: Arc<dyn DownloadHost>,
    runtime: MessagePort,
    tabs: Mutex<Vec<Arc<Tab>>>,
    next_tab_id: AtomicU64,
}

impl Browser {
    pub fn launch(config: AppConfig) -> Result<Self, ClientError> {
        let client = MediaClient::new(&config.host.user_agent)?;
        let host = Arc::new(FileDownloadHost::new(
            client.clone(),
            BlobStore::new(),
            config.host.download_dir.clone(),
            Arc::new(FileDialogPrompt),
        ));
        tokio::spawn(watch_downloads(host.subscribe()));

        let loader = Arc::new(HttpPageLoader::new(client.clone()));
        Ok(Self::with_parts(config, loader, host, client))
    }

    pub fn with_parts(
        config: AppConfig,
        loader: Arc<dyn PageLoader>,
        downloads: Arc<dyn DownloadHost>,
        client: MediaClient,
    ) -> Self {
        let (runtime, listener) = channel();
        let dispatcher = DownloadDispatcher::new(downloads.clone(), client, config.dispatcher.clone())
            .with_save_as(config.host.save_as);
        tokio::spawn(dispatcher.run(listener));

        Self {
            config,
            loader,
            downloads,
            runtime,
            tabs: Mutex::new(Vec::new()),
            next_tab_id: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Port to the service worker.
    pub fn runtime(&self) -> &MessagePort {
        &self.runtime
    }

    fn tab_settings(&self) -> TabSettings {
        TabSettings {
            scraper: self.config.scraper.clone(),
            auto_inject: self.config.host.auto_inject,
            matches: self.config.popup.supported_hosts.clone(),
            save_as: self.config.host.save_as,
        }
    }

    /// Opens `url` in a new tab, which becomes the active one.
    pub async fn open_tab(&self, url: &str) -> Result<Arc<Tab>, PageError> {
        let id = self.next_tab_id.fetch_add(1, Ordering::Relaxed) + 1;
        let tab = Tab::new(id, self.tab_settings(), self.loader.clone(), self.downloads.clone());
        tab.navigate(url).await?;

        self.tabs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tab.clone());
        Ok(tab)
    }

    pub fn active_tab(&self) -> Option<Arc<Tab>> {
        self.tabs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .rev()
            .find(|tab| !tab.is_closed())
            .cloned()
    }

    /// Shows `url` in the active tab, keeping its session, or opens a tab for it.
    pub async fn show(&self, url: &str) -> Result<Arc<Tab>, PageError> {
        match self.active_tab() {
            Some(tab) if tab.location() == url => Ok(tab),
            Some(tab) => {
                tab.navigate(url).await?;
                Ok(tab)
            }
            None => self.open_tab(url).await,
        }
    }
}
