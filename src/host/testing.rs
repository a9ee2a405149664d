//! Fakes for the host collaborators, shared by the unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use super::downloads::{DownloadHost, DownloadOptions, HostError};
use super::loader::{LoadedDocument, PageError, PageLoader};
use super::tab::TabSettings;
use crate::config::ScraperConfig;
use crate::domain::DownloadId;

pub fn fast_scraper() -> ScraperConfig {
    ScraperConfig {
        max_retries: 6,
        retry_delay_ms: 5,
        link_removal_delay_ms: 10,
    }
}

pub fn settings() -> TabSettings {
    TabSettings {
        scraper: fast_scraper(),
        auto_inject: true,
        matches: vec!["tokyomotion.net".to_string(), "osakamotion.net".to_string()],
        save_as: false,
    }
}

/// Serves fixed documents by URL; anything else fails to load.
#[derive(Default)]
pub struct StaticPageLoader {
    pages: HashMap<String, LoadedDocument>,
}

impl StaticPageLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, url: &str, html: &str) -> Self {
        self.pages.insert(url.to_string(), LoadedDocument::new(url, html));
        self
    }

    /// `from` redirects to `to`, which serves `html`.
    pub fn redirect(mut self, from: &str, to: &str, html: &str) -> Self {
        self.pages.insert(from.to_string(), LoadedDocument::new(to, html));
        self
    }

    pub fn media(mut self, url: &str) -> Self {
        self.pages.insert(url.to_string(), LoadedDocument::media(url, "video/mp4"));
        self
    }
}

#[async_trait]
impl PageLoader for StaticPageLoader {
    async fn load(&self, url: &str) -> Result<LoadedDocument, PageError> {
        self.pages.get(url).cloned().ok_or_else(|| PageError::Load {
            url: url.to_string(),
            reason: "HTTP error! status: 404".to_string(),
        })
    }
}

/// Records every request; fails the next calls with queued errors.
#[derive(Default)]
pub struct RecordingDownloadHost {
    calls: Mutex<Vec<DownloadOptions>>,
    failures: Mutex<VecDeque<HostError>>,
    next_id: AtomicU64,
}

impl RecordingDownloadHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_with(errors: Vec<HostError>) -> Self {
        Self {
            failures: Mutex::new(errors.into()),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<DownloadOptions> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl DownloadHost for RecordingDownloadHost {
    async fn download(&self, options: DownloadOptions) -> Result<DownloadId, HostError> {
        self.calls.lock().unwrap().push(options);
        if let Some(err) = self.failures.lock().unwrap().pop_front() {
            return Err(err);
        }
        Ok(DownloadId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1))
    }
}
