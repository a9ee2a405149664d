use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// Environment variable naming an optional JSON config file.
pub const CONFIG_ENV: &str = "MOTION_DL_CONFIG";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub scraper: ScraperConfig,
    pub popup: PopupConfig,
    pub dispatcher: DispatcherConfig,
    pub host: HostConfig,
}

impl AppConfig {
    /// Reads the file named by `MOTION_DL_CONFIG`, or returns the defaults.
    pub fn load() -> Result<Self, ConfigError> {
        match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::from_file(Path::new(&path)),
            None => Ok(Self::default()),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(raw)?)
    }
}

/// Content script polling.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScraperConfig {
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub link_removal_delay_ms: u64,
}

impl ScraperConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn link_removal_delay(&self) -> Duration {
        Duration::from_millis(self.link_removal_delay_ms)
    }
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            max_retries: 6,
            retry_delay_ms: 700,
            link_removal_delay_ms: 100,
        }
    }
}

/// Popup flow timing. Larger than the scraper's because a full page load sits in between.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PopupConfig {
    pub redirect_wait_ms: u64,
    pub retry_delay_ms: u64,
    pub max_retries: u32,
    pub supported_hosts: Vec<String>,
    pub download_route: DownloadRoute,
}

/// Who performs the final download of a popup flow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadRoute {
    /// The content script clicks a download link in the page.
    #[default]
    Page,
    /// The service worker calls the host download facility (`downloadToFile`).
    ServiceWorker,
}

impl PopupConfig {
    pub fn redirect_wait(&self) -> Duration {
        Duration::from_millis(self.redirect_wait_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn is_supported_site(&self, url: &str) -> bool {
        self.supported_hosts.iter().any(|host| url.contains(host.as_str()))
    }
}

impl Default for PopupConfig {
    fn default() -> Self {
        Self {
            redirect_wait_ms: 3000,
            retry_delay_ms: 800,
            max_retries: 6,
            supported_hosts: vec!["tokyomotion.net".to_string(), "osakamotion.net".to_string()],
            download_route: DownloadRoute::Page,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    pub retry_filename_prefix: String,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            retry_filename_prefix: "video_".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    pub download_dir: PathBuf,
    pub user_agent: String,
    /// Inject the content script on every load of a supported page.
    pub auto_inject: bool,
    /// Ask where to save each download instead of using `download_dir`.
    pub save_as: bool,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            download_dir: PathBuf::from("downloads"),
            user_agent: format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
            auto_inject: true,
            save_as: false,
        }
    }
}
