pub mod blob;
pub mod browser;
pub mod downloads;
pub mod loader;
pub mod session;
pub mod tab;

#[cfg(test)]
pub mod testing;

pub use browser::Browser;
pub use downloads::{DownloadDelta, DownloadHost, DownloadOptions, DownloadState};
pub use tab::{HiddenLink, Tab, TabSession};
