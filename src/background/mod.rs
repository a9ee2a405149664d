pub mod dispatcher;

pub use dispatcher::{watch_downloads, DownloadDispatcher};
