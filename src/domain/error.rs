use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AppError {
    #[error("Please open a TokyoMotion or OsakaMotion page")]
    NotOnSupportedSite,

    #[error("{0}")]
    SourceNotFound(String),

    #[error("{0}")]
    MessagingFailure(String),

    #[error("{0}")]
    RedirectTimeout(String),

    #[error("{0}")]
    HostDownloadRejected(String),

    #[error("{0}")]
    FetchFailed(String),

    #[error("{0}")]
    InvalidResponse(String),
}
