use std::fmt;

use serde::{Deserialize, Serialize};

/// A candidate media URL found on the page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    pub src: String,
    #[serde(rename = "type")]
    pub mime_type: String,
}

impl SourceDescriptor {
    pub fn mp4(src: impl Into<String>) -> Self {
        Self {
            src: src.into(),
            mime_type: "video/mp4".to_string(),
        }
    }
}

/// What the page scraper reports about the video on the current page.
///
/// `title` is the filename stem (no extension). `url` starts out as the first
/// discovered source and is rewritten once the popup has picked the best one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoInfo {
    pub url: String,
    pub title: String,
    pub referer: String,
    #[serde(default)]
    pub sources: Vec<SourceDescriptor>,
}

/// Opaque identifier handed out by the host download facility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DownloadId(pub u64);

impl fmt::Display for DownloadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// States the popup flow passes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadPhase {
    Idle,
    Discovering,
    Redirecting,
    WaitingForNavigation,
    Rediscovering,
    SourceSelected,
    Downloading,
    Done,
    Failed,
}

impl DownloadPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, DownloadPhase::Done | DownloadPhase::Failed)
    }

    /// Whether the flow may move from `self` to `next`.
    pub fn can_advance_to(self, next: DownloadPhase) -> bool {
        use DownloadPhase::*;

        if next == Failed {
            return !self.is_terminal();
        }

        matches!(
            (self, next),
            (Idle, Discovering)
                | (Discovering, Redirecting)
                | (Discovering, SourceSelected)
                | (Redirecting, WaitingForNavigation)
                | (WaitingForNavigation, Rediscovering)
                | (Rediscovering, SourceSelected)
                | (SourceSelected, Downloading)
                | (Downloading, Done)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusKind {
    Success,
    Warning,
    Error,
}

/// The single line shown to the operator when a flow ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLine {
    pub kind: StatusKind,
    pub message: String,
}

impl StatusLine {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            kind: StatusKind::Success,
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            kind: StatusKind::Warning,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: StatusKind::Error,
            message: message.into(),
        }
    }
}

impl fmt::Display for StatusLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let marker = match self.kind {
            StatusKind::Success => '✓',
            StatusKind::Warning => '⚠',
            StatusKind::Error => '✗',
        };
        write!(f, "{} {}", marker, self.message)
    }
}
