use async_trait::async_trait;
use thiserror::Error;

use crate::api::client::is_media_type;
use crate::api::MediaClient;

pub const BLANK_URL: &str = "about:blank";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PageError {
    #[error("Failed to load {url}: {reason}")]
    Load { url: String, reason: String },

    #[error("The tab was closed")]
    Closed,

    #[error("No element with id {0}")]
    NoSuchElement(String),
}

/// The document currently shown in a tab.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedDocument {
    pub url: String,
    pub html: String,
}

impl LoadedDocument {
    pub fn new(url: impl Into<String>, html: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            html: html.into(),
        }
    }

    pub fn blank() -> Self {
        Self::new(BLANK_URL, "<html><head></head><body></body></html>")
    }

    /// What a browser shows when a tab navigates straight to a media file.
    pub fn media(url: &str, mime_type: &str) -> Self {
        let html = format!(
            "<html><head></head><body><video controls autoplay name=\"media\"><source src=\"{}\" type=\"{}\"></video></body></html>",
            escape_attr(url),
            escape_attr(mime_type)
        );
        Self::new(url, html)
    }
}

#[async_trait]
pub trait PageLoader: Send + Sync {
    async fn load(&self, url: &str) -> Result<LoadedDocument, PageError>;
}

pub struct HttpPageLoader {
    client: MediaClient,
}

impl HttpPageLoader {
    pub fn new(client: MediaClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PageLoader for HttpPageLoader {
    async fn load(&self, url: &str) -> Result<LoadedDocument, PageError> {
        if url == BLANK_URL {
            return Ok(LoadedDocument::blank());
        }

        let page = self.client.fetch_page(url).await.map_err(|e| PageError::Load {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        match (page.body, page.content_type) {
            (Some(body), _) => Ok(LoadedDocument::new(page.final_url, body)),
            (None, content_type) => {
                let mime = content_type
                    .as_deref()
                    .and_then(|ct| ct.split(';').next())
                    .map(str::trim)
                    .filter(|ct| is_media_type(ct))
                    .unwrap_or("video/mp4");
                Ok(LoadedDocument::media(&page.final_url, mime))
            }
        }
    }
}

fn escape_attr(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_document() {
        let doc = LoadedDocument::media("https://www47.tokyomotion.net/hd/42.mp4?a=1&b=2", "video/mp4");
        assert!(doc
            .html
            .contains(r#"<source src="https://www47.tokyomotion.net/hd/42.mp4?a=1&amp;b=2" type="video/mp4">"#));
    }

    #[tokio::test]
    async fn test_http_loader_renders_media_navigation() {
        let mut server = mockito::Server::new_async().await;
        let location = format!("{}/sd/42.mp4", server.url());
        let _redirect = server
            .mock("GET", "/vsrc/sd/42")
            .with_status(302)
            .with_header("location", location.as_str())
            .create_async()
            .await;
        let _media = server
            .mock("GET", "/sd/42.mp4")
            .with_status(200)
            .with_header("content-type", "video/mp4")
            .with_body("bytes")
            .create_async()
            .await;

        let loader = HttpPageLoader::new(MediaClient::new("motion-downloader-test").unwrap());
        let doc = loader
            .load(&format!("{}/vsrc/sd/42", server.url()))
            .await
            .unwrap();
        assert_eq!(doc.url, location);
        assert!(doc.html.contains("<video"));
    }

    #[tokio::test]
    async fn test_http_loader_error() {
        let mut server = mockito::Server::new_async().await;
        let _missing = server.mock("GET", "/video/0").with_status(500).create_async().await;

        let loader = HttpPageLoader::new(MediaClient::new("motion-downloader-test").unwrap());
        let err = loader
            .load(&format!("{}/video/0", server.url()))
            .await
            .unwrap_err();
        assert!(matches!(err, PageError::Load { .. }));
    }
}
