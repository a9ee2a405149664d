use bytes::Bytes;
use futures::Stream;
use futures::TryStreamExt;
use reqwest::header::{CONTENT_TYPE, REFERER};
use reqwest::{Client, Response};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("HTTP error! status: {0}")]
    HttpStatus(u16),

    #[error("File read error: {0}")]
    BodyRead(String),
}

pub type Result<T> = std::result::Result<T, ClientError>;

/// A navigated page. `body` is only read for non-media responses.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub final_url: String,
    pub content_type: Option<String>,
    pub body: Option<String>,
}

#[derive(Debug, Clone)]
pub struct FetchedBinary {
    pub bytes: Bytes,
    pub content_type: Option<String>,
}

/// `video/*` and `audio/*` responses are rendered as a media document rather than parsed.
pub fn is_media_type(content_type: &str) -> bool {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or(content_type)
        .trim()
        .to_ascii_lowercase();
    essence.starts_with("video/") || essence.starts_with("audio/")
}

/// HTTP side of the host: page loads, explicit binary fetches and streamed downloads.
#[derive(Clone)]
pub struct MediaClient {
    client: Client,
}

impl MediaClient {
    pub fn new(user_agent: &str) -> Result<Self> {
        let client = Client::builder().user_agent(user_agent).build()?;
        Ok(Self { client })
    }

    /// GET `url`, following redirects the way a tab navigation does.
    pub async fn fetch_page(&self, url: &str) -> Result<FetchedPage> {
        let response = check_status(self.client.get(url).send().await?)?;

        let final_url = response.url().to_string();
        let content_type = content_type(&response);

        if content_type.as_deref().is_some_and(is_media_type) {
            // The media itself is not needed to render the page.
            return Ok(FetchedPage {
                final_url,
                content_type,
                body: None,
            });
        }

        let body = response.text().await?;
        Ok(FetchedPage {
            final_url,
            content_type,
            body: Some(body),
        })
    }

    pub async fn fetch_binary(&self, url: &str) -> Result<FetchedBinary> {
        let response = check_status(self.client.get(url).send().await?)?;
        let content_type = content_type(&response);
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ClientError::BodyRead(e.to_string()))?;

        Ok(FetchedBinary {
            bytes,
            content_type,
        })
    }

    /// Download with progress stream
    /// Returns (total_size, stream)
    pub async fn download_file_stream(
        &self,
        download_url: &str,
        referer: Option<&str>,
    ) -> Result<(Option<u64>, impl Stream<Item = Result<Bytes>>)> {
        let mut request = self.client.get(download_url);
        if let Some(referer) = referer {
            request = request.header(REFERER, referer);
        }

        let response = check_status(request.send().await?)?;

        let total_size = response.content_length();
        let stream = response.bytes_stream().map_err(ClientError::RequestError);

        Ok((total_size, stream))
    }
}

fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if !status.is_success() {
        return Err(ClientError::HttpStatus(status.as_u16()));
    }
    Ok(response)
}

fn content_type(response: &Response) -> Option<String> {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    fn client() -> MediaClient {
        MediaClient::new("motion-downloader-test").unwrap()
    }

    #[test]
    fn test_is_media_type() {
        assert!(is_media_type("video/mp4"));
        assert!(is_media_type("Video/MP4; charset=binary"));
        assert!(is_media_type("audio/mpeg"));
        assert!(!is_media_type("text/html; charset=utf-8"));
    }

    #[tokio::test]
    async fn test_fetch_page_follows_redirect_to_media() {
        let mut server = mockito::Server::new_async().await;
        let final_path = "/hd/42.mp4";
        let location = format!("{}{}", server.url(), final_path);
        let _redirect = server
            .mock("GET", "/vsrc/hd/42")
            .with_status(302)
            .with_header("location", location.as_str())
            .create_async()
            .await;
        let _media = server
            .mock("GET", final_path)
            .with_status(200)
            .with_header("content-type", "video/mp4")
            .with_body("not really a video")
            .create_async()
            .await;

        let page = client()
            .fetch_page(&format!("{}/vsrc/hd/42", server.url()))
            .await
            .unwrap();
        assert_eq!(page.final_url, format!("{}{}", server.url(), final_path));
        assert_eq!(page.content_type.as_deref(), Some("video/mp4"));
        assert!(page.body.is_none());
    }

    #[tokio::test]
    async fn test_fetch_page_reads_html() {
        let mut server = mockito::Server::new_async().await;
        let _page = server
            .mock("GET", "/video/42")
            .with_status(200)
            .with_header("content-type", "text/html")
            .with_body("<html><body><h1>Clip</h1></body></html>")
            .create_async()
            .await;

        let page = client()
            .fetch_page(&format!("{}/video/42", server.url()))
            .await
            .unwrap();
        assert!(page.body.unwrap().contains("<h1>Clip</h1>"));
    }

    #[tokio::test]
    async fn test_fetch_binary_status_error() {
        let mut server = mockito::Server::new_async().await;
        let _missing = server
            .mock("GET", "/gone.mp4")
            .with_status(404)
            .create_async()
            .await;

        let err = client()
            .fetch_binary(&format!("{}/gone.mp4", server.url()))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::HttpStatus(404)));
        assert_eq!(err.to_string(), "HTTP error! status: 404");
    }

    #[tokio::test]
    async fn test_download_stream_sends_referer() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/hd/42.mp4")
            .match_header("referer", "https://www.tokyomotion.net/video/42")
            .with_status(200)
            .with_body("0123456789")
            .create_async()
            .await;

        let (total, stream) = client()
            .download_file_stream(
                &format!("{}/hd/42.mp4", server.url()),
                Some("https://www.tokyomotion.net/video/42"),
            )
            .await
            .unwrap();
        assert_eq!(total, Some(10));

        let chunks: Vec<_> = stream.collect().await;
        let body: Vec<u8> = chunks
            .into_iter()
            .flat_map(|chunk| chunk.unwrap().to_vec())
            .collect();
        assert_eq!(body, b"0123456789");
        mock.assert_async().await;
    }
}
