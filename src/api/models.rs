use serde::{Deserialize, Serialize};

use crate::domain::{DownloadId, VideoInfo};

/// Every message exchanged between the popup, the content script and the
/// service worker. The tag travels as the `action` field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action")]
pub enum Request {
    #[serde(rename = "getVideoInfo")]
    GetVideoInfo,

    #[serde(rename = "triggerRedirect")]
    TriggerRedirect {
        #[serde(rename = "videoInfo")]
        video_info: VideoInfo,
    },

    #[serde(rename = "downloadVideo")]
    DownloadVideo {
        #[serde(rename = "videoInfo")]
        video_info: VideoInfo,
    },

    #[serde(rename = "downloadToFile")]
    DownloadToFile {
        #[serde(rename = "videoInfo")]
        video_info: VideoInfo,
    },

    #[serde(rename = "directDownload", alias = "downloadDirectURL")]
    DirectDownload {
        url: String,
        filename: String,
        #[serde(default)]
        referer: Option<String>,
    },

    #[serde(rename = "directDownloadMP4")]
    DirectDownloadMp4 { url: String, filename: String },

    #[serde(rename = "downloadBlob")]
    DownloadBlob {
        #[serde(rename = "blobUrl")]
        blob_url: String,
        filename: String,
    },
}

impl Request {
    pub fn action(&self) -> &'static str {
        match self {
            Request::GetVideoInfo => "getVideoInfo",
            Request::TriggerRedirect { .. } => "triggerRedirect",
            Request::DownloadVideo { .. } => "downloadVideo",
            Request::DownloadToFile { .. } => "downloadToFile",
            Request::DirectDownload { .. } => "directDownload",
            Request::DirectDownloadMp4 { .. } => "directDownloadMP4",
            Request::DownloadBlob { .. } => "downloadBlob",
        }
    }
}

/// Answer to `getVideoInfo`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoInfoResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_info: Option<VideoInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl VideoInfoResponse {
    pub fn found(video_info: VideoInfo) -> Self {
        Self {
            success: true,
            video_info: Some(video_info),
            message: None,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            success: false,
            video_info: None,
            message: Some(message.into()),
        }
    }
}

/// Answer to every other action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub warning: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_id: Option<DownloadId>,
}

impl ActionResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            warning: false,
            message: message.into(),
            download_id: None,
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            warning: true,
            ..Self::ok(message)
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            warning: false,
            message: message.into(),
            download_id: None,
        }
    }

    pub fn started(filename: &str, download_id: DownloadId) -> Self {
        Self {
            download_id: Some(download_id),
            ..Self::ok(format!("Download started: {}", filename))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_info() -> VideoInfo {
        VideoInfo {
            url: "https://www.tokyomotion.net/vsrc/hd/42".to_string(),
            title: "tokyomotion_42".to_string(),
            referer: "https://www.tokyomotion.net/video/42".to_string(),
            sources: vec![],
        }
    }

    #[test]
    fn test_request_wire_format() {
        let value = serde_json::to_value(Request::TriggerRedirect {
            video_info: sample_info(),
        })
        .unwrap();
        assert_eq!(value["action"], "triggerRedirect");
        assert_eq!(value["videoInfo"]["title"], "tokyomotion_42");

        let value = serde_json::to_value(Request::GetVideoInfo).unwrap();
        assert_eq!(value, json!({"action": "getVideoInfo"}));
    }

    #[test]
    fn test_direct_download_alias() {
        let request: Request = serde_json::from_value(json!({
            "action": "downloadDirectURL",
            "url": "https://cdn.example/a.mp4",
            "filename": "a.mp4",
            "referer": "https://www.tokyomotion.net/"
        }))
        .unwrap();
        assert!(matches!(request, Request::DirectDownload { .. }));
        assert_eq!(request.action(), "directDownload");
    }

    #[test]
    fn test_blob_request() {
        let request: Request = serde_json::from_value(json!({
            "action": "downloadBlob",
            "blobUrl": "blob:https://www.tokyomotion.net/1",
            "filename": "a.mp4"
        }))
        .unwrap();
        assert_eq!(
            request,
            Request::DownloadBlob {
                blob_url: "blob:https://www.tokyomotion.net/1".to_string(),
                filename: "a.mp4".to_string(),
            }
        );
    }

    #[test]
    fn test_action_response_omits_empty_fields() {
        let value = serde_json::to_value(ActionResponse::ok("Redirect triggered")).unwrap();
        assert_eq!(value, json!({"success": true, "message": "Redirect triggered"}));

        let value = serde_json::to_value(ActionResponse::started("a.mp4", DownloadId(7))).unwrap();
        assert_eq!(value["downloadId"], 7);
        assert_eq!(value["message"], "Download started: a.mp4");
    }

    #[test]
    fn test_video_info_response_round() {
        let response: VideoInfoResponse =
            serde_json::from_value(json!({"success": false, "message": "Video source not found"}))
                .unwrap();
        assert_eq!(response, VideoInfoResponse::not_found("Video source not found"));
    }
}
