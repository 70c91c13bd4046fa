//! Wiki page and attachment passthrough for the roadmap dashboard

use std::sync::OnceLock;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use regex::Regex;
use serde::Serialize;
use serde_json::Value;

use crate::error::{AppError, Result};
use crate::services::tracker::TrackerClient;

fn wiki_path() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"/projects/([^/]+)/wiki/([^/?]+)").expect("valid wiki path regex"))
}

/// Project and page named by a wiki URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WikiRef {
    pub project: String,
    pub page: String,
}

impl WikiRef {
    pub fn parse(url: &str) -> Result<Self> {
        let caps = wiki_path()
            .captures(url)
            .ok_or_else(|| AppError::InvalidRequest(format!("not a wiki page URL: {}", url)))?;
        Ok(Self {
            project: caps[1].to_string(),
            page: caps[2].to_string(),
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct WikiAttachment {
    pub id: Option<i64>,
    pub filename: String,
    pub content_type: String,
    pub filesize: Option<i64>,
    pub download_url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct WikiContent {
    pub title: String,
    pub content: String,
    pub version: i64,
    pub attachments: Vec<WikiAttachment>,
}

pub async fn wiki_content(tracker: &TrackerClient, url: &str) -> Result<WikiContent> {
    let wiki = WikiRef::parse(url)?;
    let page = tracker.wiki_page(&wiki.project, &wiki.page).await?;

    let text = |key: &str| page.get(key).and_then(Value::as_str).unwrap_or_default().to_string();
    let attachments = page
        .get("attachments")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .map(|a| {
            let id = a.get("id").and_then(Value::as_i64);
            let filename = a.get("filename").and_then(Value::as_str).unwrap_or_default().to_string();
            WikiAttachment {
                download_url: id.map(|id| tracker.attachment_url(id, &filename)).unwrap_or_default(),
                id,
                content_type: a
                    .get("content_type")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                filesize: a.get("filesize").and_then(Value::as_i64),
                filename,
            }
        })
        .collect();

    Ok(WikiContent {
        title: text("title"),
        content: text("text"),
        version: page.get("version").and_then(Value::as_i64).unwrap_or(1),
        attachments,
    })
}

/// An attachment inlined for the browser
#[derive(Debug, Clone, Serialize)]
pub struct InlineImage {
    pub image_base64: String,
    pub content_type: String,
    pub data_url: String,
}

pub async fn attachment_image(tracker: &TrackerClient, attachment_id: i64) -> Result<InlineImage> {
    let attachment = tracker.attachment(attachment_id).await?;
    let image_base64 = BASE64.encode(&attachment.bytes);
    Ok(InlineImage {
        data_url: format!("data:{};base64,{}", attachment.content_type, image_base64),
        content_type: attachment.content_type,
        image_base64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::tracker::TrackerConfig;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn tracker(server: &MockServer) -> TrackerClient {
        TrackerClient::new(&TrackerConfig {
            base_url: server.uri(),
            api_key: "k".into(),
            timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    #[test]
    fn test_parse_wiki_url() {
        let wiki = WikiRef::parse("https://pms.example.com/projects/acme/wiki/Q1_Plan?version=2").unwrap();
        assert_eq!(wiki.project, "acme");
        assert_eq!(wiki.page, "Q1_Plan");
        assert!(WikiRef::parse("https://pms.example.com/issues/1").is_err());
    }

    #[tokio::test]
    async fn test_wiki_content_lists_attachments() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/projects/acme/wiki/Q1_Plan.json"))
            .and(query_param("include", "attachments"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "wiki_page": {
                    "title": "Q1_Plan",
                    "text": "h1. Plan",
                    "version": 4,
                    "attachments": [
                        {"id": 9, "filename": "chart.png", "content_type": "image/png", "filesize": 120}
                    ]
                }
            })))
            .mount(&server)
            .await;

        let url = format!("{}/projects/acme/wiki/Q1_Plan", server.uri());
        let content = wiki_content(&tracker(&server), &url).await.unwrap();
        assert_eq!(content.content, "h1. Plan");
        assert_eq!(content.version, 4);
        assert_eq!(
            content.attachments[0].download_url,
            format!("{}/attachments/download/9/chart.png", server.uri())
        );
    }

    #[tokio::test]
    async fn test_attachment_image_data_url() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/attachments/download/9"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "image/jpeg")
                    .set_body_bytes(vec![1u8, 2, 3]),
            )
            .mount(&server)
            .await;

        let image = attachment_image(&tracker(&server), 9).await.unwrap();
        assert_eq!(image.content_type, "image/jpeg");
        assert_eq!(image.data_url, "data:image/jpeg;base64,AQID");
    }
}
