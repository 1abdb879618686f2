use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::header::USER_AGENT;
use tracing::debug;
use url::Url;

use crate::{config::ProviderConfig, error::PlayError};

static VIDEO_ID_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"youtube\.com/watch\?v=([a-zA-Z0-9_-]{11})",
        r"youtu\.be/([a-zA-Z0-9_-]{11})",
        r"youtube\.com/v/([a-zA-Z0-9_-]{11})",
        r"youtube\.com/shorts/([a-zA-Z0-9_-]{11})",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).unwrap())
    .collect()
});

static SEARCH_RESULT_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""videoId":"([a-zA-Z0-9_-]{11})""#).unwrap());

const YOUTUBE_MARKER: &str = "youtu";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoRef {
    pub id: String,
    pub url: String,
}

impl VideoRef {
    pub fn watch_url(&self) -> String {
        watch_url(&self.id)
    }
}

pub fn watch_url(id: &str) -> String {
    format!("https://www.youtube.com/watch?v={id}")
}

pub fn extract_video_id(link: &str) -> Option<String> {
    VIDEO_ID_PATTERNS.iter().find_map(|pattern| {
        pattern
            .captures(link)
            .and_then(|captures| captures.get(1))
            .map(|id| id.as_str().to_string())
    })
}

/// Returns the query untouched when it already is a YouTube URL.
pub fn direct_reference(query: &str) -> Option<&str> {
    let parsed = Url::parse(query).ok()?;
    if parsed.cannot_be_a_base() || !query.contains(YOUTUBE_MARKER) {
        return None;
    }
    Some(query)
}

pub async fn resolve_video(
    client: &reqwest::Client,
    config: &ProviderConfig,
    query: &str,
) -> Result<VideoRef, PlayError> {
    if let Some(url) = direct_reference(query) {
        let id = extract_video_id(url)
            .ok_or_else(|| PlayError::NotFound(format!("no video id in {url}")))?;
        return Ok(VideoRef {
            id,
            url: url.to_string(),
        });
    }

    let search_url = format!(
        "{}?search_query={}",
        config.search_url,
        urlencoding::encode(query)
    );
    debug!("Searching YouTube for {:?}", query);

    let body = client
        .get(&search_url)
        .header(USER_AGENT, &config.search_user_agent)
        .send()
        .await
        .map_err(PlayError::transport("search"))?
        .text()
        .await
        .map_err(PlayError::transport("search"))?;

    let id = first_search_result(&body)
        .ok_or_else(|| PlayError::NotFound(format!("no video found for {query:?}")))?;

    Ok(VideoRef {
        url: watch_url(&id),
        id,
    })
}

fn first_search_result(body: &str) -> Option<String> {
    SEARCH_RESULT_ID
        .captures(body)
        .and_then(|captures| captures.get(1))
        .map(|id| id.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{Hits, provider_config, spawn_upstream};
    use axum::{Router, extract::Query, routing::get};
    use std::collections::HashMap;

    #[test]
    fn extracts_all_supported_url_shapes() {
        let cases = [
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ&t=42",
            "https://youtu.be/dQw4w9WgXcQ?si=abc",
            "https://www.youtube.com/v/dQw4w9WgXcQ",
            "https://youtube.com/shorts/dQw4w9WgXcQ",
        ];
        for case in cases {
            assert_eq!(extract_video_id(case).as_deref(), Some("dQw4w9WgXcQ"), "{case}");
        }
    }

    #[test]
    fn keeps_hyphen_and_underscore_ids() {
        assert_eq!(
            extract_video_id("https://youtu.be/a-b_c-d_e-f").as_deref(),
            Some("a-b_c-d_e-f")
        );
    }

    #[test]
    fn rejects_links_without_eleven_char_id() {
        assert_eq!(extract_video_id("https://www.youtube.com/watch?v=short"), None);
        assert_eq!(extract_video_id("https://vimeo.com/123456789012"), None);
        assert_eq!(extract_video_id("never gonna give you up"), None);
    }

    #[test]
    fn direct_reference_requires_url_and_marker() {
        let link = "https://youtu.be/dQw4w9WgXcQ";
        assert_eq!(direct_reference(link), Some(link));
        assert_eq!(direct_reference("https://vimeo.com/1"), None);
        assert_eq!(direct_reference("youtube never gonna"), None);
    }

    #[test]
    fn search_body_yields_first_id() {
        let body = r#"<script>var x = {"videoId":"dQw4w9WgXcQ","other":{"videoId":"yPYZpwSpKmA"}}</script>"#;
        assert_eq!(first_search_result(body).as_deref(), Some("dQw4w9WgXcQ"));
        assert_eq!(first_search_result("<html></html>"), None);
    }

    #[tokio::test]
    async fn direct_url_skips_search() {
        let hits = Hits::default();
        let router = Router::new().route("/results", get({
            let hits = hits.clone();
            move || {
                hits.bump();
                async { "\"videoId\":\"yPYZpwSpKmA\"" }
            }
        }));
        let addr = spawn_upstream(router).await;
        let config = provider_config(addr);

        let link = "https://www.youtube.com/watch?v=dQw4w9WgXcQ";
        let video = resolve_video(&reqwest::Client::new(), &config, link).await.unwrap();
        assert_eq!(video.url, link);
        assert_eq!(video.id, "dQw4w9WgXcQ");
        assert_eq!(hits.count(), 0);
    }

    #[tokio::test]
    async fn free_text_is_searched() {
        let router = Router::new().route(
            "/results",
            get(|Query(params): Query<HashMap<String, String>>| async move {
                assert_eq!(params.get("search_query").map(String::as_str), Some("never gonna give you up"));
                r#"{"contents":[{"videoRenderer":{"videoId":"dQw4w9WgXcQ"}}]}"#
            }),
        );
        let addr = spawn_upstream(router).await;
        let config = provider_config(addr);

        let video = resolve_video(&reqwest::Client::new(), &config, "never gonna give you up")
            .await
            .unwrap();
        assert_eq!(video.id, "dQw4w9WgXcQ");
        assert_eq!(video.url, "https://www.youtube.com/watch?v=dQw4w9WgXcQ");
    }

    #[tokio::test]
    async fn search_without_match_is_not_found() {
        let router = Router::new().route("/results", get(|| async { "<html>nothing</html>" }));
        let addr = spawn_upstream(router).await;
        let config = provider_config(addr);

        let result = resolve_video(&reqwest::Client::new(), &config, "zzzz").await;
        assert!(matches!(result, Err(PlayError::NotFound(_))));
    }
}
