use std::sync::Arc;

use axum::{
    Json,
    extract::{RawQuery, State},
};
use serde::Serialize;
use serde_json::Value;
use tracing::{Instrument, Span, info, info_span, warn};
use url::form_urlencoded;
use uuid::Uuid;

use crate::{
    AppState,
    config::ProviderConfig,
    error::{ApiError, PlayError},
    savetube::{self, DecryptedMetadata},
    video::{self, VideoRef},
    ytmp3,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaFormat {
    Audio,
    Video,
}

impl MediaFormat {
    pub fn label(self) -> &'static str {
        match self {
            Self::Audio => "mp3",
            Self::Video => "mp4",
        }
    }

    /// Both formats read metadata from the media CDN; only the link step differs.
    pub async fn resolve(
        self,
        client: &reqwest::Client,
        config: &ProviderConfig,
        video: &VideoRef,
    ) -> Result<DownloadResult, PlayError> {
        let cdn = savetube::select_cdn(client, config).await?;
        let metadata = savetube::fetch_info(client, config, &cdn, video).await?;

        let url = match self {
            Self::Audio => savetube::audio_link(client, config, &cdn, video, &metadata).await?,
            Self::Video => ytmp3::convert_video(client, config, &video.id).await?,
        };

        Ok(DownloadResult {
            format: self,
            url,
            video_id: video.id.clone(),
            metadata,
        })
    }
}

#[derive(Debug, Clone)]
pub struct DownloadResult {
    pub format: MediaFormat,
    pub url: String,
    pub video_id: String,
    pub metadata: DecryptedMetadata,
}

#[derive(Debug, Serialize)]
pub struct PlayResponse {
    success: bool,
    creator: String,
    data: PlayData,
}

#[derive(Debug, Serialize)]
pub struct PlayData {
    pub dl_mp3: Option<String>,
    pub dl_mp4: Option<String>,
    pub metadata: PlayMetadata,
}

#[derive(Debug, Serialize)]
pub struct PlayMetadata {
    pub title: Option<Value>,
    pub thumbnail: Option<Value>,
    pub duration: Option<Value>,
    pub id: String,
}

/// Decoded value of the first `query` parameter; later repeats are ignored.
fn query_param(raw: Option<&str>) -> Option<String> {
    form_urlencoded::parse(raw?.as_bytes())
        .find(|(name, _)| name == "query")
        .map(|(_, value)| value.into_owned())
}

pub async fn play(
    State(state): State<AppState>,
    RawQuery(raw): RawQuery,
) -> Result<Json<PlayResponse>, ApiError> {
    let query = query_param(raw.as_deref())
        .filter(|query| !query.is_empty())
        .ok_or_else(ApiError::query_required)?;

    let span = info_span!("play", request_id = %Uuid::new_v4());
    async move {
        let video = video::resolve_video(&state.http_client, &state.providers, &query)
            .await
            .map_err(|error| {
                warn!("Could not resolve {:?}: {error}", query);
                ApiError::video_not_found()
            })?;
        info!("Resolved {:?} to {}", query, video.url);

        let (audio, video_result) =
            resolve_formats(state.http_client.clone(), Arc::clone(&state.providers), video).await;
        let data = merge_results(audio, video_result)?;

        Ok(Json(PlayResponse {
            success: true,
            creator: state.creator.clone(),
            data,
        }))
    }
    .instrument(span)
    .await
}

/// Runs both formats as independent tasks and waits for both, whatever their outcome.
pub async fn resolve_formats(
    client: reqwest::Client,
    config: Arc<ProviderConfig>,
    video: VideoRef,
) -> (
    Result<DownloadResult, PlayError>,
    Result<DownloadResult, PlayError>,
) {
    let spawn_format = |format: MediaFormat| {
        let client = client.clone();
        let config = Arc::clone(&config);
        let video = video.clone();
        tokio::spawn(
            async move { format.resolve(&client, &config, &video).await }
                .instrument(Span::current()),
        )
    };

    let audio = spawn_format(MediaFormat::Audio);
    let video_task = spawn_format(MediaFormat::Video);
    let (audio, video_task) = tokio::join!(audio, video_task);

    (
        audio.unwrap_or_else(|error| Err(PlayError::from(error))),
        video_task.unwrap_or_else(|error| Err(PlayError::from(error))),
    )
}

pub fn merge_results(
    audio: Result<DownloadResult, PlayError>,
    video: Result<DownloadResult, PlayError>,
) -> Result<PlayData, ApiError> {
    let mut reasons = Vec::new();
    let mut keep = |format: MediaFormat, outcome: Result<DownloadResult, PlayError>| match outcome
    {
        Ok(result) => {
            info!("{} link resolved", result.format.label());
            Some(result)
        }
        Err(error) => {
            warn!("{} resolution failed: {error}", format.label());
            reasons.push(format!("{}: {error}", format.label()));
            None
        }
    };

    let audio = keep(MediaFormat::Audio, audio);
    let video = keep(MediaFormat::Video, video);

    let source = match video.as_ref().or(audio.as_ref()) {
        Some(result) => result,
        None => return Err(ApiError::resolution_failed(&reasons)),
    };

    let metadata = PlayMetadata {
        title: source.metadata.title.clone(),
        thumbnail: source.metadata.thumbnail.clone(),
        duration: source.metadata.duration.clone(),
        id: source.video_id.clone(),
    };

    Ok(PlayData {
        dl_mp3: audio.map(|result| result.url),
        dl_mp4: video.map(|result| result.url),
        metadata,
    })
}
