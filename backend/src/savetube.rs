//! Media CDN provider: edge selection, encrypted info and the mp3 link.

use reqwest::{
    RequestBuilder,
    header::{ACCEPT, CONTENT_TYPE, ORIGIN, REFERER, USER_AGENT},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::{
    cipher::{self, CipherError},
    config::{ProviderConfig, non_empty},
    error::PlayError,
    upstream::fetch_json,
    video::VideoRef,
};

const SERVICE: &str = "savetube";
const CDN_PATH: &str = "/random-cdn";
const INFO_PATH: &str = "/v2/info";
const DOWNLOAD_PATH: &str = "/download";

/// Fields are kept as raw JSON; the provider does not keep their types stable.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct DecryptedMetadata {
    pub title: Option<Value>,
    pub thumbnail: Option<Value>,
    pub duration: Option<Value>,
    pub key: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct CdnResponse {
    status: Option<bool>,
    data: Option<CdnData>,
}

#[derive(Debug, Deserialize)]
struct CdnData {
    cdn: Option<String>,
}

#[derive(Debug, Deserialize)]
struct InfoResponse {
    data: Option<InfoData>,
}

#[derive(Debug, Deserialize)]
struct InfoData {
    data: Option<String>,
}

#[derive(Debug, Serialize)]
struct InfoRequest<'a> {
    url: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DownloadRequest<'a> {
    id: &'a str,
    download_type: &'static str,
    quality: &'a str,
    key: &'a str,
}

#[derive(Debug, Deserialize)]
struct DownloadResponse {
    data: Option<DownloadOuter>,
}

#[derive(Debug, Deserialize)]
struct DownloadOuter {
    data: Option<DownloadInner>,
}

#[derive(Debug, Deserialize)]
struct DownloadInner {
    #[serde(rename = "downloadUrl")]
    download_url: Option<String>,
}

fn with_headers(request: RequestBuilder, config: &ProviderConfig) -> RequestBuilder {
    request
        .header(ACCEPT, "*/*")
        .header(CONTENT_TYPE, "application/json")
        .header(ORIGIN, &config.savetube_origin)
        .header(REFERER, &config.savetube_referer)
        .header(USER_AGENT, &config.savetube_user_agent)
}

fn cdn_endpoint(config: &ProviderConfig, cdn: &str, path: &str) -> String {
    format!("{}://{cdn}{path}", config.cdn_scheme)
}

pub async fn select_cdn(
    client: &reqwest::Client,
    config: &ProviderConfig,
) -> Result<String, PlayError> {
    let url = format!("{}{CDN_PATH}", config.savetube_base_url);
    let response: CdnResponse = fetch_json(SERVICE, with_headers(client.get(&url), config)).await?;

    if response.status != Some(true) {
        return Err(PlayError::upstream(SERVICE, "failed to get CDN"));
    }

    let cdn = response
        .data
        .and_then(|data| data.cdn)
        .and_then(|cdn| non_empty(&cdn).map(ToString::to_string))
        .ok_or_else(|| PlayError::upstream(SERVICE, "invalid CDN string"))?;

    debug!("Selected media CDN {cdn}");
    Ok(cdn)
}

pub async fn fetch_info(
    client: &reqwest::Client,
    config: &ProviderConfig,
    cdn: &str,
    video: &VideoRef,
) -> Result<DecryptedMetadata, PlayError> {
    let watch_url = video.watch_url();
    let request = client
        .post(cdn_endpoint(config, cdn, INFO_PATH))
        .json(&InfoRequest { url: &watch_url });
    let response: InfoResponse = fetch_json(SERVICE, with_headers(request, config)).await?;

    let encrypted = response
        .data
        .ok_or_else(|| PlayError::upstream(SERVICE, "invalid info response"))?
        .data
        .ok_or_else(|| PlayError::upstream(SERVICE, "invalid info data"))?;

    decrypt_metadata(&encrypted, &config.secret_key)
}

pub fn decrypt_metadata(
    encrypted: &str,
    key: &[u8; cipher::BLOCK_SIZE],
) -> Result<DecryptedMetadata, PlayError> {
    let decoded = cipher::decrypt_payload(encrypted, key)?;
    let metadata =
        serde_json::from_value::<DecryptedMetadata>(decoded).map_err(CipherError::from)?;
    Ok(metadata)
}

pub async fn audio_link(
    client: &reqwest::Client,
    config: &ProviderConfig,
    cdn: &str,
    video: &VideoRef,
    metadata: &DecryptedMetadata,
) -> Result<String, PlayError> {
    let key = metadata
        .key
        .as_ref()
        .and_then(Value::as_str)
        .and_then(non_empty)
        .ok_or(PlayError::MissingKey)?;

    let request = client
        .post(cdn_endpoint(config, cdn, DOWNLOAD_PATH))
        .json(&DownloadRequest {
            id: &video.id,
            download_type: "audio",
            quality: &config.audio_quality,
            key,
        });
    let response: DownloadResponse = fetch_json(SERVICE, with_headers(request, config)).await?;

    response
        .data
        .and_then(|outer| outer.data)
        .and_then(|inner| inner.download_url)
        .and_then(|url| non_empty(&url).map(ToString::to_string))
        .ok_or(PlayError::FailedLink)
}
