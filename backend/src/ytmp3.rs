//! Convert provider for the mp4 link: init, trigger, then bounded progress polling.

use reqwest::header::REFERER;
use serde_json::Value;
use tracing::{debug, info};
use url::form_urlencoded;

use crate::{
    config::ProviderConfig,
    error::PlayError,
    upstream::{fetch_json, string_field},
};

const SERVICE: &str = "ytmp3";
const TARGET_FORMAT: &str = "mp4";

/// Progress value the provider reports once a conversion is finished.
const PROGRESS_COMPLETE: f64 = 3.0;

#[derive(Debug)]
enum ProgressStep {
    Done(String),
    Failed(PlayError),
    Pending,
}

fn classify_progress(response: &Value) -> ProgressStep {
    let progress = response.get("progress").and_then(Value::as_f64);
    if progress == Some(PROGRESS_COMPLETE) {
        return match string_field(response, "downloadURL") {
            Some(url) => ProgressStep::Done(url),
            None => ProgressStep::Failed(PlayError::NoUrlAtCompletion),
        };
    }

    match string_field(response, "error") {
        Some(message) => ProgressStep::Failed(PlayError::Provider(message)),
        None => ProgressStep::Pending,
    }
}

fn cache_buster() -> String {
    format!("{:.6}", rand::random::<f64>())
}

fn init_url(config: &ProviderConfig) -> String {
    format!("{}?p=y&23=1llum1n471&_={}", config.ytmp3_init_url, cache_buster())
}

fn trigger_url(convert_url: &str, video_id: &str) -> String {
    let params = form_urlencoded::Serializer::new(String::new())
        .append_pair("v", video_id)
        .append_pair("f", TARGET_FORMAT)
        .append_pair("_", &cache_buster())
        .finish();
    let separator = if convert_url.contains('?') { '&' } else { '?' };
    format!("{convert_url}{separator}{params}")
}

async fn get_json(
    client: &reqwest::Client,
    config: &ProviderConfig,
    url: &str,
) -> Result<Value, PlayError> {
    fetch_json(SERVICE, client.get(url).header(REFERER, &config.ytmp3_referer)).await
}

pub async fn convert_video(
    client: &reqwest::Client,
    config: &ProviderConfig,
    video_id: &str,
) -> Result<String, PlayError> {
    let init = get_json(client, config, &init_url(config)).await?;
    let convert_url = string_field(&init, "convertURL")
        .ok_or_else(|| PlayError::upstream(SERVICE, "failed to get convertURL"))?;

    let triggered = get_json(client, config, &trigger_url(&convert_url, video_id)).await?;
    if let Some(download_url) = string_field(&triggered, "downloadURL") {
        return Ok(download_url);
    }

    let progress_url = match string_field(&triggered, "progressURL") {
        Some(url) => url,
        None => {
            return Err(match string_field(&triggered, "error") {
                Some(message) => PlayError::Provider(message),
                None => PlayError::upstream(SERVICE, "failed to get progressURL"),
            });
        }
    };

    poll_progress(client, config, &progress_url).await
}

async fn poll_progress(
    client: &reqwest::Client,
    config: &ProviderConfig,
    progress_url: &str,
) -> Result<String, PlayError> {
    for attempt in 1..=config.poll_attempts {
        let response = get_json(client, config, progress_url).await?;
        match classify_progress(&response) {
            ProgressStep::Done(url) => {
                info!("Conversion of {progress_url} finished after {attempt} check(s)");
                return Ok(url);
            }
            ProgressStep::Failed(error) => return Err(error),
            ProgressStep::Pending => {
                debug!("Conversion pending, check {attempt}/{}", config.poll_attempts);
            }
        }

        if attempt < config.poll_attempts {
            tokio::time::sleep(config.poll_interval).await;
        }
    }

    Err(PlayError::Timeout {
        attempts: config.poll_attempts,
    })
}
