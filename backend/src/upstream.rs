use reqwest::RequestBuilder;
use serde::de::DeserializeOwned;

use crate::error::PlayError;

/// Sends the request and decodes a JSON body, rejecting non-success statuses.
pub async fn fetch_json<T: DeserializeOwned>(
    service: &'static str,
    request: RequestBuilder,
) -> Result<T, PlayError> {
    let response = request.send().await.map_err(PlayError::transport(service))?;

    let status = response.status();
    if !status.is_success() {
        return Err(PlayError::upstream(service, format!("HTTP {status}")));
    }

    response
        .json::<T>()
        .await
        .map_err(|error| PlayError::upstream(service, error.to_string()))
}

pub fn string_field(value: &serde_json::Value, field: &str) -> Option<String> {
    value
        .get(field)
        .and_then(serde_json::Value::as_str)
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(ToString::to_string)
}
