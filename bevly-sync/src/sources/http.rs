//! Shared outbound HTTP client

use super::SourceError;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

/// Browser-like user agent; some menu sites refuse library agents
pub const USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36";

/// Network timeout for every outbound request
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub fn build_client() -> Result<reqwest::Client, SourceError> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(REQUEST_TIMEOUT)
        .build()
        .map_err(|e| SourceError::Network(e.to_string()))
}

/// GET `url` and decode the JSON body
pub async fn get_json<T: DeserializeOwned>(
    client: &reqwest::Client,
    url: &str,
) -> Result<T, SourceError> {
    debug!(url = %url, "GET");

    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| SourceError::Network(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        return Err(SourceError::Http {
            status: status.as_u16(),
            url: url.to_string(),
        });
    }

    response
        .json::<T>()
        .await
        .map_err(|e| SourceError::Parse(e.to_string()))
}
