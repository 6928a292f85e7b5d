//! Shared HTTP plumbing for provider clients

use crate::{constants::USER_AGENT, error::ProviderError};
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Builds the client every provider uses
pub(crate) fn build_client(timeout: Duration) -> Result<Client, ProviderError> {
    Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| ProviderError::Unknown(format!("failed to build HTTP client: {}", e)))
}

/// Issues a GET and decodes the JSON body
///
/// Non-success statuses are classified with [`ProviderError::from_status`];
/// bodies that do not match `T` are `MalformedResponse`.
pub(crate) async fn get_json<T: DeserializeOwned>(
    client: &Client,
    provider: &str,
    url: &str,
    query: &[(&str, String)],
) -> Result<T, ProviderError> {
    tracing::debug!(provider = provider, url = url, "Requesting upstream data");

    let response = client.get(url).query(query).send().await?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        tracing::debug!(provider = provider, status = %status, "Upstream returned an error status");
        return Err(ProviderError::from_status(status, body.trim()));
    }

    let text = response.text().await?;
    serde_json::from_str(&text).map_err(|e| {
        ProviderError::malformed(format!(
            "failed to parse {} response: {}. Response: {}",
            provider,
            e,
            truncate(&text, 200)
        ))
    })
}

fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
