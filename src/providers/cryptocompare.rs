//! CryptoCompare history provider

use crate::{
    constants::BASE_CURRENCY,
    error::ProviderError,
    provider::HistoryProvider,
    providers::http::{build_client, get_json},
    raw::{RawBucket, RawHistory, TimeUnit},
    types::{BucketWidth, RangeSelector},
};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

/// Envelope of the `histo*` endpoints
///
/// Errors arrive with HTTP 200 and `"Response": "Error"`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct HistoResponse {
    response: Option<String>,
    #[serde(default)]
    message: String,
    data: Option<HistoData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct HistoData {
    #[serde(default)]
    data: Vec<HistoBucket>,
}

#[derive(Debug, Deserialize)]
struct HistoBucket {
    time: Option<i64>,
    close: Option<f64>,
    /// Volume in the quote currency
    volumeto: Option<f64>,
}

/// Endpoint and aggregation for a range
fn endpoint(range: RangeSelector) -> (&'static str, u32) {
    match range.bucket_width() {
        BucketWidth::TenMinutes => ("histominute", 10),
        BucketWidth::Hour => ("histohour", 1),
        BucketWidth::Day => ("histoday", 1),
    }
}

fn classify_error(message: &str) -> ProviderError {
    let lower = message.to_lowercase();
    if lower.contains("rate limit") {
        ProviderError::RateLimited
    } else if lower.contains("does not exist")
        || lower.contains("no data")
        || lower.contains("not a valid")
    {
        ProviderError::NotFound(message.to_string())
    } else {
        ProviderError::Unknown(message.to_string())
    }
}

/// CryptoCompare provider
pub struct CryptoCompareProvider {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl CryptoCompareProvider {
    /// Creates a new CryptoCompare provider against `base_url`
    pub fn new(base_url: &str, timeout: Duration, api_key: Option<String>) -> Result<Self, ProviderError> {
        Ok(Self {
            client: build_client(timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }
}

#[async_trait]
impl HistoryProvider for CryptoCompareProvider {
    async fn fetch_history_series(
        &self,
        symbol: &str,
        range: RangeSelector,
    ) -> Result<RawHistory, ProviderError> {
        let (path, aggregate) = endpoint(range);
        let url = format!("{}/{}", self.base_url, path);
        let mut query = vec![
            ("fsym", symbol.to_uppercase()),
            ("tsym", BASE_CURRENCY.to_string()),
            ("limit", range.point_count().to_string()),
            ("aggregate", aggregate.to_string()),
        ];
        if let Some(key) = &self.api_key {
            query.push(("api_key", key.clone()));
        }

        let body: HistoResponse = get_json(&self.client, self.provider_name(), &url, &query).await?;

        if body.response.as_deref() == Some("Error") {
            tracing::debug!(symbol = symbol, message = %body.message, "CryptoCompare returned an error");
            return Err(classify_error(&body.message));
        }

        let buckets: Vec<RawBucket> = body
            .data
            .map(|d| d.data)
            .unwrap_or_default()
            .into_iter()
            .map(|b| RawBucket {
                time: b.time,
                close: b.close,
                volume: b.volumeto,
            })
            .collect();

        tracing::debug!(symbol = symbol, range = %range, count = buckets.len(), "Fetched history from CryptoCompare");

        Ok(RawHistory {
            time_unit: TimeUnit::Seconds,
            buckets,
        })
    }

    fn provider_name(&self) -> &'static str {
        "cryptocompare"
    }
}
