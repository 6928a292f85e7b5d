//! open.er-api exchange rate provider

use crate::{
    constants::BASE_CURRENCY,
    error::ProviderError,
    provider::ExchangeRateProvider,
    providers::http::{build_client, get_json},
    raw::RawRate,
};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct LatestResponse {
    result: Option<String>,
    base_code: Option<String>,
    #[serde(default)]
    rates: HashMap<String, f64>,
    #[serde(rename = "error-type")]
    error_type: Option<String>,
}

/// open.er-api provider
///
/// One `/latest/USD` call returns every rate; the requested target is
/// picked out of the table.
pub struct OpenErApiProvider {
    client: Client,
    base_url: String,
}

impl OpenErApiProvider {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ProviderError> {
        Ok(Self {
            client: build_client(timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl ExchangeRateProvider for OpenErApiProvider {
    async fn fetch_usd_to_target_rate(&self, target: &str) -> Result<RawRate, ProviderError> {
        let url = format!("{}/latest/{}", self.base_url, BASE_CURRENCY);
        let body: LatestResponse = get_json(&self.client, self.provider_name(), &url, &[]).await?;

        if body.result.as_deref() == Some("error") {
            let error_type = body.error_type.unwrap_or_default();
            return Err(match error_type.as_str() {
                "unsupported-code" => ProviderError::NotFound(format!("currency {}", target)),
                _ => ProviderError::Unknown(format!("open.er-api error: {}", error_type)),
            });
        }

        let rate = body.rates.get(target).copied();
        tracing::debug!(currency = target, rate = ?rate, "Fetched exchange rate from open.er-api");

        Ok(RawRate {
            base: body.base_code.unwrap_or_else(|| BASE_CURRENCY.to_string()),
            target: target.to_string(),
            rate,
        })
    }

    fn provider_name(&self) -> &'static str {
        "open_er_api"
    }
}
